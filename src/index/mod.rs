// Embedding index module
// Builds, persists and queries the vector index over the chunk corpus


pub mod flat;
pub mod persist;

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::embeddings::{Embedder, EmbeddingError};
use crate::ingestion::{self, Chunk};

pub use flat::{FlatIndexError, FlatL2Index, Neighbor};
pub use persist::{IndexLoadError, IndexStore, LoadedIndex};

/// One retrieved chunk and its distance to the query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub chunk_id: usize,
    /// Squared L2 distance, lower is closer
    pub score: f32,
    pub text: String,
}

/// Where the live index came from after `build_or_load`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    /// Restored from persisted artifacts
    Loaded,
    /// Encoded from the chunks and persisted
    Built,
    /// The corpus has no chunks
    Empty,
}

/// Immutable view of the corpus and its index.
///
/// Snapshots are shared between readers through an `Arc` and never change
/// after construction.
#[derive(Debug, Default)]
pub struct IndexSnapshot {
    chunks: Vec<Chunk>,
    index: FlatL2Index,
    model_id: String,
}

impl IndexSnapshot {
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    #[inline]
    pub fn embedding_count(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty() || self.index.is_empty()
    }

    #[inline]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    #[inline]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Nearest chunks for an already encoded query
    #[inline]
    pub fn search_vector(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievalResult>, EmbeddingError> {
        let neighbors = self.index.search(query, k).map_err(|e| match e {
            FlatIndexError::DimensionMismatch {
                expected, actual, ..
            } => EmbeddingError::DimensionMismatch { expected, actual },
            FlatIndexError::Truncated { .. } => EmbeddingError::Request(e.to_string()),
        })?;

        Ok(neighbors
            .into_iter()
            .filter_map(|neighbor| {
                self.chunks
                    .get(neighbor.position)
                    .map(|chunk| RetrievalResult {
                        chunk_id: chunk.id,
                        score: neighbor.distance,
                        text: chunk.text.clone(),
                    })
            })
            .collect())
    }
}

/// Query service over the live index snapshot.
///
/// Readers take a cheap `Arc` clone of the current snapshot and search it
/// without holding a lock. Builds run one at a time and publish a complete
/// snapshot in a single swap.
pub struct EmbeddingIndex {
    embedder: Arc<dyn Embedder>,
    store: Option<IndexStore>,
    live: RwLock<Arc<IndexSnapshot>>,
    build_lock: Mutex<()>,
}

impl EmbeddingIndex {
    /// Create an index service that persists its artifacts in `store`
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, store: IndexStore) -> Self {
        Self::with_store(embedder, Some(store))
    }

    /// Create an index service that keeps everything in memory
    #[inline]
    pub fn ephemeral(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_store(embedder, None)
    }

    fn with_store(embedder: Arc<dyn Embedder>, store: Option<IndexStore>) -> Self {
        let model_id = embedder.model_id();
        Self {
            embedder,
            store,
            live: RwLock::new(Arc::new(IndexSnapshot {
                model_id,
                ..IndexSnapshot::default()
            })),
            build_lock: Mutex::new(()),
        }
    }

    #[inline]
    pub fn model_id(&self) -> String {
        self.embedder.model_id()
    }

    #[inline]
    pub fn store(&self) -> Option<&IndexStore> {
        self.store.as_ref()
    }

    /// The snapshot currently visible to readers
    #[inline]
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        Arc::clone(&self.live.read().unwrap_or_else(PoisonError::into_inner))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.snapshot().chunk_count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Load the persisted index for `chunks`, or build and persist a new one
    /// when the artifacts are absent, unreadable or do not match.
    #[inline]
    pub fn build_or_load(
        &self,
        chunks: Vec<Chunk>,
        progress: &ProgressBar,
    ) -> Result<IndexOrigin> {
        self.install(chunks, progress, false)
    }

    /// Re-encode every chunk regardless of what is persisted
    #[inline]
    pub fn rebuild(&self, chunks: Vec<Chunk>, progress: &ProgressBar) -> Result<IndexOrigin> {
        self.install(chunks, progress, true)
    }

    /// Return up to `k` chunks closest to `query`, closest first.
    ///
    /// An empty corpus yields an empty result without encoding the query.
    #[inline]
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>, EmbeddingError> {
        let snapshot = self.snapshot();
        if snapshot.is_empty() || k == 0 {
            debug!("Search on empty index or k = 0, returning no results");
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed(query)?;
        snapshot.search_vector(&vector, k)
    }

    fn install(
        &self,
        chunks: Vec<Chunk>,
        progress: &ProgressBar,
        force: bool,
    ) -> Result<IndexOrigin> {
        let _build = self
            .build_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let model_id = self.embedder.model_id();

        if chunks.is_empty() {
            warn!("Corpus has no chunks; retrieval will return no context");
            self.publish(IndexSnapshot {
                chunks,
                index: FlatL2Index::default(),
                model_id,
            });
            return Ok(IndexOrigin::Empty);
        }

        let corpus = ingestion::corpus_fingerprint(&chunks);
        if !force {
            if let Some(loaded) = self.try_load(&model_id, &corpus, chunks.len()) {
                info!("Loaded persisted index with {} vectors", loaded.index.len());
                self.publish(IndexSnapshot {
                    chunks,
                    index: loaded.index,
                    model_id,
                });
                return Ok(IndexOrigin::Loaded);
            }
        }

        let embeddings = self.encode_chunks(&chunks, progress)?;
        let index = FlatL2Index::from_vectors(&embeddings)
            .context("Embedding model returned vectors of differing dimension")?;

        if let Some(store) = &self.store {
            store
                .save(&model_id, &corpus, &index, &embeddings)
                .context("Failed to persist embedding index")?;
        }

        info!(
            "Built index with {} vectors of dimension {}",
            index.len(),
            index.dimension()
        );
        self.publish(IndexSnapshot {
            chunks,
            index,
            model_id,
        });
        Ok(IndexOrigin::Built)
    }

    fn try_load(
        &self,
        model_id: &str,
        corpus: &str,
        expected_count: usize,
    ) -> Option<LoadedIndex> {
        let store = self.store.as_ref()?;
        match store.load(model_id, corpus, expected_count) {
            Ok(loaded) => Some(loaded),
            Err(IndexLoadError::Missing(path)) => {
                info!("No persisted index at {}, building", path.display());
                None
            }
            Err(e) => {
                warn!("Persisted index unusable, rebuilding: {}", e);
                None
            }
        }
    }

    fn encode_chunks(&self, chunks: &[Chunk], progress: &ProgressBar) -> Result<Vec<Vec<f32>>> {
        let batch_size = self.embedder.batch_size().max(1);
        progress.set_length(chunks.len() as u64);
        progress.set_position(0);

        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = self
                .embedder
                .embed_batch(&texts)
                .context("Failed to encode chunk batch")?;

            if vectors.len() != texts.len() {
                return Err(EmbeddingError::CountMismatch {
                    expected: texts.len(),
                    actual: vectors.len(),
                }
                .into());
            }

            embeddings.extend(vectors);
            progress.inc(batch.len() as u64);
        }

        progress.finish_and_clear();
        Ok(embeddings)
    }

    fn publish(&self, snapshot: IndexSnapshot) {
        let snapshot = Arc::new(snapshot);
        *self.live.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}
