// Document ingestion
// Turns a source document into the ordered chunk list the embedding index is built from


pub mod chunking;
pub mod pdf;

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

pub use chunking::{ChunkingConfig, chunk_text, clean_text};

/// A bounded span of source text, the unit of retrieval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position of the chunk in the corpus
    pub id: usize,
    /// Cleaned, non-empty chunk text
    pub text: String,
}

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(PathBuf),
    #[error("No extractable text in {0}")]
    Empty(PathBuf),
    #[error("Failed to write chunk store {path}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize chunks: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// SHA-256 over the ordered chunk texts, naming the corpus an index was encoded from
#[inline]
pub fn corpus_fingerprint(chunks: &[Chunk]) -> String {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        // Length prefix keeps ["ab", "c"] and ["a", "bc"] apart
        hasher.update((chunk.text.len() as u64).to_le_bytes());
        hasher.update(chunk.text.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Extract raw text from a document, page by page, concatenated in order
#[inline]
pub fn extract_text(path: &Path) -> Result<String, IngestionError> {
    let extension = path
        .extension()
        .and_then(OsStr::to_str)
        .map(str::to_ascii_lowercase);

    let pages = match extension.as_deref() {
        Some("pdf") => pdf::extract_pages(path)?,
        Some("txt" | "md") => vec![fs::read_to_string(path).map_err(|source| {
            IngestionError::Open {
                path: path.to_path_buf(),
                source,
            }
        })?],
        _ => return Err(IngestionError::UnsupportedFormat(path.to_path_buf())),
    };

    debug!("Extracted {} pages from {}", pages.len(), path.display());
    Ok(pages.concat())
}

/// Convert a source document into an ordered, non-empty sequence of chunks
#[inline]
pub fn ingest(path: &Path, config: &ChunkingConfig) -> Result<Vec<Chunk>, IngestionError> {
    if !path.exists() {
        return Err(IngestionError::Open {
            path: path.to_path_buf(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });
    }

    let raw = extract_text(path)?;
    if raw.trim().is_empty() {
        return Err(IngestionError::Empty(path.to_path_buf()));
    }

    let chunks: Vec<Chunk> = chunk_text(&raw, config)
        .into_iter()
        .enumerate()
        .map(|(id, text)| Chunk { id, text })
        .collect();

    if chunks.is_empty() {
        return Err(IngestionError::Empty(path.to_path_buf()));
    }

    info!("Ingested {} into {} chunks", path.display(), chunks.len());
    Ok(chunks)
}

/// Durable, ordered list of chunk texts stored as a JSON array
#[derive(Debug, Clone)]
pub struct ChunkStore {
    path: PathBuf,
}

impl ChunkStore {
    #[inline]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Replace the stored chunks wholesale.
    ///
    /// The new list is written next to the store and renamed over it, so a
    /// failed write leaves the previous chunks untouched.
    #[inline]
    pub fn save(&self, chunks: &[Chunk]) -> Result<(), IngestionError> {
        let store_error = |source| IngestionError::Store {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(store_error)?;
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let content = serde_json::to_string_pretty(&texts)?;

        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, content).map_err(store_error)?;
        fs::rename(&staging, &self.path).map_err(store_error)?;

        debug!("Saved {} chunks to {}", chunks.len(), self.path.display());
        Ok(())
    }

    /// Load the stored chunks, or `None` when nothing has been ingested yet
    #[inline]
    pub fn load(&self) -> anyhow::Result<Option<Vec<Chunk>>> {
        use anyhow::Context;

        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read chunk store: {}", self.path.display()))?;
        let texts: Vec<String> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse chunk store: {}", self.path.display()))?;

        Ok(Some(
            texts
                .into_iter()
                .enumerate()
                .map(|(id, text)| Chunk { id, text })
                .collect(),
        ))
    }
}
