// Embeddings module
// Text to vector encoders shared by corpus indexing and query embedding

pub mod hashing;
pub mod ollama;

use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;

use crate::config::{EmbeddingConfig, EmbeddingProvider};

pub use hashing::HashingEmbedder;
pub use ollama::OllamaClient;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Embedding request failed: {0}")]
    Request(String),
    #[error("Embedding response had {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },
    #[error("Inconsistent embedding dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// A deterministic text encoder.
///
/// The same model must encode the corpus and every query, so each embedder
/// reports a stable identity that is persisted next to the index it built.
pub trait Embedder: Send + Sync {
    /// Stable identity of the model, e.g. `ollama:nomic-embed-text:latest`
    fn model_id(&self) -> String;

    /// Encode a batch of texts, one vector per input in input order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Preferred number of texts per request
    fn batch_size(&self) -> usize {
        32
    }

    /// Encode a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(&[text.to_string()])?;
        if vectors.len() != 1 {
            return Err(EmbeddingError::CountMismatch {
                expected: 1,
                actual: vectors.len(),
            });
        }
        vectors
            .pop()
            .ok_or(EmbeddingError::CountMismatch {
                expected: 1,
                actual: 0,
            })
    }
}

/// Construct the embedder selected in configuration
#[inline]
pub fn from_config(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider {
        EmbeddingProvider::Ollama => Ok(Arc::new(OllamaClient::new(config)?)),
        EmbeddingProvider::Hashing => Ok(Arc::new(HashingEmbedder::new(
            config.dimension as usize,
        ))),
    }
}
