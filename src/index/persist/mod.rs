// Index persistence
// Stores the flat index and the raw embedding matrix as two co-located JSON artifacts

#[cfg(test)]
mod tests;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::flat::FlatL2Index;

pub const INDEX_FILE_NAME: &str = "flat_l2.index.json";
pub const EMBEDDINGS_FILE_NAME: &str = "embeddings.json";
pub const FORMAT_VERSION: u32 = 2;

/// Reasons a persisted index cannot be used; every variant forces a rebuild
#[derive(Debug, Error)]
pub enum IndexLoadError {
    #[error("Index artifact missing: {0}")]
    Missing(PathBuf),
    #[error("Failed to read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed index artifact {path}: {message}")]
    Malformed { path: PathBuf, message: String },
    #[error("Unsupported index format version {found}")]
    FormatVersion { found: u32 },
    #[error("Index was built with model '{stored}', current model is '{expected}'")]
    ModelMismatch { stored: String, expected: String },
    #[error("Index holds {stored} embeddings but the corpus has {expected} chunks")]
    CountMismatch { stored: usize, expected: usize },
    #[error("Index encodes corpus {stored} but the stored chunks are corpus {expected}")]
    CorpusMismatch { stored: String, expected: String },
    #[error("Index artifacts disagree: {0}")]
    Inconsistent(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedIndex {
    format_version: u32,
    model_id: String,
    corpus: String,
    index: FlatL2Index,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedEmbeddings {
    format_version: u32,
    model_id: String,
    corpus: String,
    embeddings: Vec<Vec<f32>>,
}

/// A validated pair of artifacts
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedIndex {
    pub index: FlatL2Index,
    pub embeddings: Vec<Vec<f32>>,
}

/// Location of the persisted index artifacts
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    #[inline]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[inline]
    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE_NAME)
    }

    #[inline]
    pub fn embeddings_path(&self) -> PathBuf {
        self.dir.join(EMBEDDINGS_FILE_NAME)
    }

    /// True when both artifacts are present on disk
    #[inline]
    pub fn exists(&self) -> bool {
        self.index_path().exists() && self.embeddings_path().exists()
    }

    /// Write both artifacts, each staged to a temporary file and renamed into place.
    ///
    /// `corpus` is the fingerprint of the chunk texts the vectors encode.
    #[inline]
    pub fn save(
        &self,
        model_id: &str,
        corpus: &str,
        index: &FlatL2Index,
        embeddings: &[Vec<f32>],
    ) -> Result<()> {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create index directory: {}", self.dir.display())
        })?;

        // A crash between the two renames leaves artifacts that fail validation on load
        let persisted_embeddings = PersistedEmbeddings {
            format_version: FORMAT_VERSION,
            model_id: model_id.to_string(),
            corpus: corpus.to_string(),
            embeddings: embeddings.to_vec(),
        };
        write_atomic(&self.embeddings_path(), &persisted_embeddings)?;

        let persisted_index = PersistedIndex {
            format_version: FORMAT_VERSION,
            model_id: model_id.to_string(),
            corpus: corpus.to_string(),
            index: index.clone(),
        };
        write_atomic(&self.index_path(), &persisted_index)?;

        debug!(
            "Persisted index with {} vectors to {}",
            index.len(),
            self.dir.display()
        );
        Ok(())
    }

    /// Remove both artifacts so a later load cannot pair them with other chunks
    #[inline]
    pub fn clear(&self) -> Result<()> {
        for path in [self.index_path(), self.embeddings_path()] {
            match fs::remove_file(&path) {
                Ok(()) => debug!("Removed index artifact {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to remove {}", path.display()));
                }
            }
        }
        Ok(())
    }

    /// Load and validate both artifacts against the current model and corpus
    #[inline]
    pub fn load(
        &self,
        model_id: &str,
        corpus: &str,
        expected_count: usize,
    ) -> Result<LoadedIndex, IndexLoadError> {
        let index_path = self.index_path();
        let embeddings_path = self.embeddings_path();

        let persisted_index: PersistedIndex = read_artifact(&index_path)?;
        let persisted_embeddings: PersistedEmbeddings = read_artifact(&embeddings_path)?;

        for version in [
            persisted_index.format_version,
            persisted_embeddings.format_version,
        ] {
            if version != FORMAT_VERSION {
                return Err(IndexLoadError::FormatVersion { found: version });
            }
        }

        for stored in [&persisted_index.model_id, &persisted_embeddings.model_id] {
            if stored != model_id {
                return Err(IndexLoadError::ModelMismatch {
                    stored: stored.clone(),
                    expected: model_id.to_string(),
                });
            }
        }

        let index = persisted_index.index;
        index.validate().map_err(|e| IndexLoadError::Malformed {
            path: index_path.clone(),
            message: e.to_string(),
        })?;

        let embeddings = persisted_embeddings.embeddings;
        if embeddings.len() != expected_count {
            return Err(IndexLoadError::CountMismatch {
                stored: embeddings.len(),
                expected: expected_count,
            });
        }

        for stored in [&persisted_index.corpus, &persisted_embeddings.corpus] {
            if stored != corpus {
                return Err(IndexLoadError::CorpusMismatch {
                    stored: stored.clone(),
                    expected: corpus.to_string(),
                });
            }
        }

        if index.len() != embeddings.len() {
            return Err(IndexLoadError::Inconsistent(format!(
                "index has {} vectors, embedding matrix has {} rows",
                index.len(),
                embeddings.len()
            )));
        }

        if let Some(row) = index
            .vectors()
            .zip(&embeddings)
            .position(|(stored, raw)| stored != raw.as_slice())
        {
            return Err(IndexLoadError::Inconsistent(format!(
                "row {row} differs between index and embedding matrix"
            )));
        }

        Ok(LoadedIndex { index, embeddings })
    }
}

fn read_artifact<T: DeserializeOwned>(path: &Path) -> Result<T, IndexLoadError> {
    if !path.exists() {
        return Err(IndexLoadError::Missing(path.to_path_buf()));
    }

    let content = fs::read_to_string(path).map_err(|source| IndexLoadError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|e| IndexLoadError::Malformed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string(value).context("Failed to serialize index artifact")?;
    let staging = path.with_extension("json.tmp");

    fs::write(&staging, content)
        .with_context(|| format!("Failed to write {}", staging.display()))?;
    fs::rename(&staging, path)
        .with_context(|| format!("Failed to move index artifact into {}", path.display()))?;

    Ok(())
}
