use thiserror::Error;

pub type Result<T> = std::result::Result<T, AssistError>;

#[derive(Error, Debug)]
pub enum AssistError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ingestion error: {0}")]
    Ingestion(#[from] ingestion::IngestionError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] embeddings::EmbeddingError),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Inference error: {0}")]
    Inference(#[from] llm::InferenceError),

    #[error("Patient store error: {0}")]
    Patients(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod agents;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod index;
pub mod ingestion;
pub mod llm;
pub mod patients;
pub mod rag;
