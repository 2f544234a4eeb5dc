use thiserror::Error;

pub type Result<T, E = ChatPdfError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum ChatPdfError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ingestion error: {0}")]
    Ingestion(String),

    #[error("Failed to load stored index: {0}")]
    StorageLoad(String),

    #[error("No index has been built or loaded")]
    IndexUnavailable,

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod database;
pub mod document;
pub mod embeddings;
pub mod generation;
pub mod pipeline;
pub mod retrieval;
