use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    /// The embedding service or a store could not be reached, or answered with a failure status
    #[error("Transport error: {0}")]
    Transport(String),

    /// The embedding service answered, but not with what was asked for
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl IndexError {
    /// Wrap a store failure, keeping its context chain in the message
    pub(crate) fn database(error: anyhow::Error) -> Self {
        Self::Database(format!("{:#}", error))
    }
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod fingerprint;
pub mod indexer;
pub mod retriever;
