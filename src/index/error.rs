//! Index error types

use crate::config::ConfigError;
use crate::query::QueryError;
use crate::storage::StorageError;
use thiserror::Error;

/// Errors that can occur during index operations
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Query(#[from] QueryError),

    /// The index was closed; no further changes are accepted
    #[error("Index is stopped")]
    Stopped,

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// A background flush failed, or the flush worker could not be joined
    #[error("Flush worker error: {0}")]
    Worker(String),

    #[error("Invalid label: {0:?}")]
    InvalidLabel(String),
}

impl From<std::io::Error> for IndexError {
    fn from(e: std::io::Error) -> Self {
        IndexError::Storage(StorageError::Io(e))
    }
}

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;
