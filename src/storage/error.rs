//! Storage layer error types
//!
//! Defines all errors that can occur while reading or writing bitmaps and
//! timestamp stores.

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored bytes could not be decoded (truncated buffer, bad header, etc.)
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// A name could not be mapped to or from a file name
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// A structure outgrew what its on-disk format can describe
    #[error("Capacity exceeded: {0}")]
    Capacity(String),
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
