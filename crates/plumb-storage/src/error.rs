//! Storage error types.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested object or reference was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A caller-supplied argument was rejected before any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A stored object is malformed.
    #[error("invalid object: {0}")]
    InvalidObject(String),

    /// zlib compression or decompression failed.
    #[error("compression error: {0}")]
    Compression(String),
}
