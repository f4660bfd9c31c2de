//! Git plumbing error types.

use plumb_storage::{ObjectId, ObjectType};
use thiserror::Error;

/// Errors that can occur during git plumbing operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Invalid pack file format.
    #[error("invalid pack file: {0}")]
    InvalidPack(String),

    /// Malformed delta instruction stream.
    #[error("invalid delta: {0}")]
    InvalidDelta(String),

    /// Malformed tree payload.
    #[error("invalid tree: {0}")]
    InvalidTree(String),

    /// Malformed commit payload.
    #[error("invalid commit: {0}")]
    InvalidCommit(String),

    /// Invalid pkt-line format.
    #[error("invalid pkt-line: {0}")]
    InvalidPktLine(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Deltas whose bases never became available.
    #[error("{count} delta(s) could not be resolved, first missing base: {missing}")]
    UnresolvedDeltas {
        /// Number of deltas left waiting.
        count: usize,
        /// Description of one missing base.
        missing: String,
    },

    /// An object had a different kind than the caller required.
    #[error("object {id} is a {found}, expected {expected}")]
    UnexpectedKind {
        /// The object inspected.
        id: ObjectId,
        /// The kind required.
        expected: ObjectType,
        /// The kind found.
        found: ObjectType,
    },

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] plumb_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
