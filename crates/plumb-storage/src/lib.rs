//! Git object storage for Plumb.
//!
//! This crate provides the content-addressed loose object store, the
//! on-disk reference files, and the repository directory layout.

mod error;
mod object;
mod refs;
mod repository;
mod store;

pub use error::StorageError;
pub use object::{GitObject, ObjectId, ObjectType};
pub use refs::{RefStore, Reference};
pub use repository::Repository;
pub use store::ObjectStore;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
