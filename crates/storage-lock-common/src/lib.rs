//! Storage Lock Common - Shared types, traits, and errors
//!
//! This crate provides the foundation every lock storage backend builds on:
//! - Lock record model (`LockInformation`, `Version`)
//! - Error taxonomy (`StorageError`)
//! - `Storage` and `ConnectionManager` traits

pub mod error;
pub mod model;
pub mod traits;

// Re-exports for convenience
pub use error::{BoxError, Result, StorageError};
pub use model::{DEFAULT_STORAGE_TABLE_NAME, LockInformation, Version};
pub use traits::{ConnectionManager, LockInformationStream, Storage};
