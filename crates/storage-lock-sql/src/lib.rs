//! Storage Lock SQL - Relational backend for lock storage
//!
//! This crate provides:
//! - SQL dialect providers rendering parameterized, version-gated statements
//! - `SqlBasedStorage`, a `Storage` implementation over sea-orm connections
//! - `DatabaseConnectionManager`, a connection source backed by a sea-orm pool

pub mod connection;
pub mod options;
pub mod provider;
pub mod storage;

// Re-export commonly used types
pub use connection::DatabaseConnectionManager;
pub use options::{DatabaseOptions, SqlBasedStorageOptions};
pub use provider::{
    Dialect, PostgresProvider, Sql92Provider, Sql97Provider, SqlProvider, SqlStatement,
    SqliteProvider,
};
pub use storage::{STORAGE_NAME, SqlBasedStorage};
