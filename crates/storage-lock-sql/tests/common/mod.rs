//! Shared helpers for storage integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use storage_lock_common::{LockInformation, Version};
use storage_lock_sql::{
    DatabaseConnectionManager, DatabaseOptions, Dialect, SqlBasedStorage, SqlBasedStorageOptions,
};

pub type SqliteStorage = SqlBasedStorage<DatabaseConnectionManager>;

/// Generate a lock id unique to one test
pub fn unique_lock_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}

pub fn lock_info(owner: &str, version: i64) -> LockInformation {
    let begin = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
    LockInformation::new(
        owner,
        Version::new(version),
        begin,
        begin + Duration::seconds(30),
    )
}

/// In-memory SQLite database on a single pooled connection
///
/// Every new pool connection would see a fresh in-memory database, so the
/// pool is capped at one.
pub async fn sqlite_manager() -> Arc<DatabaseConnectionManager> {
    let options = DatabaseOptions::new("sqlite::memory:").with_max_connections(1);
    Arc::new(
        DatabaseConnectionManager::connect(&options)
            .await
            .expect("Failed to open in-memory sqlite"),
    )
}

pub async fn sqlite_storage_with(dialect: Dialect) -> SqliteStorage {
    let options = SqlBasedStorageOptions::new()
        .with_connection_manager(sqlite_manager().await)
        .with_dialect(dialect)
        .with_table_full_name("storage_lock");
    let storage = SqlBasedStorage::new(options).expect("Invalid storage options");
    storage_lock_common::Storage::init(&storage)
        .await
        .expect("Failed to create lock table");
    storage
}

pub async fn sqlite_storage() -> SqliteStorage {
    sqlite_storage_with(Dialect::Sqlite).await
}
