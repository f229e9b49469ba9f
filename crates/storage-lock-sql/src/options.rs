//! Options for the SQL-based storage and its connection pool

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use storage_lock_common::{ConnectionManager, DEFAULT_STORAGE_TABLE_NAME, Result, StorageError};

use crate::provider::{Dialect, SqlProvider};

/// Options accepted by [`SqlBasedStorage::new`](crate::SqlBasedStorage::new)
pub struct SqlBasedStorageOptions<M: ConnectionManager> {
    pub sql_provider: Option<Arc<dyn SqlProvider>>,
    pub connection_manager: Option<Arc<M>>,
    pub table_full_name: String,
}

impl<M: ConnectionManager> SqlBasedStorageOptions<M> {
    /// Options with the default dialect and table name and no connection manager
    pub fn new() -> Self {
        Self {
            sql_provider: Some(Dialect::default().provider()),
            connection_manager: None,
            table_full_name: DEFAULT_STORAGE_TABLE_NAME.to_string(),
        }
    }

    pub fn with_sql_provider(mut self, sql_provider: Arc<dyn SqlProvider>) -> Self {
        self.sql_provider = Some(sql_provider);
        self
    }

    pub fn with_dialect(self, dialect: Dialect) -> Self {
        self.with_sql_provider(dialect.provider())
    }

    pub fn with_connection_manager(mut self, connection_manager: Arc<M>) -> Self {
        self.connection_manager = Some(connection_manager);
        self
    }

    pub fn with_table_full_name(mut self, table_full_name: impl Into<String>) -> Self {
        self.table_full_name = table_full_name.into();
        self
    }

    /// Validate the options before any I/O happens
    pub fn check(&self) -> Result<()> {
        if self.sql_provider.is_none() {
            return Err(StorageError::Configuration(
                "sql provider must be set".to_string(),
            ));
        }
        if self.connection_manager.is_none() {
            return Err(StorageError::Configuration(
                "connection manager must be set".to_string(),
            ));
        }
        if self.table_full_name.is_empty() {
            return Err(StorageError::Configuration(
                "table full name must not be empty".to_string(),
            ));
        }
        if !is_valid_table_name(&self.table_full_name) {
            return Err(StorageError::Configuration(format!(
                "table full name '{}' contains illegal characters",
                self.table_full_name
            )));
        }
        Ok(())
    }
}

impl<M: ConnectionManager> Default for SqlBasedStorageOptions<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Table names are interpolated into SQL text, so only identifier
/// characters, qualifying dots and quoting characters are accepted.
fn is_valid_table_name(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$' | '`' | '"'))
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_acquire_timeout() -> u64 {
    8
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_max_lifetime() -> u64 {
    1800
}

/// Connection pool settings (timeouts in seconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseOptions {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
    #[serde(default = "default_max_lifetime")]
    pub max_lifetime: u64,
    #[serde(default)]
    pub sqlx_logging: bool,
}

impl DatabaseOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout: default_connect_timeout(),
            acquire_timeout: default_acquire_timeout(),
            idle_timeout: default_idle_timeout(),
            max_lifetime: default_max_lifetime(),
            sqlx_logging: false,
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime)
    }
}
