//! Error types for lock storage backends
//!
//! Every outcome a backend can report is a distinct variant so that callers
//! can tell an expected version miss apart from a broken connection.

/// Boxed error carried by the connection and execution variants
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used by all storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Storage-specific error types
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    /// Invalid options, detected before any I/O
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A connection could not be taken from, or given back to, the manager
    #[error("connection error: {0}")]
    Connection(#[source] BoxError),

    /// Statement execution, row scan or payload decoding failed
    #[error("execution error: {0}")]
    Execution(#[source] BoxError),

    /// A version-gated mutation matched no row
    #[error("version miss for lock '{lock_id}'")]
    VersionMiss { lock_id: String },

    /// Insert rejected by the primary key
    #[error("lock '{lock_id}' already exists")]
    LockAlreadyExists { lock_id: String },

    #[error("lock '{lock_id}' not found")]
    LockNotFound { lock_id: String },

    /// A version-gated mutation touched more than one row
    #[error("consistency violation on lock '{lock_id}': {affected} rows affected, expected 1")]
    ConsistencyViolation { lock_id: String, affected: u64 },

    /// The configured dialect does not provide the requested statement
    #[error("operation '{operation}' is not implemented by dialect '{dialect}'")]
    Unimplemented {
        dialect: String,
        operation: &'static str,
    },
}

impl StorageError {
    pub fn execution<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        StorageError::Execution(err.into())
    }

    pub fn connection<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        StorageError::Connection(err.into())
    }

    pub fn version_miss(lock_id: impl Into<String>) -> Self {
        StorageError::VersionMiss {
            lock_id: lock_id.into(),
        }
    }

    /// True when another writer won the compare-and-swap
    ///
    /// Both a version miss and a duplicate insert fall in this class.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::VersionMiss { .. } | StorageError::LockAlreadyExists { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::LockNotFound { .. })
    }

    /// Whether a lock manager may re-read the record and try again
    pub fn is_retryable(&self) -> bool {
        self.is_conflict()
    }
}
