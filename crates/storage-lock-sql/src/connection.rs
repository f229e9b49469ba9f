//! Connection management for the SQL-based storage
//!
//! - `DatabaseConnectionManager`: hands out handles to a sea-orm pool
//! - `ConnectionGuard`: scopes one taken connection to one operation

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend};
use storage_lock_common::{ConnectionManager, Result, StorageError};

use crate::options::DatabaseOptions;

/// Connection manager backed by a sea-orm `DatabaseConnection`
///
/// The connection is a shared pool handle; taking one clones the `Arc` and
/// the physical connection is checked out of the pool per statement.
#[derive(Clone)]
pub struct DatabaseConnectionManager {
    name: String,
    db: Arc<DatabaseConnection>,
}

impl DatabaseConnectionManager {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            name: "database-connection-manager".to_string(),
            db: Arc::new(db),
        }
    }

    /// Open a pool with the given settings
    pub async fn connect(options: &DatabaseOptions) -> Result<Self> {
        let mut opt = ConnectOptions::new(options.url.clone());

        opt.max_connections(options.max_connections)
            .min_connections(options.min_connections)
            .connect_timeout(options.connect_timeout())
            .acquire_timeout(options.acquire_timeout())
            .idle_timeout(options.idle_timeout())
            .max_lifetime(options.max_lifetime())
            .sqlx_logging(options.sqlx_logging)
            .sqlx_logging_level(tracing::log::LevelFilter::Debug);

        tracing::info!(
            max_connections = options.max_connections,
            min_connections = options.min_connections,
            connect_timeout = options.connect_timeout,
            idle_timeout = options.idle_timeout,
            max_lifetime = options.max_lifetime,
            sqlx_logging = options.sqlx_logging,
            "Database connection pool configured"
        );

        let db = Database::connect(opt)
            .await
            .map_err(StorageError::connection)?;
        Ok(Self::new(db))
    }

    pub fn database_backend(&self) -> DbBackend {
        self.db.get_database_backend()
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl ConnectionManager for DatabaseConnectionManager {
    type Connection = Arc<DatabaseConnection>;

    fn name(&self) -> &str {
        &self.name
    }

    async fn take(&self) -> Result<Arc<DatabaseConnection>> {
        if matches!(*self.db, DatabaseConnection::Disconnected) {
            return Err(StorageError::connection("database is disconnected"));
        }
        Ok(Arc::clone(&self.db))
    }

    fn give_back(&self, connection: Arc<DatabaseConnection>) -> Result<()> {
        drop(connection);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.db
            .close_by_ref()
            .await
            .map_err(StorageError::connection)
    }
}

/// A connection taken for the span of one operation
///
/// The connection goes back to its manager on every exit path: explicitly
/// through [`finish`](ConnectionGuard::finish) or
/// [`release`](ConnectionGuard::release), otherwise when the guard drops.
pub(crate) struct ConnectionGuard<M: ConnectionManager> {
    manager: Arc<M>,
    connection: Option<M::Connection>,
}

impl<M: ConnectionManager> ConnectionGuard<M> {
    pub(crate) async fn take(manager: &Arc<M>) -> Result<Self> {
        let connection = manager.take().await?;
        Ok(Self {
            manager: Arc::clone(manager),
            connection: Some(connection),
        })
    }

    pub(crate) fn connection(&self) -> Result<&M::Connection> {
        self.connection
            .as_ref()
            .ok_or_else(|| StorageError::connection("connection already given back"))
    }

    /// Give the connection back, reporting any failure
    pub(crate) fn release(mut self) -> Result<()> {
        match self.connection.take() {
            Some(connection) => self.manager.give_back(connection),
            None => Ok(()),
        }
    }

    /// Give the connection back and merge the outcome of the operation
    ///
    /// The operation's own error wins over a give-back failure.
    pub(crate) fn finish<T>(self, outcome: Result<T>) -> Result<T> {
        let manager = self.manager.name().to_string();
        let released = self.release();
        match (outcome, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(release_err)) => {
                tracing::warn!(
                    manager = %manager,
                    error = %release_err,
                    "Failed to give back connection after failed operation"
                );
                Err(err)
            }
        }
    }
}

impl<M: ConnectionManager> Drop for ConnectionGuard<M> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take()
            && let Err(err) = self.manager.give_back(connection)
        {
            tracing::warn!(
                manager = %self.manager.name(),
                error = %err,
                "Failed to give back dropped connection"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts give-backs and optionally fails them
    struct CountingManager {
        returned: AtomicUsize,
        fail_give_back: bool,
    }

    impl CountingManager {
        fn new(fail_give_back: bool) -> Arc<Self> {
            Arc::new(Self {
                returned: AtomicUsize::new(0),
                fail_give_back,
            })
        }
    }

    #[async_trait]
    impl ConnectionManager for CountingManager {
        type Connection = u32;

        fn name(&self) -> &str {
            "counting"
        }

        async fn take(&self) -> Result<u32> {
            Ok(7)
        }

        fn give_back(&self, _connection: u32) -> Result<()> {
            self.returned.fetch_add(1, Ordering::SeqCst);
            if self.fail_give_back {
                Err(StorageError::connection("give back failed"))
            } else {
                Ok(())
            }
        }

        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_drop_gives_connection_back() {
        let manager = CountingManager::new(false);
        {
            let guard = ConnectionGuard::take(&manager).await.unwrap();
            assert_eq!(*guard.connection().unwrap(), 7);
        }
        assert_eq!(manager.returned.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_release_gives_back_once() {
        let manager = CountingManager::new(false);
        let guard = ConnectionGuard::take(&manager).await.unwrap();
        guard.release().unwrap();
        assert_eq!(manager.returned.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_give_back_error_reported_on_success() {
        let manager = CountingManager::new(true);
        let guard = ConnectionGuard::take(&manager).await.unwrap();
        let err = guard.finish(Ok(())).unwrap_err();
        assert!(matches!(err, StorageError::Connection(_)));
    }

    #[tokio::test]
    async fn test_operation_error_wins_over_give_back_error() {
        let manager = CountingManager::new(true);
        let guard = ConnectionGuard::take(&manager).await.unwrap();
        let err = guard
            .finish::<()>(Err(StorageError::version_miss("l1")))
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(manager.returned.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disconnected_database_fails_to_take() {
        let manager = DatabaseConnectionManager::new(DatabaseConnection::Disconnected);
        let err = manager.take().await.unwrap_err();
        assert!(matches!(err, StorageError::Connection(_)));
    }

    #[tokio::test]
    async fn test_take_shares_one_pool_handle() {
        let manager = DatabaseConnectionManager::new(
            sea_orm::MockDatabase::new(DbBackend::Postgres).into_connection(),
        );
        let first = manager.take().await.unwrap();
        let second = manager.take().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.get_database_backend(), DbBackend::Postgres);
        manager.give_back(first).unwrap();
        manager.give_back(second).unwrap();
    }
}
