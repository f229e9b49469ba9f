//! SQL-based lock storage
//!
//! Every mutation is a compare-and-swap on one row: the statement is gated on
//! the expected version and succeeds only if exactly one row was affected.

use std::ops::Deref;
use std::sync::Arc;

use async_stream::try_stream;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use sea_orm::{ConnectionTrait, DbErr, SqlErr, Statement, StreamTrait};
use storage_lock_common::{
    ConnectionManager, LockInformation, LockInformationStream, Result, Storage, StorageError,
    Version,
};

use crate::connection::ConnectionGuard;
use crate::options::SqlBasedStorageOptions;
use crate::provider::{LOCK_INFORMATION_COLUMN, NOW_TIMESTAMP_COLUMN, SqlProvider, SqlStatement};

pub const STORAGE_NAME: &str = "sql-based-storage";

/// Lock storage on top of any database reachable through sea-orm
///
/// Connections handed out by `M` dereference to a sea-orm connection, e.g.
/// `Arc<DatabaseConnection>`.
pub struct SqlBasedStorage<M: ConnectionManager> {
    sql_provider: Arc<dyn SqlProvider>,
    connection_manager: Arc<M>,
    table_full_name: String,
}

impl<M> SqlBasedStorage<M>
where
    M: ConnectionManager + 'static,
    M::Connection: Deref<Target: ConnectionTrait + StreamTrait + 'static>,
{
    /// Validate the options and build the storage; performs no I/O
    pub fn new(options: SqlBasedStorageOptions<M>) -> Result<Self> {
        options.check()?;
        let SqlBasedStorageOptions {
            sql_provider,
            connection_manager,
            table_full_name,
        } = options;
        match (sql_provider, connection_manager) {
            (Some(sql_provider), Some(connection_manager)) => Ok(Self {
                sql_provider,
                connection_manager,
                table_full_name,
            }),
            _ => Err(StorageError::Configuration(
                "sql provider and connection manager must be set".to_string(),
            )),
        }
    }

    pub fn table_full_name(&self) -> &str {
        &self.table_full_name
    }

    pub fn connection_manager(&self) -> &Arc<M> {
        &self.connection_manager
    }

    async fn take_connection(&self) -> Result<ConnectionGuard<M>> {
        ConnectionGuard::take(&self.connection_manager).await
    }

    fn statement<C>(connection: &C, sql: SqlStatement) -> Statement
    where
        C: ConnectionTrait + ?Sized,
    {
        tracing::debug!(sql = %sql.sql, params = sql.values.len(), "Executing lock statement");
        sql.into_statement(connection.get_database_backend())
    }

    /// Execute a version-gated mutation and interpret the affected row count
    async fn execute_gated(&self, lock_id: &str, sql: Result<SqlStatement>) -> Result<()> {
        let guard = self.take_connection().await?;
        let outcome = async {
            let connection = &**guard.connection()?;
            let statement = Self::statement(connection, sql?);
            let result = connection.execute(statement).await.map_err(map_db_err)?;
            check_rows_affected(lock_id, result.rows_affected())
        }
        .await;
        guard.finish(outcome)
    }
}

#[async_trait]
impl<M> Storage for SqlBasedStorage<M>
where
    M: ConnectionManager + 'static,
    M::Connection: Deref<Target: ConnectionTrait + StreamTrait + 'static>,
{
    fn name(&self) -> &str {
        STORAGE_NAME
    }

    async fn init(&self) -> Result<()> {
        let guard = self.take_connection().await?;
        let outcome = async {
            let connection = &**guard.connection()?;
            let sql = self.sql_provider.create_table_sql(&self.table_full_name)?;
            connection
                .execute(Self::statement(connection, sql))
                .await
                .map_err(map_db_err)?;
            tracing::info!(table = %self.table_full_name, "Lock table ready");
            Ok::<_, StorageError>(())
        }
        .await;
        guard.finish(outcome)
    }

    async fn update_with_version(
        &self,
        lock_id: &str,
        expected_version: Version,
        new_version: Version,
        lock_information: &LockInformation,
    ) -> Result<()> {
        let sql = self.sql_provider.update_with_version_sql(
            &self.table_full_name,
            lock_id,
            expected_version,
            new_version,
            lock_information,
        );
        let result = self.execute_gated(lock_id, sql).await;
        if let Err(err) = &result
            && err.is_conflict()
        {
            tracing::debug!(
                lock_id,
                expected_version = %expected_version,
                new_version = %new_version,
                "Lock update lost version race"
            );
        }
        result
    }

    async fn create_with_version(
        &self,
        lock_id: &str,
        version: Version,
        lock_information: &LockInformation,
    ) -> Result<()> {
        let sql = self.sql_provider.create_with_version_sql(
            &self.table_full_name,
            lock_id,
            version,
            lock_information,
        );
        self.execute_gated(lock_id, sql)
            .await
            .map_err(|err| match err {
                StorageError::Execution(source) if is_unique_violation(source.as_ref()) => {
                    tracing::debug!(lock_id, "Lock record already exists");
                    StorageError::LockAlreadyExists {
                        lock_id: lock_id.to_string(),
                    }
                }
                other => other,
            })
    }

    async fn delete_with_version(
        &self,
        lock_id: &str,
        expected_version: Version,
        lock_information: &LockInformation,
    ) -> Result<()> {
        let sql = self.sql_provider.delete_with_version_sql(
            &self.table_full_name,
            lock_id,
            expected_version,
            lock_information,
        );
        self.execute_gated(lock_id, sql).await
    }

    async fn get(&self, lock_id: &str) -> Result<String> {
        let guard = self.take_connection().await?;
        let outcome = async {
            let connection = &**guard.connection()?;
            let sql = self
                .sql_provider
                .find_lock_information_by_id_sql(&self.table_full_name, lock_id)?;
            let row = connection
                .query_one(Self::statement(connection, sql))
                .await
                .map_err(map_db_err)?
                .ok_or_else(|| StorageError::LockNotFound {
                    lock_id: lock_id.to_string(),
                })?;
            row.try_get::<String>("", LOCK_INFORMATION_COLUMN)
                .map_err(StorageError::execution)
        }
        .await;
        guard.finish(outcome)
    }

    async fn get_time(&self) -> Result<DateTime<Utc>> {
        let guard = self.take_connection().await?;
        let outcome = async {
            let connection = &**guard.connection()?;
            let sql = self.sql_provider.now_timestamp_sql(&self.table_full_name)?;
            let row = connection
                .query_one(Self::statement(connection, sql))
                .await
                .map_err(map_db_err)?
                .ok_or_else(|| StorageError::execution("storage returned no server time"))?;
            let seconds = row
                .try_get::<i64>("", NOW_TIMESTAMP_COLUMN)
                .map_err(StorageError::execution)?;
            DateTime::<Utc>::from_timestamp(seconds, 0).ok_or_else(|| {
                StorageError::execution(format!("server timestamp {seconds} is out of range"))
            })
        }
        .await;
        guard.finish(outcome)
    }

    async fn list(&self) -> Result<LockInformationStream> {
        let guard = self.take_connection().await?;
        let sql = self
            .sql_provider
            .list_lock_information_sql(&self.table_full_name);
        match sql {
            Ok(sql) => Ok(lock_information_stream(guard, sql).boxed()),
            Err(err) => guard.finish(Err(err)),
        }
    }

    async fn close(&self) -> Result<()> {
        // Connections belong to the connection manager
        Ok(())
    }
}

/// Lazily decode every row of one cursor
///
/// The query runs on first poll. The cursor and the connection live exactly
/// as long as the stream: dropping it early releases both.
fn lock_information_stream<M>(
    guard: ConnectionGuard<M>,
    sql: SqlStatement,
) -> impl Stream<Item = Result<LockInformation>> + Send + 'static
where
    M: ConnectionManager + 'static,
    M::Connection: Deref<Target: ConnectionTrait + StreamTrait + 'static>,
{
    try_stream! {
        let connection = &**guard.connection()?;
        let statement = sql.into_statement(connection.get_database_backend());
        let mut rows = Box::pin(connection.stream(statement).await.map_err(map_db_err)?);
        while let Some(row) = rows.next().await {
            let row = row.map_err(map_db_err)?;
            let payload = row
                .try_get::<String>("", LOCK_INFORMATION_COLUMN)
                .map_err(StorageError::execution)?;
            yield LockInformation::from_json_str(&payload).map_err(StorageError::execution)?;
        }
        drop(rows);
        guard.release()?;
    }
}

/// Map a driver error, keeping pool failures apart from statement failures
fn map_db_err(err: DbErr) -> StorageError {
    if matches!(err, DbErr::ConnectionAcquire(_) | DbErr::Conn(_)) {
        StorageError::connection(err)
    } else {
        StorageError::execution(err)
    }
}

fn is_unique_violation(source: &(dyn std::error::Error + Send + Sync + 'static)) -> bool {
    source
        .downcast_ref::<DbErr>()
        .and_then(DbErr::sql_err)
        .is_some_and(|err| matches!(err, SqlErr::UniqueConstraintViolation(_)))
}

/// Exactly one affected row means the gate matched
fn check_rows_affected(lock_id: &str, affected: u64) -> Result<()> {
    match affected {
        1 => Ok(()),
        0 => Err(StorageError::version_miss(lock_id)),
        affected => {
            tracing::error!(lock_id, affected, "Version-gated mutation touched several rows");
            Err(StorageError::ConsistencyViolation {
                lock_id: lock_id.to_string(),
                affected,
            })
        }
    }
}
