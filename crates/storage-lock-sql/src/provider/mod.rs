//! SQL dialect providers
//!
//! A [`SqlProvider`] renders the parameterized statements used by
//! `SqlBasedStorage`. Providers are pure: they never touch a database and
//! always return the same statement for the same arguments.
//!
//! | Provider           | Placeholders | Owner match on update | Server time                  |
//! |--------------------|--------------|-----------------------|------------------------------|
//! | `Sql92Provider`    | `?`          | no                    | `UNIX_TIMESTAMP(NOW())`      |
//! | `Sql97Provider`    | `?`          | yes                   | `UNIX_TIMESTAMP(NOW())`      |
//! | `SqliteProvider`   | `?`          | yes                   | `strftime('%s', 'now')`      |
//! | `PostgresProvider` | `$n`         | yes                   | `EXTRACT(EPOCH FROM NOW())`  |

mod postgres;
mod sql92;
mod sql97;
mod sqlite;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use sea_orm::{DbBackend, Statement, Value};
use serde::{Deserialize, Serialize};
use storage_lock_common::{LockInformation, Result, StorageError, Version};

pub use postgres::PostgresProvider;
pub use sql92::Sql92Provider;
pub use sql97::Sql97Provider;
pub use sqlite::SqliteProvider;

/// Column aliased by every server-time statement
pub const NOW_TIMESTAMP_COLUMN: &str = "now_timestamp";

/// Column holding the serialized lock information
pub const LOCK_INFORMATION_COLUMN: &str = "lock_information";

/// SQL text plus its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub values: Vec<Value>,
}

impl SqlStatement {
    pub fn new(sql: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            values,
        }
    }

    pub fn without_values(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }

    /// Bind into a sea-orm statement for the given backend
    pub fn into_statement(self, backend: DbBackend) -> Statement {
        Statement::from_sql_and_values(backend, self.sql, self.values)
    }
}

fn encode(lock_information: &LockInformation) -> Result<String> {
    lock_information
        .to_json_string()
        .map_err(StorageError::execution)
}

/// Renders dialect-specific SQL for each storage operation
///
/// Every method except [`name`](SqlProvider::name) has a default rendering in
/// plain SQL, so a custom dialect only overrides what differs. Only the table
/// name is interpolated into the text; everything else is bound through
/// placeholders, in the same order as [`SqlStatement::values`].
pub trait SqlProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Placeholder for the 1-based parameter `index`
    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    /// Whether updates also require `owner_id` to match
    ///
    /// With the owner predicate a writer that guessed the version still
    /// cannot overwrite a lock it does not own.
    fn match_owner_on_update(&self) -> bool {
        false
    }

    fn create_table_sql(&self, table_full_name: &str) -> Result<SqlStatement> {
        Ok(SqlStatement::without_values(format!(
            "CREATE TABLE IF NOT EXISTS {table_full_name} (
    lock_id VARCHAR(255) NOT NULL PRIMARY KEY,
    owner_id VARCHAR(255) NOT NULL,
    version BIGINT NOT NULL,
    lock_information TEXT NOT NULL
)"
        )))
    }

    fn update_with_version_sql(
        &self,
        table_full_name: &str,
        lock_id: &str,
        expected_version: Version,
        new_version: Version,
        lock_information: &LockInformation,
    ) -> Result<SqlStatement> {
        let mut values: Vec<Value> = vec![
            new_version.get().into(),
            lock_information.owner_id.as_str().into(),
            encode(lock_information)?.into(),
            lock_id.into(),
        ];
        let mut sql = format!(
            "UPDATE {table_full_name} SET version = {}, owner_id = {}, lock_information = {} WHERE lock_id = {}",
            self.placeholder(1),
            self.placeholder(2),
            self.placeholder(3),
            self.placeholder(4),
        );
        if self.match_owner_on_update() {
            values.push(lock_information.owner_id.as_str().into());
            sql.push_str(&format!(" AND owner_id = {}", self.placeholder(values.len())));
        }
        values.push(expected_version.get().into());
        sql.push_str(&format!(" AND version = {}", self.placeholder(values.len())));
        Ok(SqlStatement::new(sql, values))
    }

    fn create_with_version_sql(
        &self,
        table_full_name: &str,
        lock_id: &str,
        version: Version,
        lock_information: &LockInformation,
    ) -> Result<SqlStatement> {
        let sql = format!(
            "INSERT INTO {table_full_name} (lock_id, owner_id, version, lock_information) VALUES ({}, {}, {}, {})",
            self.placeholder(1),
            self.placeholder(2),
            self.placeholder(3),
            self.placeholder(4),
        );
        Ok(SqlStatement::new(
            sql,
            vec![
                lock_id.into(),
                lock_information.owner_id.as_str().into(),
                version.get().into(),
                encode(lock_information)?.into(),
            ],
        ))
    }

    fn delete_with_version_sql(
        &self,
        table_full_name: &str,
        lock_id: &str,
        expected_version: Version,
        lock_information: &LockInformation,
    ) -> Result<SqlStatement> {
        let sql = format!(
            "DELETE FROM {table_full_name} WHERE lock_id = {} AND owner_id = {} AND version = {}",
            self.placeholder(1),
            self.placeholder(2),
            self.placeholder(3),
        );
        Ok(SqlStatement::new(
            sql,
            vec![
                lock_id.into(),
                lock_information.owner_id.as_str().into(),
                expected_version.get().into(),
            ],
        ))
    }

    /// Statement returning the server's epoch seconds as `now_timestamp`
    fn now_timestamp_sql(&self, _table_full_name: &str) -> Result<SqlStatement> {
        Err(StorageError::Unimplemented {
            dialect: self.name().to_string(),
            operation: "now_timestamp_sql",
        })
    }

    fn find_lock_information_by_id_sql(
        &self,
        table_full_name: &str,
        lock_id: &str,
    ) -> Result<SqlStatement> {
        let sql = format!(
            "SELECT {LOCK_INFORMATION_COLUMN} FROM {table_full_name} WHERE lock_id = {}",
            self.placeholder(1)
        );
        Ok(SqlStatement::new(sql, vec![lock_id.into()]))
    }

    fn list_lock_information_sql(&self, table_full_name: &str) -> Result<SqlStatement> {
        Ok(SqlStatement::without_values(format!(
            "SELECT {LOCK_INFORMATION_COLUMN} FROM {table_full_name}"
        )))
    }
}

/// Built-in dialects, selectable by name from configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Sql92,
    #[default]
    Sql97,
    Sqlite,
    Postgres,
}

impl Dialect {
    /// The dialect that matches a sea-orm backend
    pub fn for_backend(backend: DbBackend) -> Self {
        match backend {
            DbBackend::MySql => Dialect::Sql97,
            DbBackend::Postgres => Dialect::Postgres,
            DbBackend::Sqlite => Dialect::Sqlite,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Sql92 => "sql92",
            Dialect::Sql97 => "sql97",
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
        }
    }

    pub fn provider(self) -> Arc<dyn SqlProvider> {
        match self {
            Dialect::Sql92 => Arc::new(Sql92Provider::new()),
            Dialect::Sql97 => Arc::new(Sql97Provider::new()),
            Dialect::Sqlite => Arc::new(SqliteProvider::new()),
            Dialect::Postgres => Arc::new(PostgresProvider::new()),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sql92" => Ok(Dialect::Sql92),
            "sql97" | "mysql" => Ok(Dialect::Sql97),
            "sqlite" => Ok(Dialect::Sqlite),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            other => Err(StorageError::Configuration(format!(
                "unknown sql dialect '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    pub(crate) fn lock_info(owner: &str, version: i64) -> LockInformation {
        let begin = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        LockInformation::new(
            owner,
            Version::new(version),
            begin,
            begin + chrono::Duration::seconds(30),
        )
    }

    /// Dialect that relies on every default rendering
    struct BareProvider;

    impl SqlProvider for BareProvider {
        fn name(&self) -> &str {
            "bare"
        }
    }

    #[test]
    fn test_default_now_timestamp_is_unimplemented() {
        let err = BareProvider.now_timestamp_sql("t").unwrap_err();
        match err {
            StorageError::Unimplemented { dialect, operation } => {
                assert_eq!(dialect, "bare");
                assert_eq!(operation, "now_timestamp_sql");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_default_update_skips_owner() {
        let info = lock_info("owner-a", 2);
        let stmt = BareProvider
            .update_with_version_sql("locks", "l1", Version::new(1), Version::new(2), &info)
            .unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE locks SET version = ?, owner_id = ?, lock_information = ? WHERE lock_id = ? AND version = ?"
        );
        assert_eq!(
            stmt.values,
            vec![
                Value::from(2i64),
                Value::from("owner-a"),
                Value::from(info.to_json_string().unwrap()),
                Value::from("l1"),
                Value::from(1i64),
            ]
        );
    }

    #[test]
    fn test_table_name_is_the_only_interpolation() {
        let info = lock_info("o'brien", 1);
        let stmt = BareProvider
            .create_with_version_sql("db.locks", "id'; DROP TABLE x; --", Version::new(1), &info)
            .unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO db.locks (lock_id, owner_id, version, lock_information) VALUES (?, ?, ?, ?)"
        );
        assert_eq!(stmt.values[0], Value::from("id'; DROP TABLE x; --"));
        assert_eq!(stmt.values[1], Value::from("o'brien"));
    }

    #[test]
    fn test_dialect_from_str() {
        assert_eq!("SQL92".parse::<Dialect>().unwrap(), Dialect::Sql92);
        assert_eq!("mysql".parse::<Dialect>().unwrap(), Dialect::Sql97);
        assert_eq!("postgresql".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert!("oracle".parse::<Dialect>().is_err());
        assert_eq!(Dialect::default(), Dialect::Sql97);
    }

    #[test]
    fn test_dialect_for_backend() {
        assert_eq!(Dialect::for_backend(DbBackend::MySql), Dialect::Sql97);
        assert_eq!(Dialect::for_backend(DbBackend::Sqlite).provider().name(), "sqlite");
        assert_eq!(
            Dialect::for_backend(DbBackend::Postgres).provider().name(),
            "postgres"
        );
    }
}
