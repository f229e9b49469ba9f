//! SQLite provider

use storage_lock_common::Result;

use super::{SqlProvider, SqlStatement};

/// SQLite dialect with owner matching on update
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteProvider;

impl SqliteProvider {
    pub fn new() -> Self {
        Self
    }
}

impl SqlProvider for SqliteProvider {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn match_owner_on_update(&self) -> bool {
        true
    }

    fn now_timestamp_sql(&self, _table_full_name: &str) -> Result<SqlStatement> {
        Ok(SqlStatement::without_values(
            "SELECT CAST(strftime('%s', 'now') AS INTEGER) AS now_timestamp",
        ))
    }
}
