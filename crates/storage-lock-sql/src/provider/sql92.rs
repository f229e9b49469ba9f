//! SQL-92 style provider

use storage_lock_common::Result;

use super::{SqlProvider, SqlStatement};

pub(crate) const MYSQL_NOW_TIMESTAMP_SQL: &str = "SELECT UNIX_TIMESTAMP(NOW()) AS now_timestamp";

/// Baseline dialect: `?` placeholders, version-only gate on update
#[derive(Debug, Clone, Copy, Default)]
pub struct Sql92Provider;

impl Sql92Provider {
    pub fn new() -> Self {
        Self
    }
}

impl SqlProvider for Sql92Provider {
    fn name(&self) -> &str {
        "sql92"
    }

    fn now_timestamp_sql(&self, _table_full_name: &str) -> Result<SqlStatement> {
        Ok(SqlStatement::without_values(MYSQL_NOW_TIMESTAMP_SQL))
    }
}
