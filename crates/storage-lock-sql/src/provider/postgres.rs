//! PostgreSQL provider

use storage_lock_common::Result;

use super::{SqlProvider, SqlStatement};

/// PostgreSQL dialect: numbered `$n` placeholders, owner matching on update
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresProvider;

impl PostgresProvider {
    pub fn new() -> Self {
        Self
    }
}

impl SqlProvider for PostgresProvider {
    fn name(&self) -> &str {
        "postgres"
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn match_owner_on_update(&self) -> bool {
        true
    }

    fn now_timestamp_sql(&self, _table_full_name: &str) -> Result<SqlStatement> {
        Ok(SqlStatement::without_values(
            "SELECT CAST(EXTRACT(EPOCH FROM NOW()) AS BIGINT) AS now_timestamp",
        ))
    }
}
