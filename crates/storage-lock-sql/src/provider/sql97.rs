//! SQL-97 style provider

use storage_lock_common::Result;

use super::sql92::MYSQL_NOW_TIMESTAMP_SQL;
use super::{SqlProvider, SqlStatement};

/// Stricter dialect: updates must also match the owner
#[derive(Debug, Clone, Copy, Default)]
pub struct Sql97Provider;

impl Sql97Provider {
    pub fn new() -> Self {
        Self
    }
}

impl SqlProvider for Sql97Provider {
    fn name(&self) -> &str {
        "sql97"
    }

    fn match_owner_on_update(&self) -> bool {
        true
    }

    fn now_timestamp_sql(&self, _table_full_name: &str) -> Result<SqlStatement> {
        Ok(SqlStatement::without_values(MYSQL_NOW_TIMESTAMP_SQL))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::tests::lock_info;
    use sea_orm::Value;
    use storage_lock_common::Version;

    #[test]
    fn test_update_matches_owner() {
        let info = lock_info("owner-a", 4);
        let stmt = Sql97Provider::new()
            .update_with_version_sql("storage_lock", "l1", Version::new(3), Version::new(4), &info)
            .unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE storage_lock SET version = ?, owner_id = ?, lock_information = ? WHERE lock_id = ? AND owner_id = ? AND version = ?"
        );
        assert_eq!(stmt.values.len(), 6);
        assert_eq!(stmt.values[1], Value::from("owner-a"));
        assert_eq!(stmt.values[4], Value::from("owner-a"));
        assert_eq!(stmt.values[5], Value::from(3i64));
    }

    #[test]
    fn test_insert_binds_owner_from_payload() {
        let info = lock_info("owner-a", 1);
        let stmt = Sql97Provider::new()
            .create_with_version_sql("storage_lock", "l1", Version::new(1), &info)
            .unwrap();
        assert_eq!(
            stmt.values,
            vec![
                Value::from("l1"),
                Value::from("owner-a"),
                Value::from(1i64),
                Value::from(info.to_json_string().unwrap()),
            ]
        );
    }
}
