//! Destination schema: the DDL script and per-table statements built with
//! sea-query.

use std::path::Path;

use sea_query::{Alias, SqliteQueryBuilder, Table};

use super::{Result, StorageError};

/// Read the DDL script recreating every destination table.
pub fn read_ddl(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(StorageError::SchemaNotFound(path.to_path_buf()));
    }
    std::fs::read_to_string(path).map_err(|e| StorageError::io(path, e))
}

/// `DROP TABLE IF EXISTS` for one table.
pub fn drop_table(table: &str) -> String {
    Table::drop()
        .table(Alias::new(table))
        .if_exists()
        .to_string(SqliteQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_table_is_idempotent_statement() {
        assert_eq!(drop_table("Paciente"), r#"DROP TABLE IF EXISTS "Paciente""#);
    }

    #[test]
    fn test_read_ddl_missing() {
        let result = read_ddl(Path::new("/nonexistent/schema.sql"));
        assert!(matches!(result, Err(StorageError::SchemaNotFound(_))));
    }

    #[test]
    fn test_bundled_ddl_defines_every_catalog_table() {
        let ddl = read_ddl(&Path::new(env!("CARGO_MANIFEST_DIR")).join("schema/vacinacao.sql"))
            .unwrap();
        for table in crate::entities::table_names() {
            assert!(
                ddl.contains(&format!("CREATE TABLE {} (", table)),
                "missing {}",
                table
            );
        }
    }
}
