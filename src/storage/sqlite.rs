//! SQLite destination for the relational load.

use std::path::{Path, PathBuf};

use sea_query::{Alias, Query, SimpleExpr, SqliteQueryBuilder};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::schema::drop_table;
use super::{Result, StorageError};
use crate::load::EntityRows;

/// Rows per INSERT statement.
const INSERT_BATCH: usize = 500;

/// SQLite database receiving the full-replace load.
pub struct SqliteDestination {
    pool: SqlitePool,
    location: PathBuf,
}

impl SqliteDestination {
    /// Open (creating if needed) the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
            }
        }

        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete)
            // Dangling references are reported by the loader, not enforced.
            .foreign_keys(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        Ok(Self {
            pool,
            location: path.to_path_buf(),
        })
    }

    /// Private in-memory database, mainly for tests.
    pub async fn in_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true)
            .foreign_keys(false);

        // One connection: every in-memory connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        Ok(Self {
            pool,
            location: PathBuf::from(":memory:"),
        })
    }

    /// Underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Where the database lives.
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Drop every table in `sets`, run `ddl`, then insert each row set in
    /// order.
    ///
    /// Everything runs in one transaction: on any failure the previous
    /// schema and data are left as they were.
    pub async fn replace(&self, ddl: &str, sets: &[EntityRows]) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        // BEGIN IMMEDIATE takes the write lock upfront so no other writer can
        // interleave with the drop/recreate.
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result = match Self::replace_in_tx(&mut conn, ddl, sets).await {
            Ok(()) => sqlx::query("COMMIT")
                .execute(&mut *conn)
                .await
                .map(|_| ())
                .map_err(StorageError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                info!(location = %self.location.display(), tables = sets.len(), "Destination replaced");
                Ok(())
            }
            Err(e) => {
                // A failed COMMIT can leave the transaction open on the pooled connection.
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    async fn replace_in_tx(conn: &mut SqliteConnection, ddl: &str, sets: &[EntityRows]) -> Result<()> {
        // Dependents first.
        for set in sets.iter().rev() {
            sqlx::query(&drop_table(set.table)).execute(&mut *conn).await?;
        }

        sqlx::raw_sql(ddl).execute(&mut *conn).await?;

        for set in sets {
            Self::insert_rows(conn, set).await?;
            debug!(table = set.table, rows = set.rows.len(), "Table loaded");
        }

        Ok(())
    }

    async fn insert_rows(conn: &mut SqliteConnection, set: &EntityRows) -> Result<()> {
        for chunk in set.rows.chunks(INSERT_BATCH) {
            let mut insert = Query::insert();
            insert
                .into_table(Alias::new(set.table))
                .columns(set.columns.iter().map(|c| Alias::new(*c)));

            for row in chunk {
                insert.values(row.iter().map(sql_value))?;
            }

            let query = insert.to_string(SqliteQueryBuilder);
            sqlx::query(&query).execute(&mut *conn).await?;
        }

        Ok(())
    }
}

/// Map a JSON cell onto a SQL literal.
///
/// Booleans are stored as `1`/`0`. Numbers outside `i64` and nested arrays
/// or objects are stored as their JSON text, so a TEXT key column holds
/// exactly [`key_text`](crate::load::key_text) of the cell.
fn sql_value(value: &Value) -> SimpleExpr {
    let value: sea_query::Value = match value {
        Value::Null => Option::<String>::None.into(),
        Value::Bool(b) => i64::from(*b).into(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.into(),
            None => n.to_string().into(),
        },
        Value::String(s) => s.clone().into(),
        Value::Array(_) | Value::Object(_) => value.to_string().into(),
    };
    value.into()
}
