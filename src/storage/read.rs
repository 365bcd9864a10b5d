//! Read-only access for the dashboard.

use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Executor, Row, SqlitePool, Statement, TypeInfo, ValueRef};

use super::{Result, StorageError};

/// Tabular query result: column names in select order and one value per
/// column in each row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as objects keyed by column name, in select order.
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| self.columns.iter().cloned().zip(row.iter().cloned()).collect())
            .collect()
    }

    /// Pretty-printed JSON array of [`to_records`](Self::to_records).
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.to_records())
    }

    /// Render as an aligned plain-text table.
    pub fn to_text_table(&self) -> String {
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(display_cell).collect())
            .collect();

        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &cells {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        let format_line = |values: &[String]| {
            values
                .iter()
                .zip(&widths)
                .map(|(v, w)| format!("{:<width$}", v, width = w))
                .collect::<Vec<_>>()
                .join(" | ")
                .trim_end()
                .to_string()
        };

        let mut out = format_line(&self.columns);
        out.push('\n');
        out.push_str(
            &widths
                .iter()
                .map(|w| "-".repeat(*w))
                .collect::<Vec<_>>()
                .join("-+-"),
        );
        for row in &cells {
            out.push('\n');
            out.push_str(&format_line(row));
        }
        out
    }
}

fn display_cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Database opened in SQLite read-only mode; the engine rejects writes.
pub struct ReadStore {
    pool: SqlitePool,
}

impl ReadStore {
    /// Open an existing database file read-only.
    pub async fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(StorageError::DatabaseNotFound(path.to_path_buf()));
        }

        let opts = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;

        Ok(Self { pool })
    }

    /// Run `sql` with positional `params` bound as text.
    pub async fn query(&self, sql: &str, params: &[String]) -> Result<QueryResult> {
        let statement = (&self.pool).prepare(sql).await?;
        let columns = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(param.as_str());
        }

        let rows = query
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(decode_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(QueryResult { columns, rows })
    }
}

/// Decode each column by the storage class of its value.
fn decode_row(row: &SqliteRow) -> Result<Vec<Value>> {
    (0..row.len())
        .map(|i| {
            let raw = row.try_get_raw(i)?;
            if raw.is_null() {
                return Ok(Value::Null);
            }
            let value = match raw.type_info().name() {
                "INTEGER" | "BOOLEAN" => Value::from(row.try_get::<i64, _>(i)?),
                "REAL" => Value::from(row.try_get::<f64, _>(i)?),
                "BLOB" => Value::from(
                    row.try_get::<Vec<u8>, _>(i)?
                        .iter()
                        .map(|b| format!("{:02x}", b))
                        .collect::<String>(),
                ),
                _ => Value::from(row.try_get::<String, _>(i)?),
            };
            Ok(value)
        })
        .collect()
}
