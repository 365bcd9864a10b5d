//! Unification of harvested records into one flat table.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

use crate::harvest::RawRecord;
use crate::snapshot::{self, SnapshotError};

/// One row of the flat table, aligned with [`FlatTable::columns`].
pub type FlatRow = Vec<Value>;

/// Every record as one wide row, columns being the union of all keys.
///
/// Columns appear in first-seen order. Keys absent from a record are null
/// in its row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatTable {
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<FlatRow>,
}

impl FlatTable {
    /// Build the table from records, padding missing keys with null.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = RawRecord>,
    {
        let mut table = FlatTable::default();
        let mut sparse: Vec<Vec<(usize, Value)>> = Vec::new();

        for record in records {
            let cells = record
                .into_iter()
                .map(|(key, value)| (table.column_slot(key), value))
                .collect();
            sparse.push(cells);
        }

        let width = table.columns.len();
        table.rows = sparse
            .into_iter()
            .map(|cells| {
                let mut row = vec![Value::Null; width];
                for (slot, value) in cells {
                    row[slot] = value;
                }
                row
            })
            .collect();

        table
    }

    fn column_slot(&mut self, key: String) -> usize {
        if let Some(&slot) = self.index.get(&key) {
            return slot;
        }
        let slot = self.columns.len();
        self.index.insert(key.clone(), slot);
        self.columns.push(key);
        slot
    }

    /// Column names in first-seen order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Position of `column`, if present.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.index.get(column).copied()
    }

    /// True if `column` was seen in any record.
    pub fn has_column(&self, column: &str) -> bool {
        self.index.contains_key(column)
    }

    pub fn rows(&self) -> &[FlatRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell at (`row`, `column`), or `None` if either is out of range.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let slot = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[slot])
    }
}

/// Load the snapshot at `path` as a flat table.
pub fn flatten(path: &Path) -> Result<FlatTable, SnapshotError> {
    let records = snapshot::read(path)?;
    Ok(FlatTable::from_records(records))
}
