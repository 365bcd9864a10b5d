//! Projection of the flat table onto one entity's rows.

use std::collections::HashSet;

use serde_json::Value;

use crate::entities::EntityDef;
use crate::flatten::FlatTable;

use super::MissingColumn;

/// Rows ready to insert into one table.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRows {
    pub table: &'static str,
    /// Target columns, in insert order.
    pub columns: Vec<&'static str>,
    pub rows: Vec<Vec<Value>>,
    pub stats: ExtractStats,
}

impl EntityRows {
    /// Position of a target column.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| *c == column)
    }
}

/// Row counts observed while extracting one entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    /// Rows produced by all projections before filtering.
    pub projected: usize,
    /// Rows dropped for a null primary-key component.
    pub null_keys: usize,
    /// Rows dropped because an earlier row had the same key.
    pub duplicates: usize,
}

/// Source columns the entity needs that the table lacks, first-seen order.
pub fn missing_columns(table: &FlatTable, entity: &EntityDef) -> Vec<MissingColumn> {
    let mut seen = HashSet::new();
    entity
        .projections
        .iter()
        .flat_map(|p| p.source_columns())
        .filter(|column| !table.has_column(column) && seen.insert(*column))
        .map(|column| MissingColumn {
            table: entity.table,
            column,
        })
        .collect()
}

/// Project, rename, drop null keys and keep the first row per key.
///
/// Projections are concatenated in declaration order before filtering, so
/// for shared dimensions a key seen on the patient side wins over the same
/// key on the establishment side.
pub fn extract(table: &FlatTable, entity: &EntityDef) -> Result<EntityRows, Vec<MissingColumn>> {
    let missing = missing_columns(table, entity);
    if !missing.is_empty() {
        return Err(missing);
    }

    let columns = entity.target_columns();
    let key_slots: Vec<usize> = entity
        .primary_key
        .iter()
        .filter_map(|key| columns.iter().position(|c| c == key))
        .collect();

    let mut stats = ExtractStats::default();
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut rows = Vec::new();

    for projection in entity.projections {
        let slots: Vec<usize> = projection
            .source_columns()
            .filter_map(|source| table.column_index(source))
            .collect();

        for source_row in table.rows() {
            stats.projected += 1;
            let row: Vec<Value> = slots.iter().map(|&slot| source_row[slot].clone()).collect();

            let Some(key) = key_slots
                .iter()
                .map(|&slot| key_text(&row[slot]))
                .collect::<Option<Vec<String>>>()
            else {
                stats.null_keys += 1;
                continue;
            };

            if !seen.insert(key) {
                stats.duplicates += 1;
                continue;
            }

            rows.push(row);
        }
    }

    Ok(EntityRows {
        table: entity.table,
        columns,
        rows,
        stats,
    })
}

/// Key comparison form of a cell, `None` for null.
///
/// This is the text a TEXT key column ends up holding for the value as the
/// destination writes it: booleans become `1`/`0`, numbers keep their JSON
/// text. Numbers and strings with the same text collide.
pub fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
