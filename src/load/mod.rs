//! Relational load.
//!
//! A load is planned entirely in memory first: the catalog is ordered, the
//! flat table is checked for every source column, and each entity's rows
//! are extracted. Only a complete plan reaches the destination, where it
//! replaces the previous contents inside one transaction.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::entities::{self, CatalogError, EntityDef};
use crate::flatten::FlatTable;
use crate::storage::{SqliteDestination, StorageError};

mod extract;

pub use extract::{extract, key_text, missing_columns, EntityRows, ExtractStats};

/// Result type for load operations.
pub type Result<T> = std::result::Result<T, LoadError>;

/// Source column an entity needs but the flat table lacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingColumn {
    pub table: &'static str,
    pub column: &'static str,
}

impl fmt::Display for MissingColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// Errors that abort a load.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Input lacks {} required column(s): {}", .0.len(), join(.0))]
    MissingColumns(Vec<MissingColumn>),

    #[error("Invalid entity catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

fn join(missing: &[MissingColumn]) -> String {
    missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Non-null foreign-key values with no matching row in the referenced table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingReference {
    pub table: &'static str,
    pub column: &'static str,
    pub references: &'static str,
    /// Rows carrying a dangling value.
    pub rows: usize,
}

/// Per-table outcome of a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableReport {
    pub table: &'static str,
    pub stats: ExtractStats,
    pub loaded: usize,
}

/// Outcome of a load, tables in load order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub tables: Vec<TableReport>,
    pub dangling: Vec<DanglingReference>,
    /// Database the rows were written to; empty for a plan that was not written.
    pub destination: PathBuf,
}

impl LoadReport {
    pub fn table(&self, table: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == table)
    }

    pub fn total_loaded(&self) -> usize {
        self.tables.iter().map(|t| t.loaded).sum()
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<24} {:>9} {:>9} {:>10} {:>9}",
            "table", "projected", "null_keys", "duplicates", "loaded"
        )?;
        for table in &self.tables {
            writeln!(
                f,
                "{:<24} {:>9} {:>9} {:>10} {:>9}",
                table.table,
                table.stats.projected,
                table.stats.null_keys,
                table.stats.duplicates,
                table.loaded
            )?;
        }
        for dangling in &self.dangling {
            writeln!(
                f,
                "warning: {}.{} has {} value(s) missing from {}",
                dangling.table, dangling.column, dangling.rows, dangling.references
            )?;
        }
        write!(
            f,
            "{} rows loaded into {}",
            self.total_loaded(),
            self.destination.display()
        )
    }
}

/// Every entity's rows, extracted and ordered, ready to write.
#[derive(Debug, Clone)]
pub struct LoadPlan {
    pub sets: Vec<EntityRows>,
    pub dangling: Vec<DanglingReference>,
}

impl LoadPlan {
    fn report(&self) -> LoadReport {
        LoadReport {
            tables: self
                .sets
                .iter()
                .map(|set| TableReport {
                    table: set.table,
                    stats: set.stats,
                    loaded: set.rows.len(),
                })
                .collect(),
            dangling: self.dangling.clone(),
            destination: PathBuf::new(),
        }
    }
}

/// Catalog-driven loader of a flat table into the relational destination.
pub struct Loader<'a> {
    entities: &'a [EntityDef],
}

impl Loader<'static> {
    /// Loader over the full vaccination catalog.
    pub fn catalog() -> Self {
        Loader::new(entities::CATALOG)
    }
}

impl<'a> Loader<'a> {
    pub fn new(entities: &'a [EntityDef]) -> Self {
        Self { entities }
    }

    /// Validate `table` against the catalog and extract every entity.
    ///
    /// Pure: nothing is written. Fails with every missing column at once.
    pub fn plan(&self, table: &FlatTable) -> Result<LoadPlan> {
        let order = entities::load_order(self.entities)?;

        let missing: Vec<MissingColumn> = order
            .iter()
            .flat_map(|entity| missing_columns(table, entity))
            .collect();
        if !missing.is_empty() {
            return Err(LoadError::MissingColumns(missing));
        }

        log_unused_columns(table, &order);

        let sets = order
            .iter()
            .map(|entity| extract(table, entity))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(LoadError::MissingColumns)?;

        let dangling = dangling_references(&order, &sets);

        Ok(LoadPlan { sets, dangling })
    }

    /// Replace the destination's contents with `table`.
    ///
    /// `ddl` recreates every catalog table. Validation and extraction finish
    /// before the destination is touched.
    pub async fn load(
        &self,
        table: &FlatTable,
        ddl: &str,
        destination: &SqliteDestination,
    ) -> Result<LoadReport> {
        let plan = self.plan(table)?;
        self.write(&plan, ddl, destination).await
    }

    /// Write an already validated plan to `destination`.
    pub async fn write(
        &self,
        plan: &LoadPlan,
        ddl: &str,
        destination: &SqliteDestination,
    ) -> Result<LoadReport> {
        for set in &plan.sets {
            debug!(
                table = set.table,
                projected = set.stats.projected,
                null_keys = set.stats.null_keys,
                duplicates = set.stats.duplicates,
                rows = set.rows.len(),
                "Entity extracted"
            );
        }
        for dangling in &plan.dangling {
            warn!(
                table = dangling.table,
                column = dangling.column,
                references = dangling.references,
                rows = dangling.rows,
                "Foreign key values without a referenced row"
            );
        }

        destination.replace(ddl, &plan.sets).await?;

        let report = LoadReport {
            destination: destination.location().to_path_buf(),
            ..plan.report()
        };
        info!(
            destination = %destination.location().display(),
            tables = report.tables.len(),
            rows = report.total_loaded(),
            "Load complete"
        );
        Ok(report)
    }
}

fn log_unused_columns(table: &FlatTable, order: &[&EntityDef]) {
    let used: HashSet<&str> = order
        .iter()
        .flat_map(|e| e.projections.iter().flat_map(|p| p.source_columns()))
        .collect();

    let unused: Vec<&str> = table
        .columns()
        .iter()
        .map(String::as_str)
        .filter(|c| !used.contains(c))
        .collect();

    if !unused.is_empty() {
        debug!(count = unused.len(), columns = ?unused, "Input columns not loaded");
    }
}

/// Count foreign-key values absent from the referenced table's key.
///
/// Only single-column keys are checked.
fn dangling_references(order: &[&EntityDef], sets: &[EntityRows]) -> Vec<DanglingReference> {
    let by_table: HashMap<&str, (&EntityDef, &EntityRows)> = order
        .iter()
        .zip(sets)
        .map(|(entity, set)| (entity.table, (*entity, set)))
        .collect();

    let key_sets: HashMap<&str, BTreeSet<String>> = by_table
        .iter()
        .filter_map(|(table, (entity, set))| {
            let [key] = entity.primary_key else {
                return None;
            };
            let slot = set.column_index(key)?;
            let keys = set.rows.iter().filter_map(|r| key_text(&r[slot])).collect();
            Some((*table, keys))
        })
        .collect();

    let mut dangling = Vec::new();
    for (entity, set) in order.iter().zip(sets) {
        for fk in entity.foreign_keys {
            let (Some(keys), Some(slot)) = (key_sets.get(fk.references), set.column_index(fk.column))
            else {
                continue;
            };
            let rows = set
                .rows
                .iter()
                .filter_map(|r| key_text(&r[slot]))
                .filter(|value| !keys.contains(value))
                .count();
            if rows > 0 {
                dangling.push(DanglingReference {
                    table: entity.table,
                    column: fk.column,
                    references: fk.references,
                    rows,
                });
            }
        }
    }
    dangling
}
