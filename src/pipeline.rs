//! End-to-end stages driven by [`Config`].
//!
//! Each stage checks its inputs (snapshot, DDL script) before the
//! destination is opened, so a missing artifact never touches the database.

use tracing::info;

use crate::config::{Config, ConfigError};
use crate::flatten::{self, FlatTable};
use crate::harvest::{Harvest, HarvestError, Harvester};
use crate::load::{LoadError, LoadReport, Loader};
use crate::queries::QueryError;
use crate::snapshot::SnapshotError;
use crate::storage::{schema, SqliteDestination, StorageError};

/// Any failure of a pipeline stage.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Harvest(#[from] HarvestError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Query(#[from] QueryError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Harvest the registry, saving the snapshot when configured to.
pub async fn harvest(config: &Config) -> Result<Harvest> {
    config.validate()?;
    let harvester = Harvester::from_config(&config.harvest)?;

    let harvest = if config.snapshot.save {
        harvester.harvest_and_save(&config.snapshot.path).await?
    } else {
        harvester.harvest().await
    };

    info!(
        records = harvest.records.len(),
        pages = harvest.pages,
        stop = %harvest.stop,
        "Harvest finished"
    );
    Ok(harvest)
}

/// Flatten the configured snapshot and load it into the destination.
pub async fn load(config: &Config) -> Result<LoadReport> {
    let ddl = schema::read_ddl(&config.storage.schema_path)?;
    let table = flatten::flatten(&config.snapshot.path)?;
    info!(
        path = %config.snapshot.path.display(),
        rows = table.len(),
        columns = table.columns().len(),
        "Snapshot flattened"
    );
    load_table(config, &ddl, &table).await
}

/// Harvest then load.
///
/// With snapshot saving disabled the harvested records are loaded directly.
pub async fn run(config: &Config) -> Result<(Harvest, LoadReport)> {
    let ddl = schema::read_ddl(&config.storage.schema_path)?;
    let harvest = harvest(config).await?;

    let report = if config.snapshot.save {
        load(config).await?
    } else {
        let table = FlatTable::from_records(harvest.records.iter().cloned());
        load_table(config, &ddl, &table).await?
    };

    Ok((harvest, report))
}

async fn load_table(config: &Config, ddl: &str, table: &FlatTable) -> Result<LoadReport> {
    let loader = Loader::catalog();
    // Validate before creating or opening the database file.
    let plan = loader.plan(table)?;

    let destination = SqliteDestination::open(&config.storage.path).await?;
    let report = loader.write(&plan, ddl, &destination).await?;
    destination.pool().close().await;
    Ok(report)
}
