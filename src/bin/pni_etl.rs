//! pni-etl: harvest, load and query PNI dose applications.
//!
//! ## Usage
//! ```text
//! pni-etl harvest --max-pages 3          # registry -> snapshot
//! pni-etl load                           # snapshot -> vacinacao.db
//! pni-etl run                            # both
//! pni-etl queries                        # list named queries
//! pni-etl query historico-paciente --param <id>
//! pni-etl query --sql "SELECT COUNT(*) FROM Aplicacao" --json
//! ```
//!
//! Settings come from `pni-etl.yaml`, `--config`/`PNI_ETL_CONFIG` and
//! `PNI_ETL__*` environment variables; flags below override them.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::error;

use pni_etl::config::Config;
use pni_etl::load::LoadReport;
use pni_etl::pipeline::{self, PipelineError};
use pni_etl::queries;
use pni_etl::storage::{QueryResult, ReadStore};
use pni_etl::utils::bootstrap::init_tracing;

#[derive(Parser)]
#[command(name = "pni-etl")]
#[command(about = "Vaccination dose registry ETL")]
struct Cli {
    /// Configuration file (YAML).
    #[arg(long, global = true)]
    config: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Page through the registry and write the snapshot.
    Harvest {
        #[command(flatten)]
        harvest: HarvestArgs,
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Load the snapshot into the relational database.
    Load {
        #[arg(long)]
        snapshot: Option<PathBuf>,
        #[command(flatten)]
        storage: StorageArgs,
    },
    /// Harvest then load.
    Run {
        #[command(flatten)]
        harvest: HarvestArgs,
        #[arg(long)]
        snapshot: Option<PathBuf>,
        #[command(flatten)]
        storage: StorageArgs,
    },
    /// List the named analysis queries.
    Queries,
    /// Run a named query, or ad-hoc SQL with --sql.
    Query {
        /// Key of a named query (see `queries`).
        #[arg(required_unless_present = "sql", conflicts_with = "sql")]
        name: Option<String>,
        #[arg(long)]
        sql: Option<String>,
        /// Positional parameter, repeatable.
        #[arg(long = "param")]
        params: Vec<String>,
        /// Print rows as JSON instead of a text table.
        #[arg(long, default_value_t = false)]
        json: bool,
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[derive(Args)]
struct HarvestArgs {
    #[arg(long)]
    base_url: Option<String>,
    #[arg(long)]
    page_size: Option<u32>,
    #[arg(long)]
    max_pages: Option<u32>,
    #[arg(long)]
    delay_ms: Option<u64>,
    /// Keep records in memory only.
    #[arg(long, default_value_t = false)]
    no_save: bool,
}

#[derive(Args)]
struct StorageArgs {
    #[arg(long)]
    db: Option<PathBuf>,
    #[arg(long)]
    schema: Option<PathBuf>,
}

impl HarvestArgs {
    fn apply(self, config: &mut Config) {
        if let Some(base_url) = self.base_url {
            config.harvest.base_url = base_url;
        }
        if let Some(page_size) = self.page_size {
            config.harvest.page_size = page_size;
        }
        if let Some(max_pages) = self.max_pages {
            config.harvest.max_pages = max_pages;
        }
        if let Some(delay_ms) = self.delay_ms {
            config.harvest.delay_ms = delay_ms;
        }
        if self.no_save {
            config.snapshot.save = false;
        }
    }
}

impl StorageArgs {
    fn apply(self, config: &mut Config) {
        if let Some(db) = self.db {
            config.storage.path = db;
        }
        if let Some(schema) = self.schema {
            config.storage.schema_path = schema;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "pni-etl failed");
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<(), PipelineError> {
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Harvest { harvest, snapshot } => {
            harvest.apply(&mut config);
            if let Some(path) = snapshot {
                config.snapshot.path = path;
            }
            let harvest = pipeline::harvest(&config).await?;
            println!("{} records harvested ({})", harvest.records.len(), harvest.stop);
        }
        Commands::Load { snapshot, storage } => {
            if let Some(path) = snapshot {
                config.snapshot.path = path;
            }
            storage.apply(&mut config);
            let report = pipeline::load(&config).await?;
            print_report(&report);
        }
        Commands::Run {
            harvest,
            snapshot,
            storage,
        } => {
            harvest.apply(&mut config);
            if let Some(path) = snapshot {
                config.snapshot.path = path;
            }
            storage.apply(&mut config);
            let (harvest, report) = pipeline::run(&config).await?;
            println!("{} records harvested ({})", harvest.records.len(), harvest.stop);
            print_report(&report);
        }
        Commands::Queries => {
            for query in queries::CATALOG {
                let params = if query.params.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", query.params.join(", "))
                };
                println!("{:<24} {}{}", query.key, query.title, params);
            }
        }
        Commands::Query {
            name,
            sql,
            params,
            json,
            db,
        } => {
            let path = db.unwrap_or(config.storage.path);
            let store = ReadStore::open(&path).await?;
            let result = match sql {
                Some(sql) => store.query(&sql, &params).await?,
                None => {
                    let name = name.unwrap_or_default();
                    queries::get(&name)?.run(&store, &params).await?
                }
            };
            print_result(&result, json);
        }
    }

    Ok(())
}

fn print_report(report: &LoadReport) {
    println!("{}", report);
}

fn print_result(result: &QueryResult, json: bool) {
    if !json {
        println!("{}", result.to_text_table());
        return;
    }
    match result.to_json() {
        Ok(text) => println!("{}", text),
        Err(e) => error!(error = %e, "Failed to render rows as JSON"),
    }
}
