//! Configuration for the ETL pipeline.
//!
//! Supports a YAML file and environment variable overrides.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::harvest::OffsetUnit;

/// Default configuration file name (looked up in the working directory).
pub const DEFAULT_CONFIG_FILE: &str = "pni-etl.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "PNI_ETL_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "PNI_ETL";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "PNI_ETL_LOG";

/// Registry endpoint for 2025 dose applications.
pub const DEFAULT_BASE_URL: &str =
    "https://apidadosabertos.saude.gov.br/vacinacao/doses-aplicadas-pni-2025";
/// Key holding the record array in each response body.
pub const DEFAULT_RECORDS_KEY: &str = "doses_aplicadas_pni";

/// Pipeline configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Harvester configuration.
    pub harvest: HarvestConfig,
    /// Snapshot file configuration.
    pub snapshot: SnapshotConfig,
    /// Destination database configuration.
    pub storage: StorageConfig,
}

/// Harvester configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Base endpoint, without query string.
    pub base_url: String,
    /// Key of the record array in each response body.
    pub records_key: String,
    /// Records requested per page (`limit`).
    pub page_size: u32,
    /// Page ceiling for one run.
    pub max_pages: u32,
    /// Fixed delay between consecutive requests, in milliseconds.
    pub delay_ms: u64,
    /// Per-request timeout, in seconds.
    pub timeout_secs: u64,
    /// Unit of the `offset` query parameter.
    pub offset_unit: OffsetUnit,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            records_key: DEFAULT_RECORDS_KEY.to_string(),
            page_size: 1000,
            max_pages: 100,
            delay_ms: 1000,
            timeout_secs: 30,
            offset_unit: OffsetUnit::Page,
        }
    }
}

impl HarvestConfig {
    /// Delay between consecutive page requests.
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Snapshot file configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Path of the consolidated JSON snapshot.
    pub path: PathBuf,
    /// Write the snapshot after harvesting.
    pub save: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("dados_vacinacao_2025.json"),
            save: true,
        }
    }
}

/// Destination database configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
    /// Path to the DDL script recreating the schema.
    pub schema_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("vacinacao.db"),
            schema_path: PathBuf::from("schema/vacinacao.sql"),
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `pni-etl.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no harvest can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.harvest.page_size == 0 {
            return Err(ConfigError::Invalid("harvest.page_size must be at least 1".into()));
        }
        if self.harvest.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "harvest.timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.harvest.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.harvest.records_key, "doses_aplicadas_pni");
        assert_eq!(config.harvest.page_size, 1000);
        assert_eq!(config.harvest.max_pages, 100);
        assert_eq!(config.harvest.delay(), Duration::from_secs(1));
        assert_eq!(config.harvest.offset_unit, OffsetUnit::Page);
        assert!(config.snapshot.save);
        assert_eq!(config.storage.path, PathBuf::from("vacinacao.db"));
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
harvest:
  page_size: 500
  max_pages: 3
  delay_ms: 0
  offset_unit: record

snapshot:
  path: /tmp/doses.json
  save: false

storage:
  path: /tmp/test.db
"#;

        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.harvest.page_size, 500);
        assert_eq!(config.harvest.max_pages, 3);
        assert_eq!(config.harvest.delay(), Duration::ZERO);
        assert_eq!(config.harvest.offset_unit, OffsetUnit::Record);
        assert_eq!(config.harvest.records_key, DEFAULT_RECORDS_KEY);
        assert!(!config.snapshot.save);
        assert_eq!(config.storage.path, PathBuf::from("/tmp/test.db"));
        assert_eq!(
            config.storage.schema_path,
            PathBuf::from("schema/vacinacao.sql")
        );
    }

    #[test]
    fn test_example_file_matches_defaults() {
        let yaml = include_str!("../pni-etl.example.yaml");
        let config = Config::from_yaml(yaml).unwrap();
        let defaults = Config::default();
        assert_eq!(config.harvest.base_url, defaults.harvest.base_url);
        assert_eq!(config.harvest.timeout(), defaults.harvest.timeout());
        assert_eq!(config.snapshot.path, defaults.snapshot.path);
        assert_eq!(config.storage.schema_path, defaults.storage.schema_path);
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"harvest:\n  max_pages: 7\n").unwrap();

        let config = Config::load(file.path().to_str()).unwrap();

        assert_eq!(config.harvest.max_pages, 7);
        assert_eq!(config.harvest.page_size, 1000);
    }

    #[test]
    fn test_load_missing_explicit_file() {
        assert!(matches!(
            Config::load(Some("/nonexistent/pni-etl.yaml")),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let yaml = "harvest:\n  page_size: 0\n";
        assert!(matches!(Config::from_yaml(yaml), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"harvest:\n  timeout_secs: 0\n").unwrap();

        assert!(matches!(
            Config::load(file.path().to_str()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_parse_yaml_rejects_unknown_offset_unit() {
        let yaml = "harvest:\n  offset_unit: bytes\n";
        assert!(matches!(Config::from_yaml(yaml), Err(ConfigError::Parse(_))));
    }
}
