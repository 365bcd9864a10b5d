//! Process bootstrap for the `pni-etl` binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LOG_ENV_VAR;

/// Initialize tracing from the PNI_ETL_LOG environment variable.
///
/// Defaults to "info" if PNI_ETL_LOG is not set. Output goes to stderr so
/// query results on stdout stay clean.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
