//! Paginated harvesting of the dose registry API.
//!
//! The harvester walks pages `0..max_pages` of a [`PageSource`] and folds
//! every record into one sequence. It never raises transport problems to
//! the caller: the first failed or empty page ends the run and whatever was
//! collected so far is returned together with the [`StopReason`].

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::HarvestConfig;
use crate::snapshot::{self, SnapshotError};

mod http;

pub use http::HttpPageSource;

/// One harvested unit: an open-ended field → scalar mapping.
pub type RawRecord = serde_json::Map<String, Value>;

/// Errors building a harvester.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Errors fetching a single page. Any of them terminates the harvest.
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("HTTP status {status}")]
    Status { status: u16 },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid response body: {0}")]
    Body(#[from] serde_json::Error),
}

/// Unit of the `offset` query parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetUnit {
    /// Offset counts pages: 0, 1, 2, ...
    #[default]
    Page,
    /// Offset counts records: 0, limit, 2 * limit, ...
    Record,
}

impl OffsetUnit {
    /// Offset sent for the given zero-based page.
    pub fn offset(self, page: u32, page_size: u32) -> u64 {
        match self {
            OffsetUnit::Page => u64::from(page),
            OffsetUnit::Record => u64::from(page) * u64::from(page_size),
        }
    }
}

/// Parameters of one page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Zero-based page index within the run.
    pub page: u32,
    /// Records requested (`limit`).
    pub limit: u32,
    /// Value of the `offset` parameter.
    pub offset: u64,
}

/// Source of record pages.
///
/// Implementations:
/// - `HttpPageSource`: the registry REST endpoint
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch one page. An empty vector signals the end of the data.
    async fn fetch(&self, request: PageRequest) -> Result<Vec<RawRecord>, PageError>;
}

/// Why a harvest ended.
#[derive(Debug)]
pub enum StopReason {
    /// A page came back without records.
    EmptyPage { page: u32 },
    /// A page request failed; earlier pages are kept.
    Failed { page: u32, error: PageError },
    /// The page ceiling was reached.
    MaxPages,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::EmptyPage { page } => write!(f, "page {} was empty", page),
            StopReason::Failed { page, error } => write!(f, "page {} failed: {}", page, error),
            StopReason::MaxPages => write!(f, "page limit reached"),
        }
    }
}

/// Result of one harvest run.
#[derive(Debug)]
pub struct Harvest {
    /// Every record collected, in page order.
    pub records: Vec<RawRecord>,
    /// Pages that returned records.
    pub pages: u32,
    /// Why the run ended.
    pub stop: StopReason,
}

impl Harvest {
    /// True when the run ended on a failed request.
    pub fn is_partial(&self) -> bool {
        matches!(self.stop, StopReason::Failed { .. })
    }
}

/// Paginated harvester over a [`PageSource`].
pub struct Harvester<S> {
    source: S,
    page_size: u32,
    max_pages: u32,
    delay: Duration,
    offset_unit: OffsetUnit,
}

impl Harvester<HttpPageSource> {
    /// Create a harvester against the configured HTTP endpoint.
    pub fn from_config(config: &HarvestConfig) -> Result<Self, HarvestError> {
        let source = HttpPageSource::from_config(config)?;
        Ok(Self::new(source, config))
    }
}

impl<S: PageSource> Harvester<S> {
    /// Create a harvester over an arbitrary page source.
    pub fn new(source: S, config: &HarvestConfig) -> Self {
        Self {
            source,
            page_size: config.page_size,
            max_pages: config.max_pages,
            delay: config.delay(),
            offset_unit: config.offset_unit,
        }
    }

    /// Request pages until one is empty, one fails, or the ceiling is hit.
    pub async fn harvest(&self) -> Harvest {
        let mut records = Vec::new();
        let mut pages = 0;

        for page in 0..self.max_pages {
            if page > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let request = PageRequest {
                page,
                limit: self.page_size,
                offset: self.offset_unit.offset(page, self.page_size),
            };

            match self.source.fetch(request).await {
                Ok(batch) if batch.is_empty() => {
                    info!(page, "No records on page, harvest complete");
                    return Harvest {
                        records,
                        pages,
                        stop: StopReason::EmptyPage { page },
                    };
                }
                Ok(batch) => {
                    info!(page, records = batch.len(), "Page harvested");
                    records.extend(batch);
                    pages += 1;
                }
                Err(error) => {
                    warn!(page, error = %error, "Page request failed, stopping harvest");
                    return Harvest {
                        records,
                        pages,
                        stop: StopReason::Failed { page, error },
                    };
                }
            }
        }

        Harvest {
            records,
            pages,
            stop: StopReason::MaxPages,
        }
    }

    /// Harvest, then persist every collected record to `snapshot_path`.
    ///
    /// Partial harvests are saved too.
    pub async fn harvest_and_save(&self, snapshot_path: &Path) -> Result<Harvest, SnapshotError> {
        let harvest = self.harvest().await;
        snapshot::write(snapshot_path, &harvest.records)?;
        info!(
            path = %snapshot_path.display(),
            records = harvest.records.len(),
            "Snapshot saved"
        );
        Ok(harvest)
    }
}

#[cfg(test)]
mod tests;
