//! HTTP page source for the registry REST endpoint.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use super::{HarvestError, PageError, PageRequest, PageSource, RawRecord};
use crate::config::HarvestConfig;

/// Fetches pages with `GET {base}?limit={n}&offset={p}`.
pub struct HttpPageSource {
    client: Client,
    base_url: String,
    records_key: String,
}

impl HttpPageSource {
    /// Create a page source with a bounded per-request timeout.
    pub fn new(
        base_url: impl Into<String>,
        records_key: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, HarvestError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            records_key: records_key.into(),
        })
    }

    /// Create from harvester configuration.
    pub fn from_config(config: &HarvestConfig) -> Result<Self, HarvestError> {
        Self::new(&config.base_url, &config.records_key, config.timeout())
    }

    /// Base endpoint this source queries.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch(&self, request: PageRequest) -> Result<Vec<RawRecord>, PageError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("limit", u64::from(request.limit)),
                ("offset", request.offset),
            ])
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PageError::Status {
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        let body: Value = serde_json::from_slice(&bytes)?;

        debug!(
            page = request.page,
            offset = request.offset,
            bytes = bytes.len(),
            "Page response received"
        );

        Ok(records_from_body(body, &self.records_key))
    }
}

/// Extract the record array stored under `key`.
///
/// A body without the key, or where it is not an array, yields no records.
/// Array elements that are not objects are skipped.
pub(crate) fn records_from_body(body: Value, key: &str) -> Vec<RawRecord> {
    let Value::Object(mut body) = body else {
        warn!(key, "Response body is not an object");
        return Vec::new();
    };

    let Some(Value::Array(items)) = body.remove(key) else {
        return Vec::new();
    };

    let total = items.len();
    let records: Vec<RawRecord> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(record) => Some(record),
            _ => None,
        })
        .collect();

    if records.len() < total {
        warn!(
            skipped = total - records.len(),
            "Skipped non-object elements in response"
        );
    }

    records
}
