//! Shared utilities for integration tests.
//!
//! Provides a throwaway HTTP responder standing in for the registry API and
//! helpers pointing a [`Config`] at temporary files.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pni_etl::config::Config;
use pni_etl::harvest::RawRecord;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Bundled DDL script.
pub fn schema_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("schema/vacinacao.sql")
}

/// Four-record snapshot covering duplicates, null keys and shared dimensions.
pub fn sample_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/doses_sample.json")
}

pub fn sample_records() -> Vec<RawRecord> {
    let text = std::fs::read_to_string(sample_path()).expect("fixture readable");
    serde_json::from_str(&text).expect("fixture is an array of objects")
}

/// Config whose snapshot and database live under `dir`.
pub fn config_in(dir: &Path) -> Config {
    let mut config = Config::default();
    config.snapshot.path = dir.join("snapshot.json");
    config.storage.path = dir.join("vacinacao.db");
    config.storage.schema_path = schema_path();
    config.harvest.delay_ms = 0;
    config.harvest.timeout_secs = 5;
    config
}

/// Canned HTTP response.
#[derive(Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    /// Wait before writing anything back.
    pub delay: Duration,
}

impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
            delay: Duration::ZERO,
        }
    }

    /// Empty page answered only after `delay`.
    pub fn stall(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::ok(r#"{"doses_aplicadas_pni": []}"#)
        }
    }

    /// Success response carrying `records` under the registry key.
    pub fn records(records: &[RawRecord]) -> Self {
        Self::ok(serde_json::json!({ "doses_aplicadas_pni": records }).to_string())
    }
}

/// Minimal HTTP/1.1 server replaying `replies` in order, one per connection.
///
/// Requests past the script get an empty record array. Returns the base URL
/// and a handle to the request targets seen so far.
pub async fn serve(replies: Vec<Reply>) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);

    tokio::spawn(async move {
        let mut served = 0;
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };

            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            }

            let head = String::from_utf8_lossy(&buf);
            let target = head
                .lines()
                .next()
                .and_then(|line| line.split_whitespace().nth(1))
                .unwrap_or_default()
                .to_string();
            log.lock().unwrap().push(target);

            let reply = replies
                .get(served)
                .cloned()
                .unwrap_or_else(|| Reply::ok(r#"{"doses_aplicadas_pni": []}"#));
            served += 1;

            if !reply.delay.is_zero() {
                tokio::time::sleep(reply.delay).await;
            }

            let response = format!(
                "HTTP/1.1 {} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                reply.status,
                reply.body.len(),
                reply.body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    (format!("http://{}/doses", addr), seen)
}
