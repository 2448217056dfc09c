//! Web archive snapshot index (CDX search API)

use crate::config::ArchiveConfig;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

const CDX_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Archive request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Archive returned HTTP {0}")]
    Status(u16),

    #[error("Unexpected archive response: {0}")]
    Format(String),
}

/// One archived capture of a URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub timestamp: NaiveDateTime,
    pub status_code: Option<u16>,
}

impl Snapshot {
    /// Whether the capture recorded a 200 response
    pub fn is_live(&self) -> bool {
        self.status_code == Some(200)
    }
}

/// Seam for snapshot lookups
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    /// Captures of exactly `url`, oldest first
    async fn snapshots(&self, url: &str) -> Result<Vec<Snapshot>, ArchiveError>;
}

/// HTTP client for a CDX search endpoint
pub struct CdxArchive {
    client: Client,
    endpoint: String,
}

impl CdxArchive {
    pub fn new(config: &ArchiveConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl ArchiveSource for CdxArchive {
    async fn snapshots(&self, url: &str) -> Result<Vec<Snapshot>, ArchiveError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("url", url), ("matchType", "exact"), ("output", "json")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArchiveError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        parse_cdx(&body)
    }
}

/// Parses a CDX JSON table
///
/// The first row names the columns. Rows with an unreadable timestamp are
/// skipped; an empty body means no captures.
pub fn parse_cdx(body: &str) -> Result<Vec<Snapshot>, ArchiveError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let rows: Vec<Vec<Value>> =
        serde_json::from_str(body).map_err(|e| ArchiveError::Format(e.to_string()))?;
    let Some((header, rows)) = rows.split_first() else {
        return Ok(Vec::new());
    };

    let column = |name: &str| header.iter().position(|h| h.as_str() == Some(name));
    let timestamp_col = column("timestamp")
        .ok_or_else(|| ArchiveError::Format("missing timestamp column".to_string()))?;
    let status_col = column("statuscode");

    let mut snapshots = Vec::with_capacity(rows.len());
    for row in rows {
        let timestamp = row
            .get(timestamp_col)
            .and_then(Value::as_str)
            .and_then(|ts| NaiveDateTime::parse_from_str(ts, CDX_TIME_FORMAT).ok());
        let Some(timestamp) = timestamp else {
            tracing::debug!("Skipping malformed archive row: {:?}", row);
            continue;
        };

        let status_code = status_col
            .and_then(|col| row.get(col))
            .and_then(Value::as_str)
            .and_then(|code| code.parse().ok());

        snapshots.push(Snapshot {
            timestamp,
            status_code,
        });
    }

    Ok(snapshots)
}
