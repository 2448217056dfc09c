use crate::config::SourceConfig;
use crate::source::{RawUrlRecord, SourceError, UrlLabel};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Shape of one input line before label decoding
#[derive(Debug, Deserialize)]
struct SourceLine {
    url: String,
    #[serde(default)]
    label: Option<String>,
}

/// Fetches the raw URL payload from its configured location
pub struct SourceLoader {
    location: String,
    timeout: Duration,
}

impl SourceLoader {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            location: config.location.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    fn is_remote(&self) -> bool {
        let lower = self.location.to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }

    /// Reads the whole payload
    ///
    /// A source that cannot be reached is fatal for the run.
    pub async fn fetch(&self) -> Result<String, SourceError> {
        if !self.is_remote() {
            return tokio::fs::read_to_string(&self.location)
                .await
                .map_err(|source| SourceError::Read {
                    location: self.location.clone(),
                    source,
                });
        }

        let fetch_err = |source| SourceError::Fetch {
            location: self.location.clone(),
            source,
        };

        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(fetch_err)?;
        let response = client
            .get(&self.location)
            .send()
            .await
            .map_err(fetch_err)?;

        if !response.status().is_success() {
            return Err(SourceError::Status {
                location: self.location.clone(),
                status: response.status().as_u16(),
            });
        }

        response.text().await.map_err(fetch_err)
    }

    /// Fetches and decodes the payload
    ///
    /// Returns the decoded records and the number of lines that failed to
    /// decode.
    pub async fn load(&self) -> Result<(Vec<RawUrlRecord>, usize), SourceError> {
        let payload = self.fetch().await?;
        let (records, malformed) = parse_records(&payload);
        tracing::info!(
            "Loaded {} records from {} ({} malformed lines skipped)",
            records.len(),
            self.location,
            malformed
        );
        Ok((records, malformed))
    }
}

/// Decodes newline-delimited JSON records
///
/// Blank lines are ignored. Lines that are not valid records are logged and
/// skipped. An unknown label decodes as no label.
///
/// # Examples
///
/// ```
/// use urlscope::source::{parse_records, UrlLabel};
///
/// let payload = "{\"url\": \"a.com\", \"label\": \"phishing\"}\n\n{\"url\": \"b.com\"}\n";
/// let (records, malformed) = parse_records(payload);
/// assert_eq!(records.len(), 2);
/// assert_eq!(records[0].label, Some(UrlLabel::Phishing));
/// assert_eq!(malformed, 0);
/// ```
pub fn parse_records(payload: &str) -> (Vec<RawUrlRecord>, usize) {
    let mut records = Vec::new();
    let mut malformed = 0;

    for (index, line) in payload.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let decoded: SourceLine = match serde_json::from_str(line) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!("Skipping malformed source line {}: {}", index + 1, e);
                malformed += 1;
                continue;
            }
        };

        let label = decoded.label.and_then(|raw| match raw.parse::<UrlLabel>() {
            Ok(label) => Some(label),
            Err(e) => {
                tracing::warn!("Line {}: {}, treating as unlabelled", index + 1, e);
                None
            }
        });

        records.push(RawUrlRecord::new(decoded.url, label));
    }

    (records, malformed)
}
