//! Threat-intelligence host lookups
//!
//! The service answers `GET {endpoint}/{ip}?key={api-key}` with a JSON host
//! document: open ports, known vulnerabilities, per-port service banners and
//! a handful of location/ownership attributes.

use crate::config::IntelConfig;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

const TLS_PORT: u16 = 443;

/// Timestamp layout used by the service for certificate dates
const CERT_TIME_FORMAT: &str = "%Y%m%d%H%M%SZ";

#[derive(Debug, Error)]
pub enum IntelError {
    #[error("Intel request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Intel service rate limited the request")]
    RateLimited,

    #[error("Intel service returned HTTP {0}")]
    Status(u16),
}

/// Certificate facts as reported by the intel service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntelCertificate {
    pub issued: Option<String>,
    pub expires: Option<String>,
    pub version: Option<Value>,
}

impl IntelCertificate {
    pub fn issued_at(&self) -> Option<NaiveDateTime> {
        parse_cert_time(self.issued.as_deref())
    }

    pub fn expires_at(&self) -> Option<NaiveDateTime> {
        parse_cert_time(self.expires.as_deref())
    }
}

fn parse_cert_time(value: Option<&str>) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value?, CERT_TIME_FORMAT).ok()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SslInfo {
    pub cert: Option<IntelCertificate>,
}

/// One service banner
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceBanner {
    pub port: Option<u16>,
    pub ssl: Option<SslInfo>,
}

/// Host document returned by the intel service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostIntel {
    #[serde(default)]
    pub domains: Vec<String>,

    #[serde(default)]
    pub ports: Vec<u16>,

    /// A list of identifiers or a map keyed by identifier
    #[serde(default)]
    pub vulns: Value,

    #[serde(default)]
    pub data: Vec<ServiceBanner>,

    /// Location and ownership attributes (`region_code`, `city`, `asn`, ...)
    #[serde(flatten)]
    pub attributes: HashMap<String, Value>,
}

impl HostIntel {
    pub fn num_vulnerabilities(&self) -> usize {
        match &self.vulns {
            Value::Array(items) => items.len(),
            Value::Object(map) => map.len(),
            _ => 0,
        }
    }

    /// A location/ownership attribute as text with commas removed, empty
    /// when missing or null
    pub fn attribute(&self, name: &str) -> String {
        let text = match self.attributes.get(name) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        text.replace(',', "")
    }

    /// Certificate from the last TLS banner on port 443
    pub fn certificate(&self) -> Option<&IntelCertificate> {
        self.data
            .iter()
            .rev()
            .find(|banner| banner.port == Some(TLS_PORT))
            .and_then(|banner| banner.ssl.as_ref())
            .and_then(|ssl| ssl.cert.as_ref())
    }
}

/// Seam for host intelligence lookups
#[async_trait]
pub trait IntelSource: Send + Sync {
    async fn lookup(&self, ip: &str) -> Result<HostIntel, IntelError>;
}

/// HTTP client for the intel service
pub struct HostIntelClient {
    client: Client,
    endpoint: String,
    api_key: String,
    backoff: Duration,
}

impl HostIntelClient {
    pub fn new(config: &IntelConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().unwrap_or_default(),
            backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    async fn request(&self, ip: &str) -> Result<HostIntel, IntelError> {
        let response = self
            .client
            .get(format!("{}/{}", self.endpoint, ip))
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => Err(IntelError::RateLimited),
            status if !status.is_success() => Err(IntelError::Status(status.as_u16())),
            _ => Ok(response.json().await?),
        }
    }
}

#[async_trait]
impl IntelSource for HostIntelClient {
    /// Looks the address up, retrying once after the configured backoff
    async fn lookup(&self, ip: &str) -> Result<HostIntel, IntelError> {
        match self.request(ip).await {
            Ok(intel) => Ok(intel),
            Err(e) => {
                tracing::warn!(
                    "Intel lookup for {} failed ({}), retrying in {:?}",
                    ip,
                    e,
                    self.backoff
                );
                tokio::time::sleep(self.backoff).await;
                self.request(ip).await
            }
        }
    }
}
