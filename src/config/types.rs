use serde::{Deserialize, Serialize};

/// Main configuration structure for urlscope
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub intel: IntelConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    pub output: OutputConfig,
}

/// Where the raw URL stream comes from
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// HTTP(S) URL or local path of the newline-delimited JSON payload
    pub location: String,

    /// Timeout for fetching a remote payload (seconds)
    #[serde(rename = "timeout-secs", default = "default_source_timeout")]
    pub timeout_secs: u64,
}

/// Probe behaviour of the resolver
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolverConfig {
    /// Timeout for the whole probe, redirects included (seconds)
    #[serde(rename = "probe-timeout-secs", default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Maximum number of redirects followed before the probe fails
    #[serde(rename = "max-redirects", default = "default_max_redirects")]
    pub max_redirects: usize,

    /// User-Agent header sent with every probe
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Bodies longer than this are truncated
    #[serde(rename = "max-body-bytes", default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: default_probe_timeout(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Which feature families run, plus their own knobs
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeaturesConfig {
    #[serde(default = "enabled")]
    pub lexical: bool,

    #[serde(default = "enabled")]
    pub content: bool,

    #[serde(default = "enabled")]
    pub header: bool,

    #[serde(default = "enabled")]
    pub host: bool,

    /// Timeout for the direct TLS certificate probe (seconds)
    #[serde(rename = "certificate-timeout-secs", default = "default_certificate_timeout")]
    pub certificate_timeout_secs: u64,

    /// Timeout for DNS lookups (seconds)
    #[serde(rename = "dns-timeout-secs", default = "default_dns_timeout")]
    pub dns_timeout_secs: u64,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            lexical: true,
            content: true,
            header: true,
            host: true,
            certificate_timeout_secs: default_certificate_timeout(),
            dns_timeout_secs: default_dns_timeout(),
        }
    }
}

/// Host threat-intelligence service
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IntelConfig {
    /// Base URL; the host IP is appended as a path segment
    #[serde(default = "default_intel_endpoint")]
    pub endpoint: String,

    /// API key; intel lookups are skipped when absent
    #[serde(rename = "api-key", default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(rename = "timeout-secs", default = "default_intel_timeout")]
    pub timeout_secs: u64,

    /// Fixed wait before the single retry (milliseconds)
    #[serde(rename = "retry-backoff-ms", default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

impl Default for IntelConfig {
    fn default() -> Self {
        Self {
            endpoint: default_intel_endpoint(),
            api_key: None,
            timeout_secs: default_intel_timeout(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

/// Web archive snapshot index
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArchiveConfig {
    #[serde(default = "enabled")]
    pub enabled: bool,

    /// CDX search endpoint
    #[serde(default = "default_archive_endpoint")]
    pub endpoint: String,

    #[serde(rename = "timeout-secs", default = "default_archive_timeout")]
    pub timeout_secs: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_archive_endpoint(),
            timeout_secs: default_archive_timeout(),
        }
    }
}

/// Pipeline scheduling
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Number of records processed concurrently; 1 keeps input order
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path of the JSONL export written by `--export`
    #[serde(rename = "export-path", default = "default_export_path")]
    pub export_path: String,
}

fn enabled() -> bool {
    true
}

fn default_source_timeout() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    3
}

fn default_max_redirects() -> usize {
    10
}

fn default_user_agent() -> String {
    "Mozilla/5.0".to_string()
}

fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_certificate_timeout() -> u64 {
    5
}

fn default_dns_timeout() -> u64 {
    3
}

fn default_intel_endpoint() -> String {
    "https://api.shodan.io/shodan/host".to_string()
}

fn default_intel_timeout() -> u64 {
    1
}

fn default_retry_backoff() -> u64 {
    5000
}

fn default_archive_endpoint() -> String {
    "https://web.archive.org/cdx/search/cdx".to_string()
}

fn default_archive_timeout() -> u64 {
    10
}

fn default_workers() -> usize {
    1
}

fn default_export_path() -> String {
    "./features.jsonl".to_string()
}
