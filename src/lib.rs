//! urlscope: URL canonicalization and feature extraction
//!
//! This crate turns raw URLs into flat records of engineered features for
//! URL classification (benign, malware, defacement, phishing). A URL is
//! resolved once against the network, then handed to a family of feature
//! sets (lexical, content, header, host) whose outputs are merged into one
//! record and persisted.

pub mod config;
pub mod features;
pub mod intel;
pub mod output;
pub mod pipeline;
pub mod resolver;
pub mod source;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for urlscope operations
#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Source error: {0}")]
    Source(#[from] source::SourceError),

    #[error("Feature name '{name}' is declared by both {first} and {second}")]
    FeatureCollision {
        name: String,
        first: features::FeatureFamily,
        second: features::FeatureFamily,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for urlscope operations
pub type Result<T> = std::result::Result<T, ScopeError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use features::{FeatureFamily, FeatureRecord, FeatureSet, FeatureValue};
pub use pipeline::{aggregate, AggregatedRecord, Pipeline, PipelineStats};
pub use resolver::{ResolvedUrl, Resolver};
pub use source::{RawUrlRecord, UrlLabel};
pub use storage::{FeatureStore, SqliteStorage};
