//! Raw URL input
//!
//! The source is a newline-delimited JSON payload of `{url, label?}` objects,
//! fetched in one piece from an HTTP(S) location or read from a local file.

mod loader;

pub use loader::{parse_records, SourceLoader};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that stop the source from being read at all
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to fetch source {location}: {source}")]
    Fetch {
        location: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Source {location} returned HTTP {status}")]
    Status { location: String, status: u16 },

    #[error("Failed to read source file {location}: {source}")]
    Read {
        location: String,
        #[source]
        source: std::io::Error,
    },
}

/// Classification label attached to a raw URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlLabel {
    Benign,
    Malware,
    Defacement,
    Phishing,
}

impl UrlLabel {
    pub const ALL: [UrlLabel; 4] = [
        UrlLabel::Benign,
        UrlLabel::Malware,
        UrlLabel::Defacement,
        UrlLabel::Phishing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Benign => "benign",
            Self::Malware => "malware",
            Self::Defacement => "defacement",
            Self::Phishing => "phishing",
        }
    }
}

impl fmt::Display for UrlLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UrlLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "benign" => Ok(Self::Benign),
            "malware" => Ok(Self::Malware),
            "defacement" => Ok(Self::Defacement),
            "phishing" => Ok(Self::Phishing),
            other => Err(format!("unknown label '{}'", other)),
        }
    }
}

/// One input line: a raw URL and its optional label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawUrlRecord {
    pub url: String,
    pub label: Option<UrlLabel>,
}

impl RawUrlRecord {
    pub fn new(url: impl Into<String>, label: Option<UrlLabel>) -> Self {
        Self {
            url: url.into(),
            label,
        }
    }
}
