//! Feature sets
//!
//! Each feature set consumes one [`ResolvedUrl`] and produces a flat list of
//! named values. Every set declares its feature names statically through a
//! manifest of `(name, extractor)` pairs, so the schema of a run is known
//! before any URL is processed.
//!
//! | Family  | Prefix | Inputs                                   |
//! |---------|--------|------------------------------------------|
//! | Lexical | `lx_`  | resolved URL string and its components   |
//! | Content | `ct_`  | probe body parsed as HTML                |
//! | Header  | `hd_`  | probe headers, TLS certificate           |
//! | Host    | `ht_`  | DNS, threat-intel service, web archive   |

pub mod certificate;
pub mod content;
mod entropy;
pub mod header;
pub mod host;
pub mod lexical;
mod value;

pub use content::ContentFeatures;
pub use entropy::shannon_entropy;
pub use header::HeaderFeatures;
pub use host::HostFeatures;
pub use lexical::LexicalFeatures;
pub use value::FeatureValue;

use crate::config::Config;
use crate::intel::{CdxArchive, HostIntelClient};
use crate::resolver::ResolvedUrl;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// The closed family of feature sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum FeatureFamily {
    Lexical,
    Content,
    Header,
    Host,
}

impl FeatureFamily {
    /// Prefix shared by every feature name of the family
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Lexical => "lx_",
            Self::Content => "ct_",
            Self::Header => "hd_",
            Self::Host => "ht_",
        }
    }
}

impl fmt::Display for FeatureFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lexical => "lexical",
            Self::Content => "content",
            Self::Header => "header",
            Self::Host => "host",
        };
        f.write_str(name)
    }
}

/// Errors raised by a feature set as a whole
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("{family} extraction failed: {message}")]
    Extraction {
        family: FeatureFamily,
        message: String,
    },

    #[error("{family} extraction panicked: {message}")]
    Panicked {
        family: FeatureFamily,
        message: String,
    },
}

/// Output of one feature set for one URL
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    family: FeatureFamily,
    values: Vec<(&'static str, FeatureValue)>,
}

impl FeatureRecord {
    pub fn new(family: FeatureFamily, values: Vec<(&'static str, FeatureValue)>) -> Self {
        Self { family, values }
    }

    /// A record with every declared name set to null
    pub fn nulls(family: FeatureFamily, names: &[&'static str]) -> Self {
        Self {
            family,
            values: names.iter().map(|name| (*name, FeatureValue::Null)).collect(),
        }
    }

    pub fn family(&self) -> FeatureFamily {
        self.family
    }

    pub fn values(&self) -> &[(&'static str, FeatureValue)] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.values
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    pub fn into_values(self) -> Vec<(&'static str, FeatureValue)> {
        self.values
    }
}

/// A single feature computed from a family-specific context
pub type Extractor<C> = fn(&C) -> FeatureValue;

/// Static declaration of a family's features, in output order
pub type Manifest<C> = &'static [(&'static str, Extractor<C>)];

/// Runs every extractor of a manifest against one context
pub fn evaluate<C>(family: FeatureFamily, manifest: Manifest<C>, ctx: &C) -> FeatureRecord {
    FeatureRecord::new(
        family,
        manifest
            .iter()
            .map(|(name, extract)| (*name, extract(ctx)))
            .collect(),
    )
}

/// Names declared by a manifest
pub fn manifest_names<C>(manifest: Manifest<C>) -> Vec<&'static str> {
    manifest.iter().map(|(name, _)| *name).collect()
}

/// A family of features computed from a resolved URL
///
/// Implementations must declare all of their names up front and return a
/// record carrying exactly those names. Individual values that cannot be
/// computed are null; an `Err` means the whole set failed and the pipeline
/// substitutes nulls for every declared name.
#[async_trait]
pub trait FeatureSet: Send + Sync {
    fn family(&self) -> FeatureFamily;

    fn names(&self) -> Vec<&'static str>;

    async fn extract(&self, resolved: &ResolvedUrl) -> Result<FeatureRecord, FeatureError>;
}

/// Builds the feature sets enabled in the configuration
pub fn build_feature_sets(config: &Config) -> Result<Vec<Arc<dyn FeatureSet>>, reqwest::Error> {
    let mut sets: Vec<Arc<dyn FeatureSet>> = Vec::new();

    if config.features.lexical {
        sets.push(Arc::new(LexicalFeatures));
    }
    if config.features.content {
        sets.push(Arc::new(ContentFeatures));
    }
    if config.features.header {
        sets.push(Arc::new(HeaderFeatures::from_config(&config.features)));
    }
    if config.features.host {
        let intel = match &config.intel.api_key {
            Some(_) => Some(HostIntelClient::new(&config.intel)?),
            None => {
                tracing::warn!("No intel API key configured, host intel features will be null");
                None
            }
        };
        let archive = if config.archive.enabled {
            Some(CdxArchive::new(&config.archive)?)
        } else {
            None
        };
        sets.push(Arc::new(HostFeatures::new(
            &config.features,
            intel.map(|c| Arc::new(c) as Arc<dyn crate::intel::IntelSource>),
            archive.map(|c| Arc::new(c) as Arc<dyn crate::intel::ArchiveSource>),
        )));
    }

    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ctx(i64);

    const MANIFEST: Manifest<Ctx> = &[
        ("t_double", |c| FeatureValue::Int(c.0 * 2)),
        ("t_negative", |c| FeatureValue::Bool(c.0 < 0)),
    ];

    #[test]
    fn test_evaluate_keeps_manifest_order() {
        let record = evaluate(FeatureFamily::Lexical, MANIFEST, &Ctx(-2));
        assert_eq!(
            record.values(),
            &[
                ("t_double", FeatureValue::Int(-4)),
                ("t_negative", FeatureValue::Bool(true)),
            ]
        );
        assert_eq!(manifest_names(MANIFEST), vec!["t_double", "t_negative"]);
    }

    #[test]
    fn test_nulls_record() {
        let record = FeatureRecord::nulls(FeatureFamily::Content, &["ct_a", "ct_b"]);
        assert_eq!(record.family(), FeatureFamily::Content);
        assert!(record.values().iter().all(|(_, v)| v.is_null()));
        assert_eq!(record.get("ct_b"), Some(&FeatureValue::Null));
        assert_eq!(record.get("ct_c"), None);
    }

    #[test]
    fn test_family_display_and_prefix() {
        assert_eq!(FeatureFamily::Header.to_string(), "header");
        assert_eq!(FeatureFamily::Host.prefix(), "ht_");
    }

    #[test]
    fn test_build_feature_sets_respects_toggles() {
        let config = crate::config::parse_config(
            r#"
[source]
location = "./urls.jsonl"

[features]
content = false
host = false

[output]
database-path = "./features.db"
"#,
            None,
        )
        .unwrap();

        let sets = build_feature_sets(&config).unwrap();
        let families: Vec<_> = sets.iter().map(|s| s.family()).collect();
        assert_eq!(families, vec![FeatureFamily::Lexical, FeatureFamily::Header]);
    }
}
