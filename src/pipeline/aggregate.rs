//! Merging feature records into one flat row

use crate::features::{FeatureFamily, FeatureRecord, FeatureSet, FeatureValue};
use crate::ScopeError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Column every stored record is keyed by
pub const KEY_FIELD: &str = "lx_url_raw";

/// Column holding the classification label
pub const LABEL_FIELD: &str = "lx_label";

/// One flat row: the union of every feature set's values for a URL
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregatedRecord {
    values: BTreeMap<String, FeatureValue>,
}

impl AggregatedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value, returning the one it replaced
    pub fn insert(&mut self, name: impl Into<String>, value: FeatureValue) -> Option<FeatureValue> {
        self.values.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.values.get(name)
    }

    /// The raw URL this row was computed for
    pub fn key(&self) -> Option<&str> {
        self.get(KEY_FIELD).and_then(FeatureValue::as_str)
    }

    pub fn label(&self) -> Option<&str> {
        self.get(LABEL_FIELD).and_then(FeatureValue::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// The row as a JSON object, one member per feature
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.values
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
        )
    }
}

/// Merges feature records in input order
///
/// A name produced twice keeps the later value; the overwrite is logged.
pub fn aggregate<I>(records: I) -> AggregatedRecord
where
    I: IntoIterator<Item = FeatureRecord>,
{
    let mut merged = AggregatedRecord::new();
    let mut owners: HashMap<&'static str, FeatureFamily> = HashMap::new();

    for record in records {
        let family = record.family();
        for (name, value) in record.into_values() {
            if let Some(previous) = owners.insert(name, family) {
                tracing::warn!(
                    "Feature '{}' from {} overwrites the value from {}",
                    name,
                    family,
                    previous
                );
            }
            merged.insert(name, value);
        }
    }

    merged
}

/// Rejects feature sets whose declared names overlap
pub fn ensure_disjoint(sets: &[Arc<dyn FeatureSet>]) -> Result<(), ScopeError> {
    let mut owners: HashMap<&'static str, FeatureFamily> = HashMap::new();

    for set in sets {
        let family = set.family();
        for name in set.names() {
            if let Some(first) = owners.insert(name, family) {
                return Err(ScopeError::FeatureCollision {
                    name: name.to_string(),
                    first,
                    second: family,
                });
            }
        }
    }

    Ok(())
}
