//! Extraction pipeline
//!
//! Streams raw records through dedup, resolution, feature extraction,
//! aggregation and storage:
//!
//! ```text
//! RawUrlRecord -> dedup -> Resolver -> {Lexical, Content, Header, Host}
//!              -> aggregate -> FeatureStore::insert
//! ```
//!
//! A URL already in the store (or being processed by another worker) is
//! skipped before any network work happens. Feature sets fail alone: an
//! error or panic in one set stores nulls for its declared names and the
//! record is still written. Store errors abort the run.

mod aggregate;

pub use aggregate::{aggregate, ensure_disjoint, AggregatedRecord, KEY_FIELD, LABEL_FIELD};

use crate::config::Config;
use crate::features::{build_feature_sets, FeatureRecord, FeatureSet, FeatureValue};
use crate::resolver::{ResolvedUrl, Resolver};
use crate::source::RawUrlRecord;
use crate::storage::FeatureStore;
use crate::ScopeError;
use futures::future::join_all;
use futures::stream::{self, TryStreamExt};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

/// Counters for one pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Records taken from the input
    pub processed: usize,
    /// Rows written to the store
    pub inserted: usize,
    /// Records already stored or already in flight
    pub skipped: usize,
    /// Feature sets that errored or panicked and were replaced by nulls
    pub failed_sets: usize,
}

impl PipelineStats {
    fn record(&mut self, outcome: &Outcome) {
        self.processed += 1;
        match outcome {
            Outcome::Skipped => self.skipped += 1,
            Outcome::Stored {
                inserted,
                failed_sets,
            } => {
                if *inserted {
                    self.inserted += 1;
                } else {
                    self.skipped += 1;
                }
                self.failed_sets += failed_sets;
            }
        }
    }
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed, {} inserted, {} skipped, {} feature set failures",
            self.processed, self.inserted, self.skipped, self.failed_sets
        )
    }
}

enum Outcome {
    Skipped,
    Stored { inserted: bool, failed_sets: usize },
}

/// Runs raw records through the feature sets into a store
pub struct Pipeline<S: FeatureStore> {
    resolver: Resolver,
    feature_sets: Vec<Arc<dyn FeatureSet>>,
    store: Arc<Mutex<S>>,
    in_flight: Mutex<HashSet<String>>,
    workers: usize,
    run_id: Option<i64>,
}

impl<S: FeatureStore> Pipeline<S> {
    /// Creates a pipeline over the given feature sets
    ///
    /// # Errors
    ///
    /// Returns [`ScopeError::FeatureCollision`] when two sets declare the
    /// same feature name.
    pub fn new(
        resolver: Resolver,
        feature_sets: Vec<Arc<dyn FeatureSet>>,
        store: Arc<Mutex<S>>,
    ) -> Result<Self, ScopeError> {
        ensure_disjoint(&feature_sets)?;

        Ok(Self {
            resolver,
            feature_sets,
            store,
            in_flight: Mutex::new(HashSet::new()),
            workers: 1,
            run_id: None,
        })
    }

    /// Builds the resolver and the enabled feature sets from configuration
    pub fn from_config(config: &Config, store: Arc<Mutex<S>>) -> Result<Self, ScopeError> {
        let resolver = Resolver::from_config(&config.resolver)?;
        let feature_sets = build_feature_sets(config)?;
        Ok(Self::new(resolver, feature_sets, store)?.with_workers(config.pipeline.workers))
    }

    /// Number of records processed concurrently
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Tags inserted rows with a run
    pub fn with_run_id(mut self, run_id: i64) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Every feature name a stored row can carry, in family order
    pub fn schema(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self
            .feature_sets
            .iter()
            .flat_map(|set| set.names())
            .collect();
        for field in [KEY_FIELD, LABEL_FIELD] {
            if !names.contains(&field) {
                names.push(field);
            }
        }
        names
    }

    /// Processes every record, returning the run's counters
    ///
    /// Stops at the first store error.
    pub async fn run<I>(&self, records: I) -> Result<PipelineStats, ScopeError>
    where
        I: IntoIterator<Item = RawUrlRecord>,
    {
        let stats = Mutex::new(PipelineStats::default());

        stream::iter(records.into_iter().map(Ok::<_, ScopeError>))
            .try_for_each_concurrent(self.workers, |record| {
                let stats = &stats;
                async move {
                    let outcome = self.process(record).await?;
                    stats
                        .lock()
                        .map_err(|_| ScopeError::LockPoisoned)?
                        .record(&outcome);
                    Ok(())
                }
            })
            .await?;

        let stats = stats.into_inner().map_err(|_| ScopeError::LockPoisoned)?;
        tracing::info!("Pipeline finished: {}", stats);
        Ok(stats)
    }

    async fn process(&self, record: RawUrlRecord) -> Result<Outcome, ScopeError> {
        if !self.claim(&record.url)? {
            tracing::info!("Seen before, skipping {}", record.url);
            return Ok(Outcome::Skipped);
        }

        let result = self.extract_and_store(&record).await;
        self.release(&record.url)?;
        result
    }

    /// Checks the store and the in-flight set, claiming the key when new
    ///
    /// Both checks happen while the store lock is held, so two workers can
    /// never claim the same URL.
    fn claim(&self, url: &str) -> Result<bool, ScopeError> {
        let store = self.store.lock().map_err(|_| ScopeError::LockPoisoned)?;
        let mut in_flight = self.in_flight.lock().map_err(|_| ScopeError::LockPoisoned)?;

        if in_flight.contains(url) || store.exists(KEY_FIELD, &FeatureValue::from(url))? {
            return Ok(false);
        }

        in_flight.insert(url.to_string());
        Ok(true)
    }

    fn release(&self, url: &str) -> Result<(), ScopeError> {
        self.in_flight
            .lock()
            .map_err(|_| ScopeError::LockPoisoned)?
            .remove(url);
        Ok(())
    }

    async fn extract_and_store(&self, record: &RawUrlRecord) -> Result<Outcome, ScopeError> {
        let resolved = self.resolver.resolve(record).await;
        tracing::debug!("Resolved {} -> {}", record.url, resolved.resolved_url());

        let results = join_all(
            self.feature_sets
                .iter()
                .map(|set| run_feature_set(set.as_ref(), &resolved)),
        )
        .await;

        let failed_sets = results.iter().filter(|(_, ok)| !ok).count();
        let mut merged = aggregate(results.into_iter().map(|(record, _)| record));
        if merged.get(KEY_FIELD).is_none() {
            merged.insert(KEY_FIELD, record.url.as_str().into());
        }
        if merged.get(LABEL_FIELD).is_none() {
            merged.insert(LABEL_FIELD, record.label.map(|l| l.as_str()).into());
        }

        let inserted = self
            .store
            .lock()
            .map_err(|_| ScopeError::LockPoisoned)?
            .insert(&merged, self.run_id)?;

        if inserted {
            tracing::debug!("Stored {} features for {}", merged.len(), record.url);
        } else {
            tracing::info!("Seen before, not storing {}", record.url);
        }

        Ok(Outcome::Stored {
            inserted,
            failed_sets,
        })
    }
}

/// Runs one feature set, substituting nulls when it errors or panics
///
/// The returned flag is false when the substitution happened.
async fn run_feature_set(set: &dyn FeatureSet, resolved: &ResolvedUrl) -> (FeatureRecord, bool) {
    let family = set.family();
    let names = set.names();

    match AssertUnwindSafe(set.extract(resolved)).catch_unwind().await {
        Ok(Ok(record)) => (conform(record, &names), true),
        Ok(Err(e)) => {
            tracing::warn!(
                "Error computing {} features for {}: {}",
                family,
                resolved.raw_url(),
                e
            );
            (FeatureRecord::nulls(family, &names), false)
        }
        Err(panic) => {
            tracing::warn!(
                "Error computing {} features for {}: panicked: {}",
                family,
                resolved.raw_url(),
                panic_message(panic.as_ref())
            );
            (FeatureRecord::nulls(family, &names), false)
        }
    }
}

/// Makes a record carry exactly the declared names
fn conform(record: FeatureRecord, names: &[&'static str]) -> FeatureRecord {
    let family = record.family();
    let mut values = record.into_values();

    values.retain(|(name, _)| {
        let declared = names.contains(name);
        if !declared {
            tracing::warn!("Dropping undeclared {} feature '{}'", family, name);
        }
        declared
    });
    for name in names {
        if !values.iter().any(|(n, _)| n == name) {
            values.push((*name, FeatureValue::Null));
        }
    }

    FeatureRecord::new(family, values)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
