//! Statistics over the feature store
//!
//! This module provides functionality for extracting and displaying
//! record counts and run information from the storage layer.

use crate::storage::{FeatureStore, RunRecord};
use crate::ScopeError;

/// Feature store statistics summary
#[derive(Debug, Clone)]
pub struct StoreStatistics {
    /// Total number of stored rows
    pub total_records: u64,

    /// Rows per label, unlabeled rows under `None`
    pub records_by_label: Vec<(Option<String>, u64)>,

    /// The most recent run, if any
    pub latest_run: Option<RunRecord>,

    /// Rows written by the most recent run
    pub latest_run_records: u64,
}

/// Loads statistics from storage
pub fn load_statistics(storage: &dyn FeatureStore) -> Result<StoreStatistics, ScopeError> {
    let total_records = storage.count_records()?;
    let records_by_label = storage.count_by_label()?;
    let latest_run = storage.get_latest_run()?;

    let latest_run_records = match &latest_run {
        Some(run) => storage.count_records_for_run(run.id)?,
        None => 0,
    };

    Ok(StoreStatistics {
        total_records,
        records_by_label,
        latest_run,
        latest_run_records,
    })
}

/// Duration of a finished run in seconds
pub fn run_duration_seconds(run: &RunRecord) -> Option<i64> {
    let started = run.started_at.parse::<chrono::DateTime<chrono::Utc>>().ok()?;
    let finished = run
        .finished_at
        .as_deref()?
        .parse::<chrono::DateTime<chrono::Utc>>()
        .ok()?;
    Some((finished - started).num_seconds())
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &StoreStatistics) {
    println!("=== Feature Store Statistics ===\n");

    println!("Overview:");
    println!("  Total records: {}", stats.total_records);
    println!();

    println!("Records by Label:");
    let mut label_counts: Vec<_> = stats.records_by_label.iter().collect();
    label_counts.sort_by(|a, b| b.1.cmp(&a.1));

    for (label, count) in label_counts {
        let percentage = if stats.total_records > 0 {
            (*count as f64 / stats.total_records as f64) * 100.0
        } else {
            0.0
        };
        println!(
            "  {}: {} ({:.1}%)",
            label.as_deref().unwrap_or("(unlabeled)"),
            count,
            percentage
        );
    }
    println!();

    match &stats.latest_run {
        Some(run) => {
            println!("Latest Run:");
            println!("  ID: {}", run.id);
            println!("  Status: {}", run.status.to_db_string());
            println!("  Started: {}", run.started_at);
            if let Some(finished) = &run.finished_at {
                println!("  Finished: {}", finished);
            }
            if let Some(seconds) = run_duration_seconds(run) {
                println!("  Duration: {}s", seconds);
            }
            println!("  Config hash: {}", run.config_hash);
            println!("  Records written: {}", stats.latest_run_records);
        }
        None => println!("No runs recorded."),
    }
}
