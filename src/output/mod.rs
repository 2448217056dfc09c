//! Output module for reporting on stored features
//!
//! This module handles:
//! - Store statistics (records by label, latest run)
//! - JSONL export of stored rows
//! - The declared schema printed by dry runs

mod export;
pub mod stats;

pub use export::{export_jsonl, write_jsonl};
pub use stats::{load_statistics, print_statistics, StoreStatistics};

use crate::features::FeatureSet;
use std::sync::Arc;

/// Prints every declared feature name, grouped by family
pub fn print_schema(feature_sets: &[Arc<dyn FeatureSet>]) {
    println!("=== Declared Features ===\n");

    let mut total = 0;
    for set in feature_sets {
        let names = set.names();
        total += names.len();
        println!("{} ({} features):", set.family(), names.len());
        for name in names {
            println!("  {}", name);
        }
        println!();
    }

    println!("Total: {} features", total);
}
