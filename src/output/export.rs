//! JSONL export of stored feature rows
//!
//! One JSON object per line with every feature as a top-level member, the
//! flat shape training code reads directly.

use crate::pipeline::AggregatedRecord;
use crate::storage::{FeatureStore, StoreQuery};
use crate::ScopeError;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes rows as JSON lines, returning how many were written
pub fn write_jsonl<'a, W, I>(writer: &mut W, records: I) -> Result<usize, ScopeError>
where
    W: Write,
    I: IntoIterator<Item = &'a AggregatedRecord>,
{
    let mut written = 0;
    for record in records {
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

/// Exports every row matching `query` to a JSONL file
pub fn export_jsonl(
    storage: &dyn FeatureStore,
    query: &StoreQuery,
    path: &Path,
) -> Result<usize, ScopeError> {
    let records = storage.find(query)?;
    let mut writer = BufWriter::new(File::create(path)?);
    let written = write_jsonl(&mut writer, &records)?;
    tracing::info!("Exported {} records to {}", written, path.display());
    Ok(written)
}
