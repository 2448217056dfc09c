//! Storage traits and error types

use crate::features::FeatureValue;
use crate::pipeline::AggregatedRecord;
use crate::storage::{RunRecord, RunStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Record has no '{0}' value")]
    MissingKey(&'static str),

    #[error("Invalid field name '{0}'")]
    InvalidField(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Field equality filters for [`FeatureStore::find`]
///
/// # Examples
///
/// ```
/// use urlscope::storage::StoreQuery;
///
/// let query = StoreQuery::new().field("lx_label", "phishing").limit(10);
/// assert_eq!(query.filters().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StoreQuery {
    filters: Vec<(String, FeatureValue)>,
    limit: Option<usize>,
}

impl StoreQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches rows whose `name` equals `value`; a null value matches
    /// missing or null fields
    pub fn field(mut self, name: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.filters.push((name.into(), value.into()));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn filters(&self) -> &[(String, FeatureValue)] {
        &self.filters
    }

    pub fn max_rows(&self) -> Option<usize> {
        self.limit
    }
}

/// Persisted feature rows, keyed by raw URL
///
/// Implementations must make `insert` a no-op for a key that is already
/// present, so concurrent writers cannot produce duplicate rows.
pub trait FeatureStore: Send {
    // ===== Run Management =====

    /// Creates a new run and returns its ID
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Marks a run as completed with a finish timestamp
    fn complete_run(&mut self, run_id: i64) -> StorageResult<()>;

    // ===== Records =====

    /// Whether any stored row has `field` equal to `value`
    fn exists(&self, field: &str, value: &FeatureValue) -> StorageResult<bool>;

    /// Inserts the row unless its key is already stored
    ///
    /// Returns `true` when a row was written.
    fn insert(&mut self, record: &AggregatedRecord, run_id: Option<i64>) -> StorageResult<bool>;

    /// Rows matching every filter of the query, oldest first
    fn find(&self, query: &StoreQuery) -> StorageResult<Vec<AggregatedRecord>>;

    // ===== Statistics =====

    fn count_records(&self) -> StorageResult<u64>;

    /// Row counts per label; unlabeled rows are grouped under `None`
    fn count_by_label(&self) -> StorageResult<Vec<(Option<String>, u64)>>;

    fn count_records_for_run(&self, run_id: i64) -> StorageResult<u64>;
}
