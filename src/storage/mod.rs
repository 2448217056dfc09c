//! Storage module for persisting feature rows
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Insert-if-absent feature rows keyed by raw URL
//! - Field queries over stored rows
//! - Run tracking

mod schema;
mod sqlite;
mod traits;

pub use schema::SCHEMA_SQL;
pub use sqlite::SqliteStorage;
pub use traits::{FeatureStore, StorageError, StorageResult, StoreQuery};

use crate::ScopeError;
use std::path::Path;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> Result<SqliteStorage, ScopeError> {
    SqliteStorage::new(path)
}

/// Represents an extraction run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of an extraction run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
