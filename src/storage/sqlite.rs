//! SQLite storage implementation
//!
//! Feature rows are stored as one JSON document per raw URL. The key and the
//! label also get their own columns; every other field is reached through
//! `json_extract`.

use crate::features::FeatureValue;
use crate::pipeline::{AggregatedRecord, KEY_FIELD};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{FeatureStore, StorageError, StorageResult, StoreQuery};
use crate::storage::{RunRecord, RunStatus};
use crate::ScopeError;
use chrono::Utc;
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> Result<Self, ScopeError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, ScopeError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

/// SQL expression reading `field` out of a stored row
///
/// Field names are restricted to identifier characters so they can be
/// spliced into a JSON path.
fn field_expr(field: &str) -> StorageResult<String> {
    if field == KEY_FIELD {
        return Ok("url_raw".to_string());
    }
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(StorageError::InvalidField(field.to_string()));
    }
    Ok(format!("json_extract(features, '$.{}')", field))
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
    })
}

impl FeatureStore for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;

        Ok(run)
    }

    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let finished = (status != RunStatus::Running).then_some(now);
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), finished, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn complete_run(&mut self, run_id: i64) -> StorageResult<()> {
        self.update_run_status(run_id, RunStatus::Completed)
    }

    // ===== Records =====

    fn exists(&self, field: &str, value: &FeatureValue) -> StorageResult<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM records WHERE {} IS ?1)",
            field_expr(field)?
        );
        let found: bool = self.conn.query_row(&sql, params![value], |row| row.get(0))?;
        Ok(found)
    }

    fn insert(&mut self, record: &AggregatedRecord, run_id: Option<i64>) -> StorageResult<bool> {
        let key = record.key().ok_or(StorageError::MissingKey(KEY_FIELD))?;
        let features = serde_json::to_string(record)?;
        let now = Utc::now().to_rfc3339();

        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO records (url_raw, label, features, run_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![key, record.label(), features, run_id, now],
        )?;

        Ok(inserted == 1)
    }

    fn find(&self, query: &StoreQuery) -> StorageResult<Vec<AggregatedRecord>> {
        let mut sql = String::from("SELECT features FROM records");
        let mut conditions = Vec::with_capacity(query.filters().len());
        for (i, (field, _)) in query.filters().iter().enumerate() {
            conditions.push(format!("{} IS ?{}", field_expr(field)?, i + 1));
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY id");
        if let Some(limit) = query.max_rows() {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let values: Vec<&dyn ToSql> = query
            .filters()
            .iter()
            .map(|(_, value)| value as &dyn ToSql)
            .collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(values.as_slice(), |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(serde_json::from_str(&row?)?);
        }
        Ok(records)
    }

    // ===== Statistics =====

    fn count_records(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_by_label(&self) -> StorageResult<Vec<(Option<String>, u64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT label, COUNT(*) FROM records GROUP BY label ORDER BY label")?;

        let counts = stmt
            .query_map([], |row| {
                Ok((row.get::<_, Option<String>>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(counts)
    }

    fn count_records_for_run(&self, run_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
