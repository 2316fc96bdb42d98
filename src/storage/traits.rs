//! Storage traits and error types
//!
//! This module defines the trait interface for the record store and
//! associated error types.

use crate::model::RegistryRecord;
use crate::output::RunSummary;
use crate::storage::{RowMeta, RunRecord, RunStatus};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for record store implementations
///
/// Every write is keyed by serial number and touches a single row, so each
/// call is independently idempotent and no multi-row transaction is needed.
pub trait RecordStore {
    // ===== Run Management =====

    /// Creates a new sync run and returns its ID
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Stores the final status and counters of a run
    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        summary: &RunSummary,
    ) -> StorageResult<()>;

    // ===== Records =====

    /// Looks up a record by its natural key
    fn get_by_serial(&self, serial_number: &str) -> StorageResult<Option<RegistryRecord>>;

    /// Inserts a record, replacing all fields if the serial number already exists
    fn insert_record(&mut self, record: &RegistryRecord) -> StorageResult<()>;

    /// Replaces every field of an existing record and bumps `updated_at`
    fn update_record(&mut self, record: &RegistryRecord) -> StorageResult<()>;

    /// Advances only `last_scraped_at`
    fn touch_record(&mut self, serial_number: &str, scraped_at: DateTime<Utc>)
        -> StorageResult<()>;

    /// Gets the bookkeeping timestamps of a record
    fn get_row_meta(&self, serial_number: &str) -> StorageResult<Option<RowMeta>>;

    // ===== Statistics =====

    /// Gets total record count
    fn count_records(&self) -> StorageResult<u64>;

    /// Counts records whose expiry date has passed
    fn count_expired(&self) -> StorageResult<u64>;

    /// Counts records per status, most frequent first
    fn count_by_status(&self) -> StorageResult<Vec<(String, u64)>>;

    /// Counts records per county, most frequent first
    fn top_counties(&self, limit: usize) -> StorageResult<Vec<(String, u64)>>;
}
