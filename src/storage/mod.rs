//! Storage module for persisting registry records
//!
//! This module handles all database operations for the sync, including:
//! - SQLite database initialization and schema management
//! - Upsert, full update and timestamp-only touch keyed by serial number
//! - Sync run tracking with final counters
//! - Read-only statistics queries

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{RecordStore, StorageError, StorageResult};

use chrono::{DateTime, Utc};

/// Bookkeeping columns the store maintains next to each record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowMeta {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_scraped_at: DateTime<Utc>,
}

/// Represents a sync run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub config_hash: String,
    pub status: RunStatus,
    pub summary: crate::output::RunSummary,
}

/// Status of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
