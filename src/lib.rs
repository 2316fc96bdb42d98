//! ONJN registry sync: a polite, resumable registry crawler
//!
//! This crate crawls the paginated public registry of licensed gambling
//! equipment, extracts structured records from the HTML listings and
//! reconciles them against a local SQLite store (insert, update or touch).

pub mod config;
pub mod model;
pub mod output;
pub mod reconcile;
pub mod registry;
pub mod storage;

use thiserror::Error;

/// Main error type for pipeline-wide (fatal) failures
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] registry::CheckpointError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Errors raised while fetching a single registry page
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Connection failed for {url}: {message}")]
    Connect { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Giving up on {url} after {attempts} attempts: {last}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Returns true if another attempt may succeed
    ///
    /// Timeouts, connection failures, 5xx and 429 are transient. Any other
    /// status is a permanent answer from the registry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Connect { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Http { source, .. } => source.is_body() || source.is_request(),
            Self::RetriesExhausted { .. } => false,
        }
    }
}

/// Errors for a single malformed listing row
///
/// These never escape the page boundary; they are collected next to the
/// successfully extracted records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("Row {row}: expected {expected} columns, found {found}")]
    ColumnCount {
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("Row {row}: missing serial number")]
    MissingSerial { row: usize },
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for page fetches
pub type FetchResult<T> = std::result::Result<T, FetchError>;

// Re-export commonly used types
pub use config::Config;
pub use model::RegistryRecord;
pub use output::RunSummary;
pub use reconcile::{reconcile, Decision, Sink};
pub use registry::{sync, CrawlDriver};
