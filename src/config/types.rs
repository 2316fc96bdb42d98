use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for the registry sync
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub registry: RegistryConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    pub output: OutputConfig,
}

/// Where the registry lives and which listing to walk
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Registry origin, e.g. "https://registru.onjn.gov.ro"
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Path of the paginated listing, relative to the base URL
    #[serde(rename = "listing-path")]
    pub listing_path: String,

    /// Extra query parameters sent with every listing request
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
}

/// HTTP behaviour of the page fetcher
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// Browser-like User-Agent sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Whole-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Total attempts per page before giving up
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff unit; attempt N waits N times this (milliseconds)
    #[serde(rename = "retry-base-delay-ms", default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Pause between consecutive page requests (milliseconds)
    #[serde(rename = "request-delay-ms", default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
}

/// Paging and checkpoint cadence
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// Rows the registry renders per listing page
    #[serde(rename = "records-per-page", default = "default_records_per_page")]
    pub records_per_page: u32,

    /// Last page number the crawl will request
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    /// Consecutive empty pages treated as the end of the registry
    #[serde(rename = "empty-page-threshold", default = "default_empty_page_threshold")]
    pub empty_page_threshold: u32,

    /// Write the checkpoint every N pages
    #[serde(rename = "checkpoint-every", default = "default_checkpoint_every")]
    pub checkpoint_every: u32,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path to the JSON checkpoint file
    #[serde(rename = "checkpoint-path")]
    pub checkpoint_path: String,

    /// SQLite busy timeout (milliseconds)
    #[serde(rename = "store-timeout-ms", default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            request_delay_ms: default_request_delay_ms(),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            records_per_page: default_records_per_page(),
            max_pages: default_max_pages(),
            empty_page_threshold: default_empty_page_threshold(),
            checkpoint_every: default_checkpoint_every(),
        }
    }
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36"
        .to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    2000
}

fn default_request_delay_ms() -> u64 {
    500
}

fn default_records_per_page() -> u32 {
    25
}

fn default_max_pages() -> u32 {
    2000
}

fn default_empty_page_threshold() -> u32 {
    10
}

fn default_checkpoint_every() -> u32 {
    10
}

fn default_store_timeout_ms() -> u64 {
    5000
}
