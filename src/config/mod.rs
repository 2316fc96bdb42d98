//! Configuration module for the registry sync
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use onjn_sync::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("onjn-sync.toml")).unwrap();
//! println!("Crawling at most {} pages", config.crawl.max_pages);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlConfig, FetcherConfig, OutputConfig, RegistryConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
