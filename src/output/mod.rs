//! Output module for run summaries and store statistics
//!
//! This module handles:
//! - The run-level counters every sync produces
//! - Printing those counters for the CLI (text or JSON)
//! - Loading read-only statistics from the record store

pub mod stats;
mod summary;

pub use stats::{load_statistics, print_statistics, RegistryStatistics};
pub use summary::{print_summary, RunSummary};
