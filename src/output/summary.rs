//! Run summary counters

use crate::reconcile::SinkCounters;
use serde::Serialize;

/// Counters reported at the end of every sync run
///
/// `errors` covers both rows the extractor rejected and records the sink
/// failed to write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub scraped: u64,
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub errors: u64,
    pub pages_ok: u64,
    pub pages_error: u64,
}

impl RunSummary {
    /// Folds the sink's write counters into the summary
    pub fn absorb(&mut self, counters: &SinkCounters) {
        self.inserted += counters.inserted;
        self.updated += counters.updated;
        self.unchanged += counters.unchanged;
        self.errors += counters.errors;
    }

    /// Records that reached the store, whatever the decision
    pub fn written(&self) -> u64 {
        self.inserted + self.updated + self.unchanged
    }
}

/// Prints the summary to stdout
pub fn print_summary(summary: &RunSummary, as_json: bool) {
    if as_json {
        match serde_json::to_string_pretty(summary) {
            Ok(json) => println!("{}", json),
            Err(e) => tracing::error!("Failed to serialize run summary: {}", e),
        }
        return;
    }

    println!("=== Sync Summary ===\n");
    println!("Pages:");
    println!("  Fetched: {}", summary.pages_ok);
    println!("  Failed: {}", summary.pages_error);
    println!();
    println!("Records:");
    println!("  Scraped: {}", summary.scraped);
    println!("  Inserted: {}", summary.inserted);
    println!("  Updated: {}", summary.updated);
    println!("  Unchanged: {}", summary.unchanged);
    println!("  Errors: {}", summary.errors);
}
