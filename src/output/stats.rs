//! Statistics generation from the record store
//!
//! This module provides functionality for extracting and displaying
//! registry statistics from the storage layer.

use crate::storage::{RecordStore, RunRecord};
use crate::SyncError;

/// How many counties `--stats` lists
const TOP_COUNTIES: usize = 10;

/// Registry statistics summary
#[derive(Debug, Clone)]
pub struct RegistryStatistics {
    /// Total number of records in the store
    pub total_records: u64,

    /// Records whose expiry date has passed
    pub expired_records: u64,

    /// Count of records by status, most frequent first
    pub records_by_status: Vec<(String, u64)>,

    /// Counties with the most records
    pub top_counties: Vec<(String, u64)>,

    /// The most recent sync run, if any
    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from storage
pub fn load_statistics(store: &dyn RecordStore) -> Result<RegistryStatistics, SyncError> {
    Ok(RegistryStatistics {
        total_records: store.count_records()?,
        expired_records: store.count_expired()?,
        records_by_status: store.count_by_status()?,
        top_counties: store.top_counties(TOP_COUNTIES)?,
        latest_run: store.get_latest_run()?,
    })
}

fn percentage(part: u64, total: u64) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &RegistryStatistics) {
    println!("=== Registry Statistics ===\n");

    println!("Overview:");
    println!("  Total records: {}", stats.total_records);
    println!(
        "  Expired: {} ({:.1}%)",
        stats.expired_records,
        percentage(stats.expired_records, stats.total_records)
    );
    println!();

    if !stats.records_by_status.is_empty() {
        println!("Records by Status:");
        for (status, count) in &stats.records_by_status {
            println!(
                "  {}: {} ({:.1}%)",
                status,
                count,
                percentage(*count, stats.total_records)
            );
        }
        println!();
    }

    if !stats.top_counties.is_empty() {
        println!("Top Counties ({}):", stats.top_counties.len());
        for (county, count) in &stats.top_counties {
            println!("  - {}: {}", county, count);
        }
        println!();
    }

    match &stats.latest_run {
        Some(run) => {
            println!("Latest Run #{}:", run.id);
            println!("  Status: {}", run.status.to_db_string());
            println!("  Started: {}", run.started_at.to_rfc3339());
            if let Some(finished) = run.finished_at {
                let elapsed = finished - run.started_at;
                println!(
                    "  Finished: {} ({}s)",
                    finished.to_rfc3339(),
                    elapsed.num_seconds()
                );
            }
            println!(
                "  Scraped {} | inserted {} | updated {} | unchanged {} | errors {}",
                run.summary.scraped,
                run.summary.inserted,
                run.summary.updated,
                run.summary.unchanged,
                run.summary.errors
            );
            println!(
                "  Pages ok {} | pages failed {}",
                run.summary.pages_ok, run.summary.pages_error
            );
        }
        None => println!("No sync runs recorded yet"),
    }
}
