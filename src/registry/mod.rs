//! Registry crawling
//!
//! This module walks the public registry listing and feeds the store:
//! - HTTP fetching with retry logic
//! - Extraction of records from listing tables
//! - Checkpointing of the run's record set
//! - Overall crawl coordination

pub mod checkpoint;
mod driver;
pub mod extractor;
mod fetcher;

pub use checkpoint::{resume_page, Checkpoint, CheckpointError, CheckpointState, RecordSet};
pub use driver::{CrawlDriver, CrawlReport, CrawlState, PageOutcome, StopReason};
pub use extractor::{extract_records, Extraction, COLUMN_LAYOUT_VERSION, EXPECTED_COLUMNS};
pub use fetcher::{build_http_client, PageFetcher};

use crate::config::Config;
use crate::output::RunSummary;
use crate::reconcile::Sink;
use crate::storage::{RecordStore, RunStatus, SqliteStore};
use crate::SyncError;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// Opens the configured record store
pub fn open_store(config: &Config) -> Result<SqliteStore, SyncError> {
    SqliteStore::new(
        Path::new(&config.output.database_path),
        Duration::from_millis(config.output.store_timeout_ms),
    )
}

/// Runs one complete sync against the registry
///
/// Records a `sync_runs` row for the run. The run ends `completed` or
/// `interrupted` on a normal stop and `failed` when the crawl returns an
/// error, which is then passed on.
pub async fn sync(
    config: &Config,
    config_hash: &str,
    fresh: bool,
    stop: Arc<AtomicBool>,
) -> Result<CrawlReport, SyncError> {
    let mut store = open_store(config)?;
    let run_id = store.create_run(config_hash)?;
    tracing::info!("Starting sync run {}", run_id);

    let outcome = run_crawl(config, &mut store, fresh, stop).await;

    match outcome {
        Ok(report) => {
            let status = match report.stop_reason {
                StopReason::Interrupted => RunStatus::Interrupted,
                _ => RunStatus::Completed,
            };
            store.finish_run(run_id, status, &report.summary)?;
            tracing::info!("Sync run {} {}", run_id, status.to_db_string());
            Ok(report)
        }
        Err(e) => {
            if let Err(finish_err) =
                store.finish_run(run_id, RunStatus::Failed, &RunSummary::default())
            {
                tracing::warn!("Could not mark run {} as failed: {}", run_id, finish_err);
            }
            Err(e)
        }
    }
}

async fn run_crawl(
    config: &Config,
    store: &mut dyn RecordStore,
    fresh: bool,
    stop: Arc<AtomicBool>,
) -> Result<CrawlReport, SyncError> {
    let mut driver = CrawlDriver::new(config, store, fresh)?.with_stop_flag(stop);
    driver.run().await
}

/// Reconciles the records of an existing checkpoint into the store
///
/// No page is fetched. A missing checkpoint imports nothing.
pub fn import_checkpoint(config: &Config, config_hash: &str) -> Result<RunSummary, SyncError> {
    let checkpoint = Checkpoint::new(&config.output.checkpoint_path);
    let records = match checkpoint.load()? {
        Some(state) => RecordSet::from_records(state.records),
        None => {
            tracing::warn!(
                "No checkpoint at {}, nothing to import",
                checkpoint.path().display()
            );
            RecordSet::new()
        }
    };

    let mut store = open_store(config)?;
    let run_id = store.create_run(config_hash)?;
    tracing::info!(
        "Importing {} records from {} (run {})",
        records.len(),
        checkpoint.path().display(),
        run_id
    );

    let counters = {
        let mut sink = Sink::new(&mut store);
        let counters = sink.apply_batch(records.as_slice());
        sink.verify();
        counters
    };

    let mut summary = RunSummary {
        scraped: records.len() as u64,
        ..RunSummary::default()
    };
    summary.absorb(&counters);

    store.finish_run(run_id, RunStatus::Completed, &summary)?;
    Ok(summary)
}
