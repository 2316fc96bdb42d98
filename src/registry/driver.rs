//! Crawl driver - walks the paginated listing
//!
//! The driver owns the run's record set and checkpoint. For every page it
//! fetches, extracts, deduplicates and hands the new records to the sink:
//!
//! ```text
//! Idle -> Paging -> (PageOk | PageEmpty | PageError) -> Paging -> ... -> Done
//! ```
//!
//! The walk ends when the page number passes `max-pages`, after
//! `empty-page-threshold` consecutive empty pages, or when the stop flag is
//! raised. Stops are only observed between pages.

use crate::config::{Config, CrawlConfig};
use crate::output::RunSummary;
use crate::reconcile::Sink;
use crate::registry::checkpoint::{resume_page, Checkpoint, RecordSet};
use crate::registry::extractor::extract_records;
use crate::registry::fetcher::PageFetcher;
use crate::storage::RecordStore;
use crate::SyncError;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pages between two progress log lines
const PROGRESS_EVERY_PAGES: u32 = 10;

fn reports_progress(page: u32) -> bool {
    page % PROGRESS_EVERY_PAGES == 0
}

/// Why a crawl ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The next page number is beyond `max-pages`
    MaxPages,

    /// Too many consecutive pages came back without records
    EndOfRegistry,

    /// The stop flag was raised
    Interrupted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::MaxPages => "page limit reached",
            Self::EndOfRegistry => "end of registry",
            Self::Interrupted => "interrupted",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Idle,
    Paging { page: u32 },
    Done(StopReason),
}

/// Result of crawling a single page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// At least one record was extracted; `new` of them were not seen earlier in the run
    Ok { extracted: usize, new: usize },

    /// The page rendered no records
    Empty,

    /// The page could not be fetched
    Error,
}

/// What a finished crawl reports back
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub summary: RunSummary,
    pub stop_reason: StopReason,
    pub first_page: u32,
    pub last_page: Option<u32>,
    pub records_collected: usize,
}

/// Main crawl driver structure
pub struct CrawlDriver<'a> {
    crawl: CrawlConfig,
    filters: BTreeMap<String, String>,
    request_delay: Duration,
    fetcher: PageFetcher,
    checkpoint: Checkpoint,
    records: RecordSet,
    sink: Sink<'a>,
    stop: Arc<AtomicBool>,
    state: CrawlState,
    summary: RunSummary,
    consecutive_empty: u32,
    start_page: u32,
}

impl<'a> CrawlDriver<'a> {
    /// Creates a driver, resuming from the checkpoint unless `fresh`
    ///
    /// Only an unfinished checkpoint is resumed; after a run that reached its
    /// end the next one starts again at page 1. An unreadable checkpoint is
    /// an error; rerun with `fresh` to discard it.
    pub fn new(
        config: &Config,
        store: &'a mut dyn RecordStore,
        fresh: bool,
    ) -> Result<Self, SyncError> {
        let fetcher = PageFetcher::new(&config.registry, &config.fetcher)?;
        let checkpoint = Checkpoint::new(&config.output.checkpoint_path);

        let records = if fresh {
            tracing::info!("Fresh run requested, ignoring any checkpoint");
            RecordSet::new()
        } else {
            match checkpoint.load()? {
                Some(state) if state.complete => {
                    tracing::info!(
                        "Previous run finished ({} records), starting a new pass",
                        state.records.len()
                    );
                    RecordSet::new()
                }
                Some(state) => {
                    tracing::info!(
                        "Loaded {} records from checkpoint {}",
                        state.records.len(),
                        checkpoint.path().display()
                    );
                    RecordSet::from_records(state.records)
                }
                None => RecordSet::new(),
            }
        };

        let start_page = resume_page(records.len(), config.crawl.records_per_page);
        if start_page > 1 {
            tracing::info!("Resuming at page {}", start_page);
        }

        Ok(Self {
            crawl: config.crawl.clone(),
            filters: config.registry.filters.clone(),
            request_delay: Duration::from_millis(config.fetcher.request_delay_ms),
            fetcher,
            checkpoint,
            records,
            sink: Sink::new(store),
            stop: Arc::new(AtomicBool::new(false)),
            state: CrawlState::Idle,
            summary: RunSummary::default(),
            consecutive_empty: 0,
            start_page,
        })
    }

    /// Shares an externally owned stop flag with the driver
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn start_page(&self) -> u32 {
        self.start_page
    }

    pub fn state(&self) -> CrawlState {
        self.state
    }

    pub fn records(&self) -> &RecordSet {
        &self.records
    }

    /// Runs the crawl to one of its stop conditions
    ///
    /// The checkpoint is written every `checkpoint-every` pages and once more
    /// at the end, whatever the stop reason. Only an interrupted run leaves it
    /// resumable. Only a checkpoint write failure
    /// ends the run with an error.
    pub async fn run(&mut self) -> Result<CrawlReport, SyncError> {
        let started = Instant::now();
        let mut page = self.start_page;
        let mut last_page = None;
        let mut pages_since_checkpoint = 0;

        tracing::info!(
            "Starting crawl at page {} (max {}, empty threshold {})",
            page,
            self.crawl.max_pages,
            self.crawl.empty_page_threshold
        );

        let reason = loop {
            if page > self.crawl.max_pages {
                break StopReason::MaxPages;
            }

            if page > self.start_page {
                tokio::time::sleep(self.request_delay).await;
            }

            if self.stop.load(Ordering::SeqCst) {
                tracing::info!("Stop requested, ending crawl before page {}", page);
                break StopReason::Interrupted;
            }

            self.state = CrawlState::Paging { page };
            let outcome = self.crawl_page(page).await;
            last_page = Some(page);

            match outcome {
                PageOutcome::Ok { .. } => {
                    self.summary.pages_ok += 1;
                    self.consecutive_empty = 0;
                }
                PageOutcome::Empty => {
                    self.summary.pages_ok += 1;
                    self.consecutive_empty += 1;
                }
                PageOutcome::Error => {
                    self.summary.pages_error += 1;
                }
            }

            if self.consecutive_empty >= self.crawl.empty_page_threshold {
                tracing::info!(
                    "{} consecutive empty pages, treating page {} as the end",
                    self.consecutive_empty,
                    page
                );
                break StopReason::EndOfRegistry;
            }

            pages_since_checkpoint += 1;
            if pages_since_checkpoint >= self.crawl.checkpoint_every {
                self.checkpoint.save(self.records.as_slice())?;
                pages_since_checkpoint = 0;
            }

            if reports_progress(page) {
                let elapsed = started.elapsed();
                tracing::info!(
                    "Progress: page {}, {} records collected, {:.2} pages/sec",
                    page,
                    self.records.len(),
                    (self.summary.pages_ok + self.summary.pages_error) as f64
                        / elapsed.as_secs_f64().max(f64::EPSILON)
                );
            }

            page += 1;
        };

        match reason {
            StopReason::Interrupted => self.checkpoint.save(self.records.as_slice())?,
            StopReason::MaxPages | StopReason::EndOfRegistry => {
                self.checkpoint.save_complete(self.records.as_slice())?
            }
        }
        self.state = CrawlState::Done(reason);
        self.sink.verify();

        tracing::info!(
            "Crawl finished ({}): {} records in {:?}",
            reason,
            self.records.len(),
            started.elapsed()
        );

        Ok(CrawlReport {
            summary: self.summary,
            stop_reason: reason,
            first_page: self.start_page,
            last_page,
            records_collected: self.records.len(),
        })
    }

    /// Fetches, extracts and stores one page
    async fn crawl_page(&mut self, page: u32) -> PageOutcome {
        let body = match self.fetcher.fetch_page(page, &self.filters).await {
            Ok(body) => body,
            Err(e) => {
                tracing::error!("Page {} failed: {}", page, e);
                return PageOutcome::Error;
            }
        };

        let page_url = self.fetcher.list_url(page, &self.filters);
        let extraction = extract_records(&body, &page_url, self.fetcher.base_url());
        self.summary.errors += extraction.errors.len() as u64;

        if extraction.is_empty() {
            tracing::debug!("Page {} is empty", page);
            return PageOutcome::Empty;
        }

        let extracted = extraction.records.len();
        let new_records = self.records.merge(extraction.records);
        self.summary.scraped += new_records.len() as u64;

        let counters = self.sink.apply_batch(&new_records);
        self.summary.absorb(&counters);

        tracing::debug!(
            "Page {}: {} records, {} new (+{} ~{} ={} !{})",
            page,
            extracted,
            new_records.len(),
            counters.inserted,
            counters.updated,
            counters.unchanged,
            counters.errors
        );

        PageOutcome::Ok {
            extracted,
            new: new_records.len(),
        }
    }
}
