//! onjn-sync main entry point
//!
//! This is the command-line interface for the registry sync.

use anyhow::Context;
use clap::Parser;
use onjn_sync::config::{load_config_with_hash, Config};
use onjn_sync::output::{load_statistics, print_statistics, print_summary};
use onjn_sync::registry::{self, resume_page, Checkpoint, PageFetcher, COLUMN_LAYOUT_VERSION};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// onjn-sync: keeps a local copy of the gambling equipment registry
///
/// Walks the paginated public listing politely, checkpoints progress so an
/// interrupted run resumes where it stopped, and reconciles every record
/// into a SQLite store.
#[derive(Parser, Debug)]
#[command(name = "onjn-sync")]
#[command(version = "1.0.0")]
#[command(about = "Resumable sync of the ONJN equipment registry", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Ignore the checkpoint and start from page 1
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["stats", "import"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "import"])]
    stats: bool,

    /// Reconcile the checkpoint file into the database without crawling
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "fresh"])]
    import: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.import {
        let summary = registry::import_checkpoint(&config, &config_hash)?;
        print_summary(&summary, cli.json);
    } else {
        handle_sync(&config, &config_hash, cli.fresh, cli.json).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("onjn_sync=info,warn"),
            1 => EnvFilter::new("onjn_sync=debug,info"),
            2 => EnvFilter::new("onjn_sync=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles --dry-run: validates config and shows where the crawl would start
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== onjn-sync Dry Run ===\n");

    let fetcher = PageFetcher::new(&config.registry, &config.fetcher)?;
    println!("Registry:");
    println!("  First listing page: {}", fetcher.list_url(1, &config.registry.filters));
    if !config.registry.filters.is_empty() {
        println!("  Filters:");
        for (key, value) in &config.registry.filters {
            println!("    {} = {}", key, value);
        }
    }
    println!("  Column layout: v{}", COLUMN_LAYOUT_VERSION);

    println!("\nFetcher:");
    println!("  User agent: {}", config.fetcher.user_agent);
    println!("  Timeout: {}s", config.fetcher.timeout_secs);
    println!(
        "  Retries: {} (base delay {}ms)",
        config.fetcher.max_retries, config.fetcher.retry_base_delay_ms
    );
    println!("  Delay between pages: {}ms", config.fetcher.request_delay_ms);

    println!("\nCrawl:");
    println!("  Records per page: {}", config.crawl.records_per_page);
    println!("  Max pages: {}", config.crawl.max_pages);
    println!("  Empty page threshold: {}", config.crawl.empty_page_threshold);
    println!("  Checkpoint every: {} pages", config.crawl.checkpoint_every);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Checkpoint: {}", config.output.checkpoint_path);

    let checkpoint = Checkpoint::new(&config.output.checkpoint_path);
    let start_page = match checkpoint.load()? {
        Some(state) if state.complete => {
            println!(
                "  Checkpoint holds {} records from a finished run",
                state.records.len()
            );
            1
        }
        Some(state) => {
            println!("  Checkpoint holds {} records", state.records.len());
            resume_page(state.records.len(), config.crawl.records_per_page)
        }
        None => 1,
    };

    println!("\n✓ Configuration is valid");
    println!("✓ Would start crawling at page {}", start_page);

    Ok(())
}

/// Handles --stats: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let store = registry::open_store(config)?;
    let stats = load_statistics(&store)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main sync operation
async fn handle_sync(
    config: &Config,
    config_hash: &str,
    fresh: bool,
    as_json: bool,
) -> anyhow::Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    let listener_flag = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current page");
            listener_flag.store(true, Ordering::SeqCst);
        }
    });

    let report = match registry::sync(config, config_hash, fresh, stop).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Sync failed: {}", e);
            return Err(e.into());
        }
    };

    tracing::info!(
        "Sync ended ({}) after pages {}..{}",
        report.stop_reason,
        report.first_page,
        report
            .last_page
            .map_or_else(|| "-".to_string(), |page| page.to_string())
    );
    print_summary(&report.summary, as_json);

    Ok(())
}
