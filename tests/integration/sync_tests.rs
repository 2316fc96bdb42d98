//! End-to-end sync tests against a file-backed store

use crate::common::{
    forbid_page, listing_page, listing_page_with_rows, mount_empty_pages, mount_page, row,
    test_config,
};
use onjn_sync::registry::{self, extract_records, Checkpoint, StopReason};
use onjn_sync::storage::{RecordStore, RunStatus};
use onjn_sync::SyncError;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::TempDir;
use url::Url;
use wiremock::MockServer;

fn no_stop() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}

async fn mount_registry(server: &MockServer) {
    mount_page(server, 1, listing_page(&["SN-1", "SN-2"])).await;
    mount_page(server, 2, listing_page(&["SN-3", "SN-4"])).await;
    mount_page(server, 3, listing_page(&["SN-5"])).await;
    mount_empty_pages(server, 4..=13).await;
}

#[tokio::test]
async fn test_second_run_only_touches() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&mock_server.uri(), dir.path());
    mount_registry(&mock_server).await;

    let first = registry::sync(&config, "hash-1", true, no_stop())
        .await
        .unwrap();
    assert_eq!(first.stop_reason, StopReason::EndOfRegistry);
    assert_eq!(first.summary.scraped, 5);
    assert_eq!(first.summary.inserted, 5);

    let store = registry::open_store(&config).unwrap();
    let before = store.get_row_meta("SN-3").unwrap().unwrap();
    drop(store);

    let second = registry::sync(&config, "hash-1", true, no_stop())
        .await
        .unwrap();
    assert_eq!(second.summary.inserted, 0);
    assert_eq!(second.summary.updated, 0);
    assert_eq!(second.summary.unchanged, 5);
    assert_eq!(second.summary.errors, 0);

    let store = registry::open_store(&config).unwrap();
    let after = store.get_row_meta("SN-3").unwrap().unwrap();
    assert_eq!(after.created_at, before.created_at);
    assert_eq!(after.updated_at, before.updated_at);
    assert!(after.last_scraped_at >= before.last_scraped_at);
    assert_eq!(store.count_records().unwrap(), 5);
}

#[tokio::test]
async fn test_changed_record_is_updated() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&mock_server.uri(), dir.path());
    config.crawl.max_pages = 1;

    mount_page(&mock_server, 1, listing_page(&["SN-1", "SN-2"])).await;
    registry::sync(&config, "hash-1", true, no_stop())
        .await
        .unwrap();

    mock_server.reset().await;
    let rows = format!("{}{}", row("SN-1", "L-1"), row("SN-2", "L-99"));
    mount_page(&mock_server, 1, listing_page_with_rows(&rows)).await;

    let report = registry::sync(&config, "hash-1", true, no_stop())
        .await
        .unwrap();
    assert_eq!(report.summary.updated, 1);
    assert_eq!(report.summary.unchanged, 1);

    let store = registry::open_store(&config).unwrap();
    let record = store.get_by_serial("SN-2").unwrap().unwrap();
    assert_eq!(record.license_number, "L-99");
}

#[tokio::test]
async fn test_rerun_after_finished_run_starts_over() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&mock_server.uri(), dir.path());
    mount_registry(&mock_server).await;

    let first = registry::sync(&config, "hash-1", false, no_stop())
        .await
        .unwrap();
    assert_eq!(first.stop_reason, StopReason::EndOfRegistry);
    assert_eq!(first.summary.inserted, 5);

    mock_server.reset().await;
    let page_1 = format!("{}{}", row("SN-1", "L-1"), row("SN-2", "L-1"));
    let page_2 = format!("{}{}", row("SN-3", "L-99"), row("SN-4", "L-1"));
    mount_page(&mock_server, 1, listing_page_with_rows(&page_1)).await;
    mount_page(&mock_server, 2, listing_page_with_rows(&page_2)).await;
    mount_page(&mock_server, 3, listing_page(&["SN-5"])).await;
    mount_empty_pages(&mock_server, 4..=13).await;

    let second = registry::sync(&config, "hash-1", false, no_stop())
        .await
        .unwrap();
    assert_eq!(second.first_page, 1);
    assert_eq!(second.stop_reason, StopReason::EndOfRegistry);
    assert_eq!(second.summary.scraped, 5);
    assert_eq!(second.summary.updated, 1);
    assert_eq!(second.summary.unchanged, 4);

    let store = registry::open_store(&config).unwrap();
    let record = store.get_by_serial("SN-3").unwrap().unwrap();
    assert_eq!(record.license_number, "L-99");
}

#[tokio::test]
async fn test_interrupted_run_resumes_on_next_sync() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&mock_server.uri(), dir.path());

    // Stand-in for a crawl stopped after the first two pages
    let rows = format!(
        "{}{}{}{}",
        row("SN-1", "L-1"),
        row("SN-2", "L-1"),
        row("SN-3", "L-1"),
        row("SN-4", "L-1")
    );
    let base = Url::parse(&mock_server.uri()).unwrap();
    let extraction = extract_records(&listing_page_with_rows(&rows), &base, &base);
    assert_eq!(extraction.records.len(), 4);
    let checkpoint = Checkpoint::new(&config.output.checkpoint_path);
    checkpoint.save(&extraction.records).unwrap();

    mount_page(&mock_server, 3, listing_page(&["SN-5"])).await;
    mount_empty_pages(&mock_server, 4..=13).await;
    forbid_page(&mock_server, 1).await;
    forbid_page(&mock_server, 2).await;

    let report = registry::sync(&config, "hash-1", false, no_stop())
        .await
        .unwrap();
    assert_eq!(report.first_page, 3);
    assert_eq!(report.records_collected, 5);
    assert!(checkpoint.load().unwrap().unwrap().complete);
}

#[tokio::test]
async fn test_run_is_recorded_with_counters() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&mock_server.uri(), dir.path());
    mount_registry(&mock_server).await;

    let report = registry::sync(&config, "hash-abc", true, no_stop())
        .await
        .unwrap();

    let store = registry::open_store(&config).unwrap();
    let run = store.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "hash-abc");
    assert!(run.finished_at.is_some());
    assert_eq!(run.summary, report.summary);
}

#[tokio::test]
async fn test_interrupted_run_is_recorded() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&mock_server.uri(), dir.path());

    let stop = Arc::new(AtomicBool::new(true));
    let report = registry::sync(&config, "hash-1", true, stop).await.unwrap();
    assert_eq!(report.stop_reason, StopReason::Interrupted);

    let store = registry::open_store(&config).unwrap();
    let run = store.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Interrupted);
}

#[tokio::test]
async fn test_corrupt_checkpoint_fails_the_run() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&mock_server.uri(), dir.path());
    std::fs::write(&config.output.checkpoint_path, "{ not a list").unwrap();

    let result = registry::sync(&config, "hash-1", false, no_stop()).await;
    assert!(matches!(result, Err(SyncError::Checkpoint(_))));

    let store = registry::open_store(&config).unwrap();
    let run = store.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_import_checkpoint_into_empty_store() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&mock_server.uri(), dir.path());
    mount_registry(&mock_server).await;

    // Produce a checkpoint, then import it into a different database
    registry::sync(&config, "hash-1", true, no_stop())
        .await
        .unwrap();
    let mut import_config = config.clone();
    import_config.output.database_path = dir.path().join("imported.db").display().to_string();

    let summary = registry::import_checkpoint(&import_config, "hash-1").unwrap();
    assert_eq!(summary.scraped, 5);
    assert_eq!(summary.inserted, 5);
    assert_eq!(summary.pages_ok, 0);

    let again = registry::import_checkpoint(&import_config, "hash-1").unwrap();
    assert_eq!(again.inserted, 0);
    assert_eq!(again.unchanged, 5);
}

#[tokio::test]
async fn test_import_without_checkpoint_imports_nothing() {
    let dir = TempDir::new().unwrap();
    let config = test_config("http://127.0.0.1:9", dir.path());
    assert!(Checkpoint::new(&config.output.checkpoint_path)
        .load()
        .unwrap()
        .is_none());

    let summary = registry::import_checkpoint(&config, "hash-1").unwrap();
    assert_eq!(summary.scraped, 0);
    assert_eq!(summary.written(), 0);
}
