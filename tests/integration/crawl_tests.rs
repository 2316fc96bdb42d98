//! Crawl driver tests: termination, retries and resume

use crate::common::{
    forbid_page, listing_page, mount_empty_pages, mount_page, test_config, LISTING_PATH,
};
use onjn_sync::registry::{Checkpoint, CrawlDriver, PageFetcher, StopReason};
use onjn_sync::storage::{RecordStore, SqliteStore};
use onjn_sync::FetchError;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_nine_empty_pages_do_not_end_the_crawl() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&mock_server.uri(), dir.path());

    mount_empty_pages(&mock_server, 1..=9).await;
    mount_page(&mock_server, 10, listing_page(&["SN-A", "SN-B"])).await;
    mount_empty_pages(&mock_server, 11..=20).await;
    forbid_page(&mock_server, 21).await;

    let mut store = SqliteStore::open_in_memory().unwrap();
    let report = {
        let mut driver = CrawlDriver::new(&config, &mut store, true).unwrap();
        driver.run().await.unwrap()
    };

    assert_eq!(report.stop_reason, StopReason::EndOfRegistry);
    assert_eq!(report.last_page, Some(20));
    assert_eq!(report.records_collected, 2);
    assert_eq!(report.summary.pages_ok, 20);
    assert_eq!(report.summary.inserted, 2);
    assert_eq!(store.count_records().unwrap(), 2);
}

#[tokio::test]
async fn test_ten_empty_pages_end_the_crawl() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&mock_server.uri(), dir.path());

    mount_empty_pages(&mock_server, 1..=10).await;
    forbid_page(&mock_server, 11).await;

    let mut store = SqliteStore::open_in_memory().unwrap();
    let mut driver = CrawlDriver::new(&config, &mut store, true).unwrap();
    let report = driver.run().await.unwrap();

    assert_eq!(report.stop_reason, StopReason::EndOfRegistry);
    assert_eq!(report.last_page, Some(10));
    assert_eq!(report.records_collected, 0);
    assert_eq!(report.summary.pages_ok, 10);
}

#[tokio::test]
async fn test_max_pages_stops_the_crawl() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&mock_server.uri(), dir.path());
    config.crawl.max_pages = 2;

    mount_page(&mock_server, 1, listing_page(&["SN-1", "SN-2"])).await;
    mount_page(&mock_server, 2, listing_page(&["SN-3", "SN-4"])).await;
    forbid_page(&mock_server, 3).await;

    let mut store = SqliteStore::open_in_memory().unwrap();
    let mut driver = CrawlDriver::new(&config, &mut store, true).unwrap();
    let report = driver.run().await.unwrap();

    assert_eq!(report.stop_reason, StopReason::MaxPages);
    assert_eq!(report.last_page, Some(2));
    assert_eq!(report.summary.scraped, 4);
}

#[tokio::test]
async fn test_exhausted_retries_count_a_page_error_and_continue() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&mock_server.uri(), dir.path());
    config.crawl.max_pages = 3;

    mount_page(&mock_server, 1, listing_page(&["SN-1", "SN-2"])).await;
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, 3, listing_page(&["SN-5", "SN-6"])).await;

    let mut store = SqliteStore::open_in_memory().unwrap();
    let mut driver = CrawlDriver::new(&config, &mut store, true).unwrap();
    let report = driver.run().await.unwrap();

    assert_eq!(report.stop_reason, StopReason::MaxPages);
    assert_eq!(report.summary.pages_ok, 2);
    assert_eq!(report.summary.pages_error, 1);
    assert_eq!(report.summary.inserted, 4);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&mock_server.uri(), dir.path());
    config.crawl.max_pages = 2;

    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, 2, listing_page(&["SN-1"])).await;

    let mut store = SqliteStore::open_in_memory().unwrap();
    let mut driver = CrawlDriver::new(&config, &mut store, true).unwrap();
    let report = driver.run().await.unwrap();

    assert_eq!(report.summary.pages_error, 1);
    assert_eq!(report.summary.pages_ok, 1);
}

#[tokio::test]
async fn test_page_errors_do_not_advance_the_empty_counter() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&mock_server.uri(), dir.path());
    config.crawl.empty_page_threshold = 3;
    config.crawl.max_pages = 6;

    mount_empty_pages(&mock_server, 1..=2).await;
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;
    mount_empty_pages(&mock_server, 4..=4).await;
    forbid_page(&mock_server, 5).await;

    let mut store = SqliteStore::open_in_memory().unwrap();
    let mut driver = CrawlDriver::new(&config, &mut store, true).unwrap();
    let report = driver.run().await.unwrap();

    // Pages 1, 2 and 4 are the three consecutive empties
    assert_eq!(report.stop_reason, StopReason::EndOfRegistry);
    assert_eq!(report.last_page, Some(4));
    assert_eq!(report.summary.pages_error, 1);
}

#[tokio::test]
async fn test_resume_from_checkpoint_without_duplicates() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&mock_server.uri(), dir.path());
    config.crawl.max_pages = 3;

    // Collect pages 1-2 and part of 3, then leave the checkpoint unfinished
    // the way a killed process leaves its last periodic save
    mount_page(&mock_server, 1, listing_page(&["SN-0", "SN-1"])).await;
    mount_page(&mock_server, 2, listing_page(&["SN-2", "SN-3"])).await;
    mount_page(&mock_server, 3, listing_page(&["SN-4"])).await;
    {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut driver = CrawlDriver::new(&config, &mut store, true).unwrap();
        driver.run().await.unwrap();
    }
    let checkpoint = Checkpoint::new(&config.output.checkpoint_path);
    let collected = checkpoint.load().unwrap().unwrap();
    assert!(collected.complete);
    assert_eq!(collected.records.len(), 5);
    checkpoint.save(&collected.records).unwrap();

    // The registry has grown; the resumed run must start at page 3
    mock_server.reset().await;
    forbid_page(&mock_server, 1).await;
    forbid_page(&mock_server, 2).await;
    mount_page(&mock_server, 3, listing_page(&["SN-4", "SN-5"])).await;

    let mut store = SqliteStore::open_in_memory().unwrap();
    let report = {
        let mut driver = CrawlDriver::new(&config, &mut store, false).unwrap();
        assert_eq!(driver.start_page(), 3);
        driver.run().await.unwrap()
    };

    assert_eq!(report.first_page, 3);
    assert_eq!(report.records_collected, 6);
    assert_eq!(report.summary.scraped, 1);
    assert!(store.get_by_serial("SN-5").unwrap().is_some());

    let saved = checkpoint.load().unwrap().unwrap();
    assert!(saved.complete);
    let serials: Vec<&str> = saved
        .records
        .iter()
        .map(|r| r.serial_number.as_str())
        .collect();
    assert_eq!(serials, vec!["SN-0", "SN-1", "SN-2", "SN-3", "SN-4", "SN-5"]);
}

#[tokio::test]
async fn test_duplicate_rows_within_a_run_are_written_once() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&mock_server.uri(), dir.path());
    config.crawl.max_pages = 2;

    // The listing shifted between requests and repeats SN-2 on page 2
    mount_page(&mock_server, 1, listing_page(&["SN-1", "SN-2"])).await;
    mount_page(&mock_server, 2, listing_page(&["SN-2", "SN-3"])).await;

    let mut store = SqliteStore::open_in_memory().unwrap();
    let report = {
        let mut driver = CrawlDriver::new(&config, &mut store, true).unwrap();
        driver.run().await.unwrap()
    };

    assert_eq!(report.records_collected, 3);
    assert_eq!(report.summary.inserted, 3);
    assert_eq!(report.summary.unchanged, 0);
    assert_eq!(store.count_records().unwrap(), 3);
}

#[tokio::test]
async fn test_malformed_rows_are_counted_as_errors() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&mock_server.uri(), dir.path());
    config.crawl.max_pages = 1;

    let rows = format!(
        "{}<tr><td>SN-BROKEN</td><td>Slot machine</td></tr>",
        crate::common::row("SN-1", "L-1")
    );
    mount_page(
        &mock_server,
        1,
        crate::common::listing_page_with_rows(&rows),
    )
    .await;

    let mut store = SqliteStore::open_in_memory().unwrap();
    let mut driver = CrawlDriver::new(&config, &mut store, true).unwrap();
    let report = driver.run().await.unwrap();

    assert_eq!(report.summary.scraped, 1);
    assert_eq!(report.summary.errors, 1);
    assert_eq!(report.summary.inserted, 1);
}

#[tokio::test]
async fn test_configured_filters_are_sent() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&mock_server.uri(), dir.path());
    config.crawl.max_pages = 1;
    config
        .registry
        .filters
        .insert("operator".to_string(), "ACME SRL".to_string());

    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .and(query_param("page", "1"))
        .and(query_param("operator", "ACME SRL"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&["SN-1"])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut store = SqliteStore::open_in_memory().unwrap();
    let mut driver = CrawlDriver::new(&config, &mut store, true).unwrap();
    let report = driver.run().await.unwrap();

    assert_eq!(report.summary.inserted, 1);
    let record = store.get_by_serial("SN-1").unwrap().unwrap();
    assert!(record.onjn_list_url.contains("operator=ACME+SRL"));
    assert_eq!(
        record.onjn_details_url,
        Some(format!("{}/e/uuid-SN-1", mock_server.uri()))
    );
}

#[tokio::test]
async fn test_checkpoint_is_written_every_n_pages() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&mock_server.uri(), dir.path());
    config.crawl.max_pages = 3;
    config.crawl.checkpoint_every = 2;

    mount_page(&mock_server, 1, listing_page(&["SN-1", "SN-2"])).await;
    mount_page(&mock_server, 2, listing_page(&["SN-3", "SN-4"])).await;
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .and(query_param("page", "3"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing_page(&["SN-5"]))
                .set_delay(Duration::from_millis(1500)),
        )
        .mount(&mock_server)
        .await;

    let checkpoint = Checkpoint::new(&config.output.checkpoint_path);
    let mut store = SqliteStore::open_in_memory().unwrap();
    let mut driver = CrawlDriver::new(&config, &mut store, true).unwrap();

    // While page 3 is in flight the file must already hold pages 1-2
    let observe = async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        checkpoint.load().unwrap()
    };
    let (report, during) = tokio::join!(driver.run(), observe);

    let during = during.expect("checkpoint written after page 2");
    assert!(!during.complete);
    let serials: Vec<&str> = during
        .records
        .iter()
        .map(|r| r.serial_number.as_str())
        .collect();
    assert_eq!(serials, vec!["SN-1", "SN-2", "SN-3", "SN-4"]);

    assert_eq!(report.unwrap().records_collected, 5);
    let after = checkpoint.load().unwrap().unwrap();
    assert_eq!(after.records.len(), 5);
    assert!(after.complete);
}

#[tokio::test]
async fn test_retry_backoff_grows_with_attempt() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&mock_server.uri(), dir.path());
    config.fetcher.retry_base_delay_ms = 100;
    config.fetcher.max_retries = 3;

    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let fetcher = PageFetcher::new(&config.registry, &config.fetcher).unwrap();

    let started = Instant::now();
    let result = fetcher.fetch_page(1, &BTreeMap::new()).await;
    let elapsed = started.elapsed();

    // Waits of 100ms after attempt 1 and 200ms after attempt 2
    assert!(
        elapsed >= Duration::from_millis(300),
        "retries finished after {:?}",
        elapsed
    );
    match result {
        Err(FetchError::RetriesExhausted { attempts, last, .. }) => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, FetchError::Status { status: 503, .. }));
        }
        other => panic!("expected exhausted retries, got {:?}", other),
    }
}
