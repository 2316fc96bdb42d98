//! Integration tests for the registry sync
//!
//! These tests use wiremock to serve registry listing pages and run the
//! crawl and sync cycle end-to-end against a temporary SQLite store.

mod crawl_tests;
mod sync_tests;
