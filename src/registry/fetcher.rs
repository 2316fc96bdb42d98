//! HTTP page fetcher
//!
//! This module handles all HTTP requests for the crawl, including:
//! - Building an HTTP client with a browser-like header set
//! - Building listing URLs for a page number and the configured filters
//! - Retrying transient failures with a linear backoff
//! - Error classification

use crate::config::{FetcherConfig, RegistryConfig};
use crate::registry::extractor;
use crate::{FetchError, FetchResult, SyncError};
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONNECTION,
    UPGRADE_INSECURE_REQUESTS,
};
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Builds an HTTP client that presents itself like a desktop browser
///
/// The registry serves its listing to browsers only; `Accept-Encoding` is
/// added by reqwest because gzip and brotli are enabled.
pub fn build_http_client(config: &FetcherConfig) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        ),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("ro-RO,ro;q=0.9,en-US;q=0.8,en;q=0.7"),
    );
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));

    Client::builder()
        .user_agent(config.user_agent.as_str())
        .default_headers(headers)
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches registry listing pages
///
/// Holds no state between calls apart from the client's connection pool.
pub struct PageFetcher {
    client: Client,
    base_url: Url,
    listing_url: Url,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl PageFetcher {
    pub fn new(registry: &RegistryConfig, config: &FetcherConfig) -> Result<Self, SyncError> {
        let base = Url::parse(&registry.base_url)?;
        let listing_url = base.join(&registry.listing_path)?;

        Ok(Self {
            client: build_http_client(config)?,
            base_url: base,
            listing_url,
            max_retries: config.max_retries.max(1),
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// URL of a listing page: `{listing}?page={n}&{filters}`
    pub fn list_url(&self, page: u32, filters: &BTreeMap<String, String>) -> Url {
        let mut url = self.listing_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("page", &page.to_string());
            for (key, value) in filters {
                query.append_pair(key, value);
            }
        }
        url
    }

    /// Detail page URL for a record's UUID
    pub fn details_url(&self, uuid: &str) -> String {
        extractor::details_url(&self.base_url, uuid)
    }

    /// Fetches one listing page, retrying transient failures
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Timeout | Retry, wait `base × attempt` |
    /// | Connection failure | Retry, wait `base × attempt` |
    /// | HTTP 5xx / 429 | Retry, wait `base × attempt` |
    /// | Other HTTP status | Fail immediately |
    ///
    /// After `max_retries` attempts the last error is wrapped in
    /// `FetchError::RetriesExhausted`.
    pub async fn fetch_page(
        &self,
        page: u32,
        filters: &BTreeMap<String, String>,
    ) -> FetchResult<String> {
        let url = self.list_url(page, filters);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let err = match self.fetch_once(&url).await {
                Ok(body) => return Ok(body),
                Err(e) => e,
            };

            if !err.is_retryable() {
                return Err(err);
            }

            if attempt >= self.max_retries {
                return Err(FetchError::RetriesExhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = self.retry_base_delay * attempt;
            tracing::warn!(
                "Page {} attempt {}/{} failed ({}), retrying in {:?}",
                page,
                attempt,
                self.max_retries,
                err,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn fetch_once(&self, url: &Url) -> FetchResult<String> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| classify_error(url, e))
    }
}

fn classify_error(url: &Url, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else if e.is_connect() {
        FetchError::Connect {
            url: url.to_string(),
            message: e.to_string(),
        }
    } else {
        FetchError::Http {
            url: url.to_string(),
            source: e,
        }
    }
}
