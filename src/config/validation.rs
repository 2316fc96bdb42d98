use crate::config::types::{Config, CrawlConfig, FetcherConfig, OutputConfig, RegistryConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_registry_config(&config.registry)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_crawl_config(&config.crawl)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the registry location
fn validate_registry_config(config: &RegistryConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' must use http or https",
            config.base_url
        )));
    }

    if config.listing_path.trim_matches('/').is_empty() {
        return Err(ConfigError::Validation(
            "listing_path cannot be empty".to_string(),
        ));
    }

    if config.filters.contains_key("page") {
        return Err(ConfigError::Validation(
            "filters cannot override the 'page' parameter".to_string(),
        ));
    }

    Ok(())
}

/// Validates fetcher timing
fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if !(30..=45).contains(&config.timeout_secs) {
        return Err(ConfigError::Validation(format!(
            "timeout_secs must be between 30 and 45, got {}",
            config.timeout_secs
        )));
    }

    if config.max_retries < 1 || config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be between 1 and 10, got {}",
            config.max_retries
        )));
    }

    // The registry throttles aggressive clients
    if !(200..=1000).contains(&config.request_delay_ms) {
        return Err(ConfigError::Validation(format!(
            "request_delay_ms must be between 200 and 1000, got {}ms",
            config.request_delay_ms
        )));
    }

    Ok(())
}

/// Validates paging parameters
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.records_per_page < 1 {
        return Err(ConfigError::Validation(format!(
            "records_per_page must be >= 1, got {}",
            config.records_per_page
        )));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if config.empty_page_threshold < 1 {
        return Err(ConfigError::Validation(format!(
            "empty_page_threshold must be >= 1, got {}",
            config.empty_page_threshold
        )));
    }

    if config.checkpoint_every < 1 {
        return Err(ConfigError::Validation(format!(
            "checkpoint_every must be >= 1, got {}",
            config.checkpoint_every
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.checkpoint_path.is_empty() {
        return Err(ConfigError::Validation(
            "checkpoint_path cannot be empty".to_string(),
        ));
    }

    if config.database_path == config.checkpoint_path {
        return Err(ConfigError::Validation(
            "checkpoint_path must differ from database_path".to_string(),
        ));
    }

    Ok(())
}
