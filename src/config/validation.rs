use crate::config::types::{
    Config, GraphConfig, LimitsConfig, RefreshConfig, RetryConfig, StorageConfig,
};
use crate::ConfigError;
use url::Url;

/// Largest identity batch a single lookup URL is allowed to carry
const MAX_REFRESH_BATCH: usize = 5000;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_graph_config(&config.graph)?;
    validate_limits_config(&config.limits)?;
    validate_retry_config(&config.retry)?;
    validate_refresh_config(&config.refresh)?;
    validate_storage_config(&config.storage)?;
    Ok(())
}

/// Validates the Graph endpoint and credentials
fn validate_graph_config(config: &GraphConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.access_token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "access-token cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates page-size limits
fn validate_limits_config(config: &LimitsConfig) -> Result<(), ConfigError> {
    let limits = [
        ("feed-page-limit", config.feed_page_limit),
        ("comment-page-limit", config.comment_page_limit),
        ("like-page-limit", config.like_page_limit),
    ];

    for (name, value) in limits {
        if value == 0 {
            return Err(ConfigError::Validation(format!("{} must be >= 1", name)));
        }
        if value < config.min_page_limit {
            return Err(ConfigError::Validation(format!(
                "{} ({}) must not be below min-page-limit ({})",
                name, value, config.min_page_limit
            )));
        }
    }

    Ok(())
}

/// Validates the retry policy
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "max-attempts must be >= 1".to_string(),
        ));
    }
    Ok(())
}

/// Validates identity refresh settings
fn validate_refresh_config(config: &RefreshConfig) -> Result<(), ConfigError> {
    if config.batch_size == 0 || config.batch_size > MAX_REFRESH_BATCH {
        return Err(ConfigError::Validation(format!(
            "batch-size must be between 1 and {}, got {}",
            MAX_REFRESH_BATCH, config.batch_size
        )));
    }

    if config.interval_minutes == 0 {
        return Err(ConfigError::Validation(
            "interval-minutes must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }
    Ok(())
}
