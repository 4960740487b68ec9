//! fb-pages-crawler: an incremental Graph API crawler for pages and groups
//!
//! This crate walks the paginated feeds of registered crawl targets, follows
//! their comment and like sub-resources, classifies and recovers from provider
//! errors, and upserts everything it sees into SQLite so that repeated crawls
//! never produce duplicate rows.

pub mod config;
pub mod crawler;
pub mod graph;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for crawler operations
#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Graph transport error: {0}")]
    Transport(#[from] graph::TransportError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid scheduler transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::SchedulerState,
        to: state::SchedulerState,
    },

    #[error("Invalid crawl request: {0}")]
    InvalidRequest(String),

    #[error("Graph lookup abandoned ({kind}): {message}")]
    LookupAbandoned {
        kind: graph::ErrorKind,
        message: String,
    },

    #[error("A crawl pass is already running")]
    AlreadyRunning,

    #[error("Crawl worker failed: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for crawler operations
pub type Result<T> = std::result::Result<T, CrawlerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{BatchIdentityRefresher, CrawlEngine, CrawlHandle, CrawlRequest, CrawlScheduler};
pub use graph::{ErrorKind, GraphClient, HttpGraphClient, RateLimitedFetcher};
pub use state::SchedulerState;
