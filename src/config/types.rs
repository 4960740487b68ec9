use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for the crawler
///
/// One `Config` is the whole session: it is built once, shared behind an
/// `Arc`, and handed to every engine component at construction.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub graph: GraphConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    pub storage: StorageConfig,
}

/// Graph API endpoint and credentials
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    /// Base URL every request path is joined onto
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Access token appended to every request
    #[serde(rename = "access-token")]
    pub access_token: String,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User agent sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

/// Page-size limits requested from the provider
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(rename = "feed-page-limit", default = "default_feed_page_limit")]
    pub feed_page_limit: u32,

    #[serde(rename = "comment-page-limit", default = "default_comment_page_limit")]
    pub comment_page_limit: u32,

    #[serde(rename = "like-page-limit", default = "default_like_page_limit")]
    pub like_page_limit: u32,

    /// Oversized-page floor: at or below this the sweep is abandoned
    #[serde(rename = "min-page-limit", default = "default_min_page_limit")]
    pub min_page_limit: u32,
}

/// Retry policy for transient and throttled responses
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(rename = "transient-delay-ms", default = "default_transient_delay_ms")]
    pub transient_delay_ms: u64,

    #[serde(rename = "throttle-delay-ms", default = "default_throttle_delay_ms")]
    pub throttle_delay_ms: u64,
}

/// Crawl pass behavior
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// `since` bound for fresh targets; `None` crawls all history
    #[serde(rename = "new-target-since", default)]
    pub new_target_since: Option<NaiveDate>,

    /// Already-crawled targets are re-swept from `now - recent_window_days`
    #[serde(rename = "recent-window-days", default = "default_recent_window_days")]
    pub recent_window_days: u32,

    /// 0 = one-shot; otherwise passes repeat on this period
    #[serde(rename = "update-period-days", default)]
    pub update_period_days: u32,

    #[serde(rename = "verbose-errors", default)]
    pub verbose_errors: bool,

    #[serde(rename = "collect-comment-likes", default)]
    pub collect_comment_likes: bool,

    #[serde(rename = "snapshot-targets", default = "default_true")]
    pub snapshot_targets: bool,
}

/// Batch identity refresh behavior
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(rename = "interval-minutes", default = "default_interval_minutes")]
    pub interval_minutes: u64,

    #[serde(rename = "batch-delay-ms", default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Pause before reopening the connection after a database failure
    #[serde(rename = "reconnect-delay-ms", default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

impl RetryConfig {
    pub fn transient_delay(&self) -> Duration {
        Duration::from_millis(self.transient_delay_ms)
    }

    pub fn throttle_delay(&self) -> Duration {
        Duration::from_millis(self.throttle_delay_ms)
    }
}

impl CrawlConfig {
    /// Inter-pass period, `None` in one-shot mode
    pub fn update_period(&self) -> Option<chrono::Duration> {
        (self.update_period_days > 0).then(|| chrono::Duration::days(self.update_period_days.into()))
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            feed_page_limit: default_feed_page_limit(),
            comment_page_limit: default_comment_page_limit(),
            like_page_limit: default_like_page_limit(),
            min_page_limit: default_min_page_limit(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            transient_delay_ms: default_transient_delay_ms(),
            throttle_delay_ms: default_throttle_delay_ms(),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            new_target_since: None,
            recent_window_days: default_recent_window_days(),
            update_period_days: 0,
            verbose_errors: false,
            collect_comment_likes: false,
            snapshot_targets: true,
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            interval_minutes: default_interval_minutes(),
            batch_delay_ms: default_batch_delay_ms(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("fb-pages-crawler/{}", env!("CARGO_PKG_VERSION"))
}

fn default_feed_page_limit() -> u32 {
    500
}

fn default_comment_page_limit() -> u32 {
    2000
}

fn default_like_page_limit() -> u32 {
    1000
}

fn default_min_page_limit() -> u32 {
    25
}

fn default_max_attempts() -> u32 {
    30
}

fn default_transient_delay_ms() -> u64 {
    10_000
}

fn default_throttle_delay_ms() -> u64 {
    30_000
}

fn default_recent_window_days() -> u32 {
    7
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    1500
}

fn default_interval_minutes() -> u64 {
    60
}

fn default_batch_delay_ms() -> u64 {
    5_000
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}
