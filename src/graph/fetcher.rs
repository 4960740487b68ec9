//! Rate-limited fetching
//!
//! Every Graph request in the engine goes through [`RateLimitedFetcher::fetch`],
//! which owns the classify-and-retry loop:
//!
//! | Classification | Action |
//! |----------------|--------|
//! | Ok | Return the document |
//! | Transient | Sleep `transient-delay-ms`, re-issue the same URL |
//! | Throttled | Sleep `throttle-delay-ms`, re-issue the same URL |
//! | OversizedPage | Halve `limit`, rewrite it in the URL, retry at once |
//! | Fatal | Abandon |
//!
//! Transient and Throttled responses share one counter; the fetch is
//! abandoned on the `max-attempts`-th of them. Abandoning is a normal
//! outcome, not an error.

use crate::config::Config;
use crate::graph::{classify, ErrorKind, GraphClient, OperatorLog};
use crate::url::set_query_param;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Retry bounds and delays
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub transient_delay: Duration,
    pub throttle_delay: Duration,
    /// At or below this page size an oversized page abandons the fetch
    pub min_page_limit: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.retry.max_attempts,
            transient_delay: config.retry.transient_delay(),
            throttle_delay: config.retry.throttle_delay(),
            min_page_limit: config.limits.min_page_limit,
        }
    }
}

/// Result of a fetch
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// A usable document
    Fetched {
        document: Value,
        /// Page size in effect when the document was fetched; smaller than
        /// the requested one if the page had to be shrunk
        limit: Option<u32>,
        /// Total requests issued
        attempts: u32,
    },

    /// The fetcher gave up
    Abandoned {
        /// What caused the abandon
        kind: ErrorKind,
        message: String,
        attempts: u32,
    },
}

impl FetchOutcome {
    pub fn is_abandoned(&self) -> bool {
        matches!(self, Self::Abandoned { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Fetched { attempts, .. } | Self::Abandoned { attempts, .. } => *attempts,
        }
    }
}

/// Single entry point for Graph requests
#[derive(Clone)]
pub struct RateLimitedFetcher {
    client: Arc<dyn GraphClient>,
    policy: RetryPolicy,
    log: OperatorLog,
}

impl RateLimitedFetcher {
    pub fn new(client: Arc<dyn GraphClient>, policy: RetryPolicy, log: OperatorLog) -> Self {
        Self {
            client,
            policy,
            log,
        }
    }

    pub fn log(&self) -> &OperatorLog {
        &self.log
    }

    /// Fetches `url`, retrying per the policy
    ///
    /// `limit` is the page size already present in `url`; `None` for
    /// requests that are not paged, which makes an oversized page fatal to
    /// the fetch.
    pub async fn fetch(&self, url: &str, limit: Option<u32>) -> FetchOutcome {
        let mut url = url.to_string();
        let mut limit = limit;
        let mut attempts: u32 = 0;
        let mut failures: u32 = 0;

        loop {
            attempts += 1;
            let response = match self.client.get(&url).await {
                Ok(document) => Some(document),
                Err(e) => {
                    tracing::debug!(url = %url, error = %e, "Graph transport failure");
                    None
                }
            };

            let classification = classify(response.as_ref());
            let message = match classification.code {
                Some(code) => format!("error {}: {}", code, classification.message),
                None => classification.message.clone(),
            };

            match classification.kind {
                ErrorKind::Ok => {
                    if let Some(document) = response {
                        return FetchOutcome::Fetched {
                            document,
                            limit,
                            attempts,
                        };
                    }
                }

                ErrorKind::Transient | ErrorKind::Throttled => {
                    self.log.error(&message);
                    failures += 1;
                    if failures >= self.policy.max_attempts {
                        self.log.error(format!(
                            "giving up after {} attempts: {}",
                            attempts, url_without_token(&url)
                        ));
                        return FetchOutcome::Abandoned {
                            kind: classification.kind,
                            message,
                            attempts,
                        };
                    }

                    let delay = if classification.kind == ErrorKind::Throttled {
                        self.policy.throttle_delay
                    } else {
                        self.policy.transient_delay
                    };
                    tokio::time::sleep(delay).await;
                }

                ErrorKind::OversizedPage => {
                    let current = match limit {
                        Some(current) if current > self.policy.min_page_limit => current,
                        _ => {
                            self.log.error(&message);
                            return FetchOutcome::Abandoned {
                                kind: ErrorKind::OversizedPage,
                                message,
                                attempts,
                            };
                        }
                    };

                    let reduced = current / 2;
                    match set_query_param(&url, "limit", &reduced.to_string()) {
                        Ok(rewritten) => {
                            tracing::debug!(from = current, to = reduced, "Shrinking page limit");
                            url = rewritten;
                            limit = Some(reduced);
                        }
                        Err(e) => {
                            self.log.error(format!("cannot rewrite page limit: {}", e));
                            return FetchOutcome::Abandoned {
                                kind: ErrorKind::OversizedPage,
                                message,
                                attempts,
                            };
                        }
                    }
                }

                ErrorKind::Fatal => {
                    self.log.error(&message);
                    return FetchOutcome::Abandoned {
                        kind: ErrorKind::Fatal,
                        message,
                        attempts,
                    };
                }
            }
        }
    }
}

/// Strips the access token before a URL is shown to an operator
fn url_without_token(url: &str) -> String {
    set_query_param(url, "access_token", "***").unwrap_or_else(|_| url.to_string())
}
