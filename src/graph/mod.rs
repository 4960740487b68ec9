//! Graph API access
//!
//! This module contains everything between the crawl logic and the network:
//! - The [`GraphClient`] transport seam and its reqwest implementation
//! - Classification of provider errors into recovery actions
//! - The [`RateLimitedFetcher`] retry loop every request goes through
//! - The operator message sink

mod classify;
mod client;
mod fetcher;
mod log;

#[cfg(test)]
pub(crate) mod testing;

pub use classify::{classify, Classification, ErrorKind, NO_RESPONSE_MESSAGE};
pub use client::{GraphClient, HttpGraphClient};
pub use fetcher::{FetchOutcome, RateLimitedFetcher, RetryPolicy};
pub use log::OperatorLog;

use thiserror::Error;

/// A request that produced no usable document
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Response (HTTP {status}) is not a JSON document: {message}")]
    Decode { status: u16, message: String },
}
