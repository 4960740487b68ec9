//! Graph transport
//!
//! The engine only needs one capability from the network: GET a URL and get
//! back a JSON document or a transport failure. [`GraphClient`] is that seam;
//! [`HttpGraphClient`] is the reqwest implementation used in production.

use crate::config::GraphConfig;
use crate::graph::TransportError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Performs a GET and returns the parsed document
#[async_trait]
pub trait GraphClient: Send + Sync {
    /// Fetches `url` and parses the body as JSON
    ///
    /// Provider errors come back as documents carrying an `error` key; only
    /// failures that produce no document at all are `Err`.
    async fn get(&self, url: &str) -> Result<Value, TransportError>;
}

/// reqwest-backed Graph client
#[derive(Debug, Clone)]
pub struct HttpGraphClient {
    client: Client,
}

impl HttpGraphClient {
    /// Builds a client from the `[graph]` configuration section
    ///
    /// # Returns
    ///
    /// * `Ok(HttpGraphClient)` - Successfully built HTTP client
    /// * `Err(reqwest::Error)` - Failed to build client
    pub fn new(config: &GraphConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl GraphClient for HttpGraphClient {
    async fn get(&self, url: &str) -> Result<Value, TransportError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        // The provider reports errors as JSON bodies on 4xx/5xx responses,
        // so the body is parsed regardless of status.
        serde_json::from_str(&body).map_err(|e| TransportError::Decode {
            status: status.as_u16(),
            message: e.to_string(),
        })
    }
}
