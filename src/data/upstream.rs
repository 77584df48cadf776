//! Upstream statistics API client
//!
//! Fetches the current statistics object over HTTP and turns it into a
//! [`Snapshot`]. Any non-success status, transport failure or undecodable
//! body is reported as an [`UpstreamError`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use super::Snapshot;

/// Default request timeout for upstream calls
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur when fetching upstream statistics
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// Upstream answered with a non-success status
    #[error("upstream returned status {0}")]
    Status(u16),

    /// Upstream did not answer in time
    #[error("upstream request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection or protocol failure
    #[error("upstream request failed: {0}")]
    Transport(String),

    /// Response body was not a JSON object
    #[error("failed to decode upstream response: {0}")]
    Decode(String),
}

/// Capability to fetch one fresh snapshot from upstream
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self) -> Result<Snapshot, UpstreamError>;
}

/// Client for fetching statistics from the upstream HTTP endpoint
#[derive(Debug, Clone)]
pub struct StatsClient {
    client: Client,
    url: String,
    timeout: Duration,
}

impl StatsClient {
    /// Creates a client for `url` with the default request timeout
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_timeout(url, DEFAULT_FETCH_TIMEOUT)
    }

    /// Creates a client for `url` whose requests give up after `timeout`
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            timeout,
        }
    }

    fn map_transport(&self, err: reqwest::Error) -> UpstreamError {
        if err.is_timeout() {
            UpstreamError::Timeout(self.timeout)
        } else if err.is_decode() {
            UpstreamError::Decode(err.to_string())
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl Fetcher for StatsClient {
    async fn fetch(&self) -> Result<Snapshot, UpstreamError> {
        debug!(url = %self.url, "fetching upstream statistics");

        let response = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status(status.as_u16()));
        }

        let body: serde_json::Value = response.json().await.map_err(|e| self.map_transport(e))?;

        Snapshot::from_value(body)
            .ok_or_else(|| UpstreamError::Decode("expected a JSON object".to_string()))
    }
}
