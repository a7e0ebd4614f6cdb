//! Anacostia Connector Client
//!
//! A type-safe HTTP client for the connector protocol between federated
//! pipelines: the `/connect` handshake, `/signal` delivery with bounded
//! retry, and the `/rpc/metadata/*` and `/rpc/resource/*` proxies.
//!
//! One `ConnectorClient` is created per remote peer URL and shared by every
//! node on the local pipeline that has an edge to that peer.

pub mod error;
mod metadata;
mod resource;
mod signals;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use signals::RetryPolicy;

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for one remote pipeline
#[derive(Debug, Clone)]
pub struct ConnectorClient {
    /// Base URL of the peer pipeline (e.g., "http://localhost:8001")
    base_url: String,
    /// HTTP client instance
    client: Client,
    /// Retry policy applied to signal delivery
    retry: RetryPolicy,
}

impl ConnectorClient {
    /// Create a new connector client for a peer base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
            retry: RetryPolicy::default(),
        }
    }

    /// Create a connector client with a custom retry policy
    ///
    /// Used to tighten the budget in tests and to tune backoff for slow
    /// links.
    pub fn with_retry(base_url: impl Into<String>, retry: RetryPolicy) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
            retry,
        }
    }

    /// Get the base URL of the peer
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle a peer response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle a peer response that returns no content
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}
