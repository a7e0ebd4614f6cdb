//! Handshake and signal delivery

use std::time::Duration;

use anacostia_core::domain::signal::Signal;
use anacostia_core::dto::connect::{ConnectRequest, ConnectResponse};
use tracing::{debug, warn};

use crate::error::{ClientError, Result};
use crate::ConnectorClient;

/// Retry policy for signal delivery and handshakes
///
/// Exponential backoff: `initial_delay` doubles per attempt up to
/// `max_delay`, for at most `max_attempts` attempts. Exhausting the budget
/// surfaces as `ClientError::RetriesExhausted`, which the lifecycle engine
/// maps to node ERROR.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ConnectorClient {
    /// Perform the connector handshake with the peer
    ///
    /// Retried with backoff: the peer pipeline may not be up yet when this
    /// pipeline launches.
    pub async fn connect(&self, req: &ConnectRequest) -> Result<ConnectResponse> {
        let url = format!("{}/connect", self.base_url());
        let retry = self.retry_policy().clone();

        let response = self
            .with_backoff(&retry, "handshake", || {
                self.client.post(&url).json(req).send()
            })
            .await?;

        let accepted: ConnectResponse = self.handle_response(response).await?;
        if !accepted.accepted {
            return Err(ClientError::HandshakeRefused(self.base_url().to_string()));
        }

        debug!(
            peer = %self.base_url(),
            receiver = %accepted.receiver_id,
            "handshake accepted"
        );
        Ok(accepted)
    }

    /// Deliver a signal to the peer
    ///
    /// Delivery is idempotent on the receiving side by `(from, run_id)`, so
    /// a retried request that was in fact received is harmless.
    pub async fn send_signal(&self, signal: &Signal) -> Result<()> {
        let url = format!("{}/signal", self.base_url());
        let retry = self.retry_policy().clone();

        let response = self
            .with_backoff(&retry, "signal delivery", || {
                self.client.post(&url).json(signal).send()
            })
            .await?;

        self.handle_empty_response(response).await
    }

    /// Run a request closure under the retry policy
    async fn with_backoff<F, Fut>(
        &self,
        retry: &RetryPolicy,
        what: &str,
        mut send: F,
    ) -> Result<reqwest::Response>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = reqwest::Result<reqwest::Response>>,
    {
        let mut attempt = 0;
        let mut delay = retry.initial_delay;

        loop {
            attempt += 1;

            match send().await {
                Ok(response) if !response.status().is_server_error() => return Ok(response),
                Ok(response) => {
                    // 5xx: the peer is up but unhealthy; retry like a
                    // transport failure.
                    if attempt >= retry.max_attempts {
                        return Err(ClientError::RetriesExhausted {
                            attempts: attempt,
                            message: format!("{} returned status {}", self.base_url(), response.status()),
                        });
                    }
                    warn!(
                        peer = %self.base_url(),
                        status = %response.status(),
                        attempt,
                        "{} got server error, retrying in {:?}",
                        what,
                        delay
                    );
                }
                Err(e) => {
                    if attempt >= retry.max_attempts {
                        return Err(ClientError::RetriesExhausted {
                            attempts: attempt,
                            message: e.to_string(),
                        });
                    }
                    warn!(
                        peer = %self.base_url(),
                        attempt,
                        "{} failed ({}), retrying in {:?}",
                        what,
                        e,
                        delay
                    );
                }
            }

            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(retry.max_delay);
        }
    }
}
