//! Connector link registry
//!
//! Remote edges are materialised as a sender/receiver pair. This module
//! holds the sender half: one `ConnectorClient` per peer pipeline, the
//! outbound handshake state, and what each handshake taught us about the
//! peer (its pipeline id and metadata store URL).
//!
//! The receiver half lives in the API layer, which registers inbound remote
//! predecessors on the target node's handle.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anacostia_client::{ConnectorClient, RetryPolicy};
use anacostia_core::domain::node::NodeId;
use anacostia_core::dto::connect::{ConnectRequest, ConnectResponse};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{info, warn};

/// A remote edge endpoint parsed from configuration
///
/// Configured as a single URL whose last path segment names the target
/// node: `http://host:port/node_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEdge {
    /// Peer pipeline base URL
    pub url: String,
    /// Target node name on the peer pipeline
    pub node: String,
}

#[derive(Debug, Error)]
#[error("invalid remote edge URL '{0}': expected http(s)://host:port/node_name")]
pub struct InvalidRemoteEdge(pub String);

impl RemoteEdge {
    pub fn parse(raw: &str) -> Result<Self, InvalidRemoteEdge> {
        if !raw.starts_with("http://") && !raw.starts_with("https://") {
            return Err(InvalidRemoteEdge(raw.to_string()));
        }

        let trimmed = raw.trim_end_matches('/');
        let (base, node) = trimmed
            .rsplit_once('/')
            .ok_or_else(|| InvalidRemoteEdge(raw.to_string()))?;

        // The split must not eat into the scheme's "//"
        if node.is_empty() || base.ends_with('/') || !base.contains("://") {
            return Err(InvalidRemoteEdge(raw.to_string()));
        }

        Ok(Self {
            url: base.to_string(),
            node: node.to_string(),
        })
    }
}

/// The run id space this pipeline participates in
///
/// Run ids are assigned by one root coordinator; the root's pipeline id
/// names the space. A root knows its space at construction. A leaf learns
/// it from the first inbound handshake and refuses handshakes that would
/// mix two spaces, and it holds its own outbound handshakes until the space
/// is known so the space propagates root-first along chains.
pub struct RunIdSpace {
    inner: Mutex<Option<String>>,
    notify: Notify,
}

impl RunIdSpace {
    pub fn known(space: &str) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            inner: Mutex::new(Some(space.to_string())),
            notify: Notify::new(),
        })
    }

    pub fn unknown() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            inner: Mutex::new(None),
            notify: Notify::new(),
        })
    }

    pub fn get(&self) -> Option<String> {
        self.inner.lock().unwrap().clone()
    }

    /// Adopt the space if unset; returns false when it conflicts
    pub fn try_adopt(&self, space: &str) -> bool {
        let adopted = {
            let mut inner = self.inner.lock().unwrap();
            match inner.as_deref() {
                Some(existing) => existing == space,
                None => {
                    *inner = Some(space.to_string());
                    true
                }
            }
        };
        if adopted {
            self.notify.notify_waiters();
        }
        adopted
    }

    /// Wait until the space is known
    pub async fn wait_known(&self) -> String {
        loop {
            let notified = self.notify.notified();
            if let Some(space) = self.get() {
                return space;
            }
            notified.await;
        }
    }
}

/// What a completed handshake taught us about a peer
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub receiver_id: NodeId,
    pub metadata_store_url: Option<String>,
}

/// Sender-side registry of remote links
pub struct LinkRegistry {
    clients: HashMap<String, ConnectorClient>,
    handshaken: Mutex<HashMap<String, PeerInfo>>,
    notify: Notify,
}

impl LinkRegistry {
    /// Build clients for every distinct peer base URL
    pub fn new(peer_urls: impl IntoIterator<Item = String>, retry: RetryPolicy) -> Self {
        let urls: HashSet<String> = peer_urls.into_iter().collect();
        let clients = urls
            .into_iter()
            .map(|url| {
                let client = ConnectorClient::with_retry(&url, retry.clone());
                (url, client)
            })
            .collect();

        Self {
            clients,
            handshaken: Mutex::new(HashMap::new()),
            notify: Notify::new(),
        }
    }

    pub fn client(&self, url: &str) -> Option<&ConnectorClient> {
        self.clients.get(url)
    }

    pub fn peer(&self, url: &str) -> Option<PeerInfo> {
        self.handshaken.lock().unwrap().get(url).cloned()
    }

    pub fn is_handshaken(&self, url: &str) -> bool {
        self.handshaken.lock().unwrap().contains_key(url)
    }

    fn mark_handshaken(&self, url: &str, response: &ConnectResponse) {
        self.handshaken.lock().unwrap().insert(
            url.to_string(),
            PeerInfo {
                receiver_id: response.receiver_id.clone(),
                metadata_store_url: response.metadata_store_url.clone(),
            },
        );
        self.notify.notify_waiters();
    }

    /// Wait until every given peer URL has completed its handshake
    pub async fn await_handshaken(&self, urls: &[String]) {
        loop {
            let notified = self.notify.notified();
            {
                let handshaken = self.handshaken.lock().unwrap();
                if urls.iter().all(|url| handshaken.contains_key(url)) {
                    return;
                }
            }
            notified.await;
        }
    }

    /// Perform the outbound handshake for one remote edge
    ///
    /// The client retries with backoff internally; the peer pipeline may
    /// still be launching.
    pub async fn handshake(
        &self,
        edge: &RemoteEdge,
        predecessor_id: NodeId,
        pipeline_id: &str,
        run_id_space: &str,
    ) -> Result<(), anacostia_client::ClientError> {
        let Some(client) = self.client(&edge.url) else {
            warn!(peer = %edge.url, "no client registered for peer");
            return Ok(());
        };

        let request = ConnectRequest {
            predecessor_id,
            pipeline_id: pipeline_id.to_string(),
            target_node: edge.node.clone(),
            run_id_space: run_id_space.to_string(),
        };

        let response = client.connect(&request).await?;
        info!(peer = %edge.url, node = %edge.node, "connector handshake complete");
        self.mark_handshaken(&edge.url, &response);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_remote_edge() {
        let edge = RemoteEdge::parse("http://10.0.0.2:8001/train").unwrap();
        assert_eq!(edge.url, "http://10.0.0.2:8001");
        assert_eq!(edge.node, "train");
    }

    #[test]
    fn test_parse_tolerates_trailing_slash() {
        let edge = RemoteEdge::parse("https://leaf.example.com:8001/evaluate/").unwrap();
        assert_eq!(edge.url, "https://leaf.example.com:8001");
        assert_eq!(edge.node, "evaluate");
    }

    #[test]
    fn test_parse_rejects_missing_node_segment() {
        assert!(RemoteEdge::parse("http://10.0.0.2:8001").is_err());
        assert!(RemoteEdge::parse("10.0.0.2:8001/train").is_err());
        assert!(RemoteEdge::parse("http://10.0.0.2:8001//").is_err());
    }
}
