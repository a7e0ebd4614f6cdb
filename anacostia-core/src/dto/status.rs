//! Status stream DTOs

use serde::{Deserialize, Serialize};

use crate::domain::node::{NodeId, NodeStatus};

/// One entry on the per-node status stream
///
/// Published on every lifecycle transition and multiplexed to SSE clients.
/// The stream is observability only; dropping it never affects execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub node_id: NodeId,
    pub status: NodeStatus,
    pub run_id: Option<i64>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl StatusUpdate {
    pub fn new(node_id: NodeId, status: NodeStatus, run_id: Option<i64>) -> Self {
        Self {
            node_id,
            status,
            run_id,
            timestamp: chrono::Utc::now(),
        }
    }
}
