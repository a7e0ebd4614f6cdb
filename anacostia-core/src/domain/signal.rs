//! Signal domain types

use serde::{Deserialize, Serialize};

use crate::domain::node::NodeId;

/// Signal kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    RunStart,
    Success,
    Failure,
    Skip,
}

/// A typed message from a node to a successor within a specific run
///
/// Signals are transient: they live only in the receiving node's inbox until
/// consumed for that run. Delivery is idempotent by `(from, run_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub from: NodeId,
    pub to: NodeId,
    pub run_id: i64,
    pub kind: SignalKind,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Signal {
    pub fn new(from: NodeId, to: NodeId, run_id: i64, kind: SignalKind) -> Self {
        Self {
            from,
            to,
            run_id,
            kind,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Creates a success signal
    pub fn success(from: NodeId, to: NodeId, run_id: i64) -> Self {
        Self::new(from, to, run_id, SignalKind::Success)
    }

    /// Creates a failure signal
    pub fn failure(from: NodeId, to: NodeId, run_id: i64) -> Self {
        Self::new(from, to, run_id, SignalKind::Failure)
    }

    /// Creates a skip signal
    pub fn skip(from: NodeId, to: NodeId, run_id: i64) -> Self {
        Self::new(from, to, run_id, SignalKind::Skip)
    }
}
