//! Run domain types

use serde::{Deserialize, Serialize};

/// One end-to-end traversal of the DAG
///
/// Created by the root metadata store when a trigger fires. `end_time` is set
/// once every node has reached a terminal state for the run. Run ids are
/// strictly monotonic and runs never overlap within a root pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: i64,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl Run {
    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }
}

/// A per-node lifecycle event recorded against a run
///
/// These rows are the per-node timing record of a run; the EXECUTING and
/// CLEANUP rows back the topological-ordering checks across pipelines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEvent {
    pub run_id: i64,
    pub node_name: String,
    pub status: crate::domain::node::NodeStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
