//! Node domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Globally unique node identity
///
/// A node is identified by the pipeline that hosts it and its name within
/// that pipeline. The wire form is `pipeline_id/node_name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    pub pipeline_id: String,
    pub node_name: String,
}

impl NodeId {
    pub fn new(pipeline_id: impl Into<String>, node_name: impl Into<String>) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            node_name: node_name.into(),
        }
    }

    /// Parse a `pipeline_id/node_name` string
    pub fn parse(s: &str) -> Option<Self> {
        let (pipeline_id, node_name) = s.split_once('/')?;
        if pipeline_id.is_empty() || node_name.is_empty() {
            return None;
        }
        Some(Self::new(pipeline_id, node_name))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pipeline_id, self.node_name)
    }
}

/// Base node kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    MetadataStore,
    Resource,
    Action,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::MetadataStore => "metadata_store",
            NodeKind::Resource => "resource",
            NodeKind::Action => "action",
        }
    }
}

/// Node lifecycle status
///
/// The closed set of states the lifecycle engine moves a node through. These
/// values are the only ones published on the status stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    Initializing,
    WaitingResource,
    WaitingMetrics,
    Queued,
    Paused,
    Preparation,
    Executing,
    Cleanup,
    Complete,
    Triggered,
    Skipped,
    Failure,
    Error,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Initializing => "INITIALIZING",
            NodeStatus::WaitingResource => "WAITING_RESOURCE",
            NodeStatus::WaitingMetrics => "WAITING_METRICS",
            NodeStatus::Queued => "QUEUED",
            NodeStatus::Paused => "PAUSED",
            NodeStatus::Preparation => "PREPARATION",
            NodeStatus::Executing => "EXECUTING",
            NodeStatus::Cleanup => "CLEANUP",
            NodeStatus::Complete => "COMPLETE",
            NodeStatus::Triggered => "TRIGGERED",
            NodeStatus::Skipped => "SKIPPED",
            NodeStatus::Failure => "FAILURE",
            NodeStatus::Error => "ERROR",
        }
    }

    /// A terminal status ends the node's participation in the current run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeStatus::Complete | NodeStatus::Skipped | NodeStatus::Failure | NodeStatus::Error
        )
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node registration record persisted in the metadata store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub name: String,
    pub kind: NodeKind,
    pub pipeline_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_round_trip() {
        let id = NodeId::new("root", "train");
        assert_eq!(id.to_string(), "root/train");
        assert_eq!(NodeId::parse("root/train"), Some(id));
    }

    #[test]
    fn test_node_id_parse_rejects_malformed() {
        assert_eq!(NodeId::parse("no-separator"), None);
        assert_eq!(NodeId::parse("/train"), None);
        assert_eq!(NodeId::parse("root/"), None);
    }

    #[test]
    fn test_status_wire_form() {
        let json = serde_json::to_string(&NodeStatus::WaitingResource).unwrap();
        assert_eq!(json, "\"WAITING_RESOURCE\"");
        assert_eq!(NodeStatus::WaitingResource.as_str(), "WAITING_RESOURCE");
    }

    #[test]
    fn test_terminal_states() {
        assert!(NodeStatus::Complete.is_terminal());
        assert!(NodeStatus::Skipped.is_terminal());
        assert!(NodeStatus::Failure.is_terminal());
        assert!(NodeStatus::Error.is_terminal());
        assert!(!NodeStatus::Executing.is_terminal());
        assert!(!NodeStatus::Queued.is_terminal());
    }
}
