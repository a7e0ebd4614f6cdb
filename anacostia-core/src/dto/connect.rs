//! Connector handshake DTOs

use serde::{Deserialize, Serialize};

use crate::domain::node::NodeId;

/// Handshake request sent by the predecessor's pipeline at launch
///
/// `run_id_space` is the id of the root pipeline whose coordinator assigns
/// run ids for this edge. A receiver refuses handshakes that would mix two
/// different id spaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub predecessor_id: NodeId,
    pub pipeline_id: String,
    pub target_node: String,
    pub run_id_space: String,
}

/// Handshake response from the receiver's pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub receiver_id: NodeId,
    pub accepted: bool,
    pub metadata_store_url: Option<String>,
}
