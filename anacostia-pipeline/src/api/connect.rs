//! Connector Handshake Handler
//!
//! Receiver side of the handshake: registers the remote predecessor on the
//! target node and tells the sender where our metadata store lives. A node
//! depending on this edge stays INITIALIZING until its handshake lands.

use anacostia_core::domain::node::NodeId;
use anacostia_core::dto::connect::{ConnectRequest, ConnectResponse};
use axum::{extract::State, Json};
use tracing::{info, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;

/// POST /connect
/// Accept a connector handshake from a remote predecessor's pipeline
pub async fn connect(
    State(state): State<AppState>,
    Json(req): Json<ConnectRequest>,
) -> ApiResult<Json<ConnectResponse>> {
    let receiver_id = NodeId::new(state.pipeline_id.clone(), req.target_node.clone());

    let Some(handle) = state.registry.get(&req.target_node) else {
        return Err(ApiError::NotFound(format!(
            "Node {} not found",
            req.target_node
        )));
    };

    // One run id space per pipeline: refuse a handshake that would mix runs
    // from two unrelated roots.
    if !state.space.try_adopt(&req.run_id_space) {
        warn!(
            predecessor = %req.predecessor_id,
            offered = %req.run_id_space,
            "handshake refused: conflicting run id space"
        );
        return Ok(Json(ConnectResponse {
            receiver_id,
            accepted: false,
            metadata_store_url: None,
        }));
    }

    handle.register_remote_predecessor(&req.predecessor_id);
    info!(
        predecessor = %req.predecessor_id,
        target = %req.target_node,
        "connector handshake accepted"
    );

    Ok(Json(ConnectResponse {
        receiver_id,
        accepted: true,
        metadata_store_url: Some(state.base_url.clone()),
    }))
}
