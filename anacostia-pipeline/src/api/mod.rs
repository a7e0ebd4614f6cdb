//! API Module
//!
//! HTTP surface of a pipeline process: the connector handshake and signal
//! endpoints, the metadata/resource RPC proxies, the graph snapshot and the
//! per-node SSE status stream. Each submodule handles endpoints for a
//! specific domain.

pub mod connect;
pub mod error;
pub mod graph;
pub mod health;
pub mod rpc;
pub mod signal;
pub mod status;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anacostia_core::dto::graph::GraphResponse;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::connector::RunIdSpace;
use crate::engine::node::NodeRegistry;
use crate::engine::runs::RunSwitch;
use crate::service::coordinator::RunCoordinator;
use crate::service::store::MetadataStore;
use crate::status::StatusBus;

/// Shared state for every handler
#[derive(Clone)]
pub struct AppState {
    pub pipeline_id: String,
    pub base_url: String,
    pub registry: Arc<NodeRegistry>,
    pub store: MetadataStore,
    pub runs: RunSwitch,
    pub bus: StatusBus,
    pub coordinator: Arc<RunCoordinator>,
    pub graph: Arc<GraphResponse>,
    pub resource_dirs: Arc<HashMap<String, PathBuf>>,
    pub space: Arc<RunIdSpace>,
    pub run_deadline: Option<Duration>,
}

/// Create the pipeline API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Topology snapshot
        .route("/graph", get(graph::get_graph))
        // Per-node status stream
        .route("/node/{id}/status", get(status::node_status_stream))
        // Connector protocol
        .route("/connect", post(connect::connect))
        .route("/signal", post(signal::deliver_signal))
        // Metadata RPC
        .route("/rpc/metadata/num_entries", get(rpc::num_entries))
        .route("/rpc/metadata/entry_exists", get(rpc::entry_exists))
        .route(
            "/rpc/metadata/entries",
            get(rpc::list_entries).post(rpc::create_entry),
        )
        .route(
            "/rpc/metadata/metrics",
            get(rpc::get_metrics).post(rpc::log_metric),
        )
        .route("/rpc/metadata/runs", get(rpc::list_runs))
        // Resource RPC
        .route("/rpc/resource/artifacts", get(rpc::list_artifacts))
        .route("/rpc/resource/fetch", get(rpc::fetch_artifact))
        .route("/rpc/resource/put", post(rpc::put_artifact))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
