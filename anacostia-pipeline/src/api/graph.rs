//! Graph Handler

use anacostia_core::dto::graph::GraphResponse;
use axum::{extract::State, Json};

use crate::api::AppState;

/// GET /graph
/// Topology snapshot consumed by the dashboard renderer
pub async fn get_graph(State(state): State<AppState>) -> Json<GraphResponse> {
    Json(state.graph.as_ref().clone())
}
