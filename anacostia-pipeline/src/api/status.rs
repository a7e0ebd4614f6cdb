//! Status Stream Handler
//!
//! SSE multiplexing of the status bus, filtered per node. Purely
//! observational: a lagging or disconnected client never affects the
//! engine, and lagged bus entries are silently skipped.

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;

/// GET /node/{id}/status
/// Stream status updates for one node
pub async fn node_status_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    if state.registry.get(&id).is_none() {
        return Err(ApiError::NotFound(format!("Node {} not found", id)));
    }

    let stream = BroadcastStream::new(state.bus.subscribe()).filter_map(move |update| {
        let event = match update {
            Ok(update) if update.node_id.node_name == id => Event::default()
                .event("status")
                .json_data(&update)
                .ok()
                .map(Ok),
            _ => None,
        };
        futures::future::ready(event)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
