//! Signal Delivery Handler
//!
//! Receiver side of signal delivery. Every inbound signal advances the leaf
//! run switch (run ids are the cross-pipeline ordering primitive); outcome
//! signals then land in the target node's inbox, where duplicate delivery
//! for the same `(from, run_id)` is a no-op.

use anacostia_core::domain::signal::{Signal, SignalKind};
use axum::{extract::State, http::StatusCode, Json};
use tokio::time::Instant;
use tracing::debug;

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;

/// POST /signal
/// Deliver a signal into the target node's inbox
pub async fn deliver_signal(
    State(state): State<AppState>,
    Json(signal): Json<Signal>,
) -> ApiResult<StatusCode> {
    // The run row must exist locally before any engine can observe the new
    // run; mirroring is idempotent under concurrent deliveries.
    if state.runs.would_advance(signal.run_id) {
        state.store.mirror_run_start(signal.run_id).await?;
    }

    let deadline = state.run_deadline.map(|d| Instant::now() + d);
    state.runs.observe(signal.run_id, deadline);

    if signal.kind == SignalKind::RunStart {
        debug!(run_id = signal.run_id, from = %signal.from, "run_start observed");
        return Ok(StatusCode::OK);
    }

    let Some(handle) = state.registry.get(&signal.to.node_name) else {
        return Err(ApiError::NotFound(format!(
            "Node {} not found",
            signal.to.node_name
        )));
    };

    let fresh = handle.inbox.deliver(signal);
    debug!(fresh, "signal delivered");
    Ok(StatusCode::OK)
}
