//! RPC Handlers
//!
//! The metadata endpoints mirror the in-process store contract over HTTP
//! for nodes on other pipelines. The resource endpoints proxy artifact
//! access: artifact bytes are owned by this pipeline's resource nodes and
//! every remote reader comes through here.

use std::path::{Path, PathBuf};

use anacostia_core::domain::artifact::ArtifactEntry;
use anacostia_core::domain::run::Run;
use anacostia_core::dto::rpc::{
    CreateEntryRequest, CreateEntryResponse, EntryExistsQuery, EntryExistsResponse,
    FetchArtifactQuery, ListArtifactsQuery, ListEntriesQuery, LogMetricRequest, MetricsQuery,
    MetricsResponse, NumEntriesQuery, NumEntriesResponse, PutArtifactRequest,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use tracing::{debug, info};

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;

// =============================================================================
// Metadata RPC
// =============================================================================

/// GET /rpc/metadata/num_entries
pub async fn num_entries(
    State(state): State<AppState>,
    Query(query): Query<NumEntriesQuery>,
) -> ApiResult<Json<NumEntriesResponse>> {
    let count = state
        .store
        .get_num_entries(query.state, query.run_id)
        .await?;
    Ok(Json(NumEntriesResponse { count }))
}

/// GET /rpc/metadata/entry_exists
pub async fn entry_exists(
    State(state): State<AppState>,
    Query(query): Query<EntryExistsQuery>,
) -> ApiResult<Json<EntryExistsResponse>> {
    let exists = state.store.entry_exists(&query.location).await?;
    Ok(Json(EntryExistsResponse { exists }))
}

/// GET /rpc/metadata/entries
pub async fn list_entries(
    State(state): State<AppState>,
    Query(query): Query<ListEntriesQuery>,
) -> ApiResult<Json<Vec<ArtifactEntry>>> {
    let entries = state.store.list_entries(query.state, query.run_id).await?;
    Ok(Json(entries))
}

/// POST /rpc/metadata/entries
pub async fn create_entry(
    State(state): State<AppState>,
    Json(req): Json<CreateEntryRequest>,
) -> ApiResult<Json<CreateEntryResponse>> {
    debug!(location = %req.location, "creating entry via RPC");
    let entry_id = state.store.create_entry(&req.location).await?;

    // The new entry may satisfy a trigger condition
    let _ = state.coordinator.poke().await;

    Ok(Json(CreateEntryResponse { entry_id }))
}

/// GET /rpc/metadata/metrics
pub async fn get_metrics(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> ApiResult<Json<MetricsResponse>> {
    let values = state.store.get_metrics(&query.name, query.run_id).await?;
    Ok(Json(MetricsResponse { values }))
}

/// POST /rpc/metadata/metrics
pub async fn log_metric(
    State(state): State<AppState>,
    Json(req): Json<LogMetricRequest>,
) -> ApiResult<StatusCode> {
    state.store.log_metric(&req.name, req.value).await?;

    // The new value may cross a metric trigger threshold
    let _ = state.coordinator.poke().await;

    Ok(StatusCode::CREATED)
}

/// GET /rpc/metadata/runs
pub async fn list_runs(State(state): State<AppState>) -> ApiResult<Json<Vec<Run>>> {
    let runs = state.store.list_runs().await?;
    Ok(Json(runs))
}

// =============================================================================
// Resource RPC
// =============================================================================

/// GET /rpc/resource/artifacts
/// List artifact locations, optionally scoped to a run
pub async fn list_artifacts(
    State(state): State<AppState>,
    Query(query): Query<ListArtifactsQuery>,
) -> ApiResult<Json<Vec<String>>> {
    let entries = state.store.list_entries(None, query.run_id).await?;
    let locations = entries.into_iter().map(|entry| entry.location).collect();
    Ok(Json(locations))
}

/// GET /rpc/resource/fetch
/// Read an artifact's contents by path
pub async fn fetch_artifact(
    State(state): State<AppState>,
    Query(query): Query<FetchArtifactQuery>,
) -> ApiResult<String> {
    let path = resolve_read_path(&state, &query.path)?;
    tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| ApiError::NotFound(format!("Artifact {} not readable: {}", query.path, e)))
}

/// POST /rpc/resource/put
/// Upload an artifact into a resource directory
pub async fn put_artifact(
    State(state): State<AppState>,
    Json(req): Json<PutArtifactRequest>,
) -> ApiResult<StatusCode> {
    let path = resolve_write_path(&state, &req.path)?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ApiError::InternalError(format!("Failed to create directory: {}", e)))?;
    }
    tokio::fs::write(&path, req.contents.as_bytes())
        .await
        .map_err(|e| ApiError::InternalError(format!("Failed to write artifact: {}", e)))?;

    // Record the entry right away rather than waiting for the monitor scan
    if let Ok(canonical) = tokio::fs::canonicalize(&path).await {
        state
            .store
            .create_entry(&canonical.to_string_lossy())
            .await?;
        let _ = state.coordinator.poke().await;
    }

    info!(path = %path.display(), "artifact uploaded");
    Ok(StatusCode::CREATED)
}

// =============================================================================
// Path Resolution
// =============================================================================

/// Resolve a read path, confined to the registered resource directories
fn resolve_read_path(state: &AppState, raw: &str) -> Result<PathBuf, ApiError> {
    if raw.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(ApiError::BadRequest(
            "artifact paths cannot contain '..'".to_string(),
        ));
    }

    let path = Path::new(raw);
    if !path.is_absolute() {
        return Err(ApiError::BadRequest(
            "artifact paths must be absolute".to_string(),
        ));
    }
    ensure_under_resource_dir(state, path)?;
    Ok(path.to_path_buf())
}

/// Resolve a write path: absolute and confined, or relative to the sole
/// resource directory
fn resolve_write_path(state: &AppState, raw: &str) -> Result<PathBuf, ApiError> {
    if raw.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(ApiError::BadRequest(
            "artifact paths cannot contain '..'".to_string(),
        ));
    }

    let path = Path::new(raw);
    if path.is_absolute() {
        ensure_under_resource_dir(state, path)?;
        return Ok(path.to_path_buf());
    }

    match state.resource_dirs.len() {
        0 => Err(ApiError::BadRequest(
            "pipeline has no resource directories".to_string(),
        )),
        1 => {
            let dir = state.resource_dirs.values().next().expect("checked length");
            Ok(dir.join(path))
        }
        _ => Err(ApiError::BadRequest(
            "relative paths are ambiguous with multiple resource nodes; use an absolute path"
                .to_string(),
        )),
    }
}

// Lexical containment only: callers must reject `..` segments first, since
// starts_with never resolves them.
fn ensure_under_resource_dir(state: &AppState, path: &Path) -> Result<(), ApiError> {
    let allowed = state
        .resource_dirs
        .values()
        .any(|dir| path.starts_with(dir));
    if allowed {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "path {} is outside every resource directory",
            path.display()
        )))
    }
}
