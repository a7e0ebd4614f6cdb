//! RPC DTOs
//!
//! Query and body types for the `/rpc/metadata/*` and `/rpc/resource/*`
//! endpoints. The metadata surface mirrors the in-process store contract
//! over HTTP.

use serde::{Deserialize, Serialize};

use crate::domain::artifact::ArtifactState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumEntriesQuery {
    pub state: ArtifactState,
    pub run_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumEntriesResponse {
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryExistsQuery {
    pub location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryExistsResponse {
    pub exists: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEntryRequest {
    pub location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEntryResponse {
    pub entry_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListEntriesQuery {
    pub state: Option<ArtifactState>,
    pub run_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogMetricRequest {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsQuery {
    pub name: String,
    pub run_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub values: Vec<f64>,
}

/// Query for `/rpc/resource/artifacts`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListArtifactsQuery {
    pub run_id: Option<i64>,
}

/// Query for `/rpc/resource/fetch`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchArtifactQuery {
    pub path: String,
}

/// Body for `/rpc/resource/put`
///
/// Artifact contents travel as UTF-8 text; binary payloads are out of scope
/// for the reference resource proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutArtifactRequest {
    pub path: String,
    pub contents: String,
}
