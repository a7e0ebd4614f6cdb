//! Artifact domain types

use serde::{Deserialize, Serialize};

/// Artifact entry state
///
/// State progression is one-way: `new -> current -> old`. An entry is
/// promoted to `current` with the run id that consumes it and demoted to
/// `old` when that run ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactState {
    New,
    Current,
    Old,
}

impl ArtifactState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactState::New => "new",
            ArtifactState::Current => "current",
            ArtifactState::Old => "old",
        }
    }
}

/// Metadata-store record describing an external object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub id: i64,
    pub location: String,
    pub state: ArtifactState,
    pub run_id: Option<i64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
