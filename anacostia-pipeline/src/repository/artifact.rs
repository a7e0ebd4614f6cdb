//! Artifact Repository
//!
//! Handles all database operations related to artifact entries.

use anacostia_core::domain::artifact::{ArtifactEntry, ArtifactState};
use sqlx::SqlitePool;

/// Insert a new artifact entry, idempotent by location
///
/// Returns the entry id whether the row was inserted or already present.
/// The monitor loop and the put RPC can race on the same path; the unique
/// location constraint makes the second writer a no-op.
pub async fn insert(
    pool: &SqlitePool,
    location: &str,
    state: ArtifactState,
) -> Result<i64, sqlx::Error> {
    let now = chrono::Utc::now();

    sqlx::query(
        r#"
        INSERT OR IGNORE INTO artifacts (location, state, created_at)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(location)
    .bind(state_to_string(state))
    .bind(now)
    .execute(pool)
    .await?;

    let id: i64 = sqlx::query_scalar("SELECT id FROM artifacts WHERE location = $1")
        .bind(location)
        .fetch_one(pool)
        .await?;

    Ok(id)
}

/// Check whether an entry exists for a location
pub async fn exists(pool: &SqlitePool, location: &str) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM artifacts WHERE location = $1")
        .bind(location)
        .fetch_one(pool)
        .await?;

    Ok(count > 0)
}

/// Count entries by state, optionally scoped to a run
pub async fn count_by_state(
    pool: &SqlitePool,
    state: ArtifactState,
    run_id: Option<i64>,
) -> Result<i64, sqlx::Error> {
    let count: i64 = match run_id {
        Some(run_id) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM artifacts WHERE state = $1 AND run_id = $2")
                .bind(state_to_string(state))
                .bind(run_id)
                .fetch_one(pool)
                .await?
        }
        None => sqlx::query_scalar("SELECT COUNT(*) FROM artifacts WHERE state = $1")
            .bind(state_to_string(state))
            .fetch_one(pool)
            .await?,
    };

    Ok(count)
}

/// List entries, optionally filtered by state and run
pub async fn list(
    pool: &SqlitePool,
    state: Option<ArtifactState>,
    run_id: Option<i64>,
) -> Result<Vec<ArtifactEntry>, sqlx::Error> {
    let rows = match (state, run_id) {
        (Some(state), Some(run_id)) => {
            sqlx::query_as::<_, ArtifactRow>(
                r#"
                SELECT id, location, state, run_id, created_at
                FROM artifacts
                WHERE state = $1 AND run_id = $2
                ORDER BY id ASC
                "#,
            )
            .bind(state_to_string(state))
            .bind(run_id)
            .fetch_all(pool)
            .await?
        }
        (Some(state), None) => {
            sqlx::query_as::<_, ArtifactRow>(
                r#"
                SELECT id, location, state, run_id, created_at
                FROM artifacts
                WHERE state = $1
                ORDER BY id ASC
                "#,
            )
            .bind(state_to_string(state))
            .fetch_all(pool)
            .await?
        }
        (None, Some(run_id)) => {
            sqlx::query_as::<_, ArtifactRow>(
                r#"
                SELECT id, location, state, run_id, created_at
                FROM artifacts
                WHERE run_id = $1
                ORDER BY id ASC
                "#,
            )
            .bind(run_id)
            .fetch_all(pool)
            .await?
        }
        (None, None) => {
            sqlx::query_as::<_, ArtifactRow>(
                r#"
                SELECT id, location, state, run_id, created_at
                FROM artifacts
                ORDER BY id ASC
                "#,
            )
            .fetch_all(pool)
            .await?
        }
    };

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

// =============================================================================
// Helper Functions
// =============================================================================

pub(crate) fn state_to_string(state: ArtifactState) -> &'static str {
    state.as_str()
}

pub(crate) fn string_to_state(s: &str) -> ArtifactState {
    match s {
        "new" => ArtifactState::New,
        "current" => ArtifactState::Current,
        "old" => ArtifactState::Old,
        _ => ArtifactState::New,
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ArtifactRow {
    id: i64,
    location: String,
    state: String,
    run_id: Option<i64>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<ArtifactRow> for ArtifactEntry {
    fn from(row: ArtifactRow) -> Self {
        ArtifactEntry {
            id: row.id,
            location: row.location,
            state: string_to_state(&row.state),
            run_id: row.run_id,
            created_at: row.created_at,
        }
    }
}
