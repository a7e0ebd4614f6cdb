//! Run Repository
//!
//! Handles all database operations related to runs.

use anacostia_core::domain::run::Run;
use sqlx::SqlitePool;

/// Find the currently active run, if any
pub async fn find_active(pool: &SqlitePool) -> Result<Option<Run>, sqlx::Error> {
    let row = sqlx::query_as::<_, RunRow>(
        r#"
        SELECT run_id, start_time, end_time
        FROM runs
        WHERE end_time IS NULL
        ORDER BY run_id DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Find a run by ID
pub async fn find_by_id(pool: &SqlitePool, run_id: i64) -> Result<Option<Run>, sqlx::Error> {
    let row = sqlx::query_as::<_, RunRow>(
        r#"
        SELECT run_id, start_time, end_time
        FROM runs
        WHERE run_id = $1
        "#,
    )
    .bind(run_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// List all runs in id order
pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Run>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RunRow>(
        r#"
        SELECT run_id, start_time, end_time
        FROM runs
        ORDER BY run_id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct RunRow {
    run_id: i64,
    start_time: chrono::DateTime<chrono::Utc>,
    end_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<RunRow> for Run {
    fn from(row: RunRow) -> Self {
        Run {
            run_id: row.run_id,
            start_time: row.start_time,
            end_time: row.end_time,
        }
    }
}
