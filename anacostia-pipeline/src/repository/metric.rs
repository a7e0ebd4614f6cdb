//! Metric Repository
//!
//! Handles all database operations related to metrics.

use anacostia_core::domain::metric::Metric;
use sqlx::SqlitePool;

/// Log a metric value
///
/// Values logged while no run is active carry a null run id and are promoted
/// by the next `start_run`.
pub async fn insert(
    pool: &SqlitePool,
    name: &str,
    value: f64,
    run_id: Option<i64>,
) -> Result<(), sqlx::Error> {
    let now = chrono::Utc::now();

    sqlx::query(
        r#"
        INSERT INTO metrics (name, value, run_id, logged_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(name)
    .bind(value)
    .bind(run_id)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch metric values by name
///
/// `run_id = None` selects the values not yet promoted to any run.
pub async fn values(
    pool: &SqlitePool,
    name: &str,
    run_id: Option<i64>,
) -> Result<Vec<f64>, sqlx::Error> {
    let values = match run_id {
        Some(run_id) => {
            sqlx::query_scalar(
                "SELECT value FROM metrics WHERE name = $1 AND run_id = $2 ORDER BY id ASC",
            )
            .bind(name)
            .bind(run_id)
            .fetch_all(pool)
            .await?
        }
        None => sqlx::query_scalar(
            "SELECT value FROM metrics WHERE name = $1 AND run_id IS NULL ORDER BY id ASC",
        )
        .bind(name)
        .fetch_all(pool)
        .await?,
    };

    Ok(values)
}

/// Maximum unpromoted value for a metric name, if any values exist
pub async fn max_unassigned(pool: &SqlitePool, name: &str) -> Result<Option<f64>, sqlx::Error> {
    sqlx::query_scalar("SELECT MAX(value) FROM metrics WHERE name = $1 AND run_id IS NULL")
        .bind(name)
        .fetch_one(pool)
        .await
}

/// List full metric records, optionally scoped to a run
pub async fn list(
    pool: &SqlitePool,
    name: &str,
    run_id: Option<i64>,
) -> Result<Vec<Metric>, sqlx::Error> {
    let rows = match run_id {
        Some(run_id) => {
            sqlx::query_as::<_, MetricRow>(
                r#"
                SELECT id, name, value, run_id, logged_at
                FROM metrics
                WHERE name = $1 AND run_id = $2
                ORDER BY id ASC
                "#,
            )
            .bind(name)
            .bind(run_id)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, MetricRow>(
                r#"
                SELECT id, name, value, run_id, logged_at
                FROM metrics
                WHERE name = $1 AND run_id IS NULL
                ORDER BY id ASC
                "#,
            )
            .bind(name)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct MetricRow {
    id: i64,
    name: String,
    value: f64,
    run_id: Option<i64>,
    logged_at: chrono::DateTime<chrono::Utc>,
}

impl From<MetricRow> for Metric {
    fn from(row: MetricRow) -> Self {
        Metric {
            id: row.id,
            name: row.name,
            value: row.value,
            run_id: row.run_id,
            logged_at: row.logged_at,
        }
    }
}
