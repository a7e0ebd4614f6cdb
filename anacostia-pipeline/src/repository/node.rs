//! Node Repository
//!
//! Handles node registration and per-run lifecycle event rows.

use anacostia_core::domain::node::{NodeDescriptor, NodeKind, NodeStatus};
use anacostia_core::domain::run::NodeEvent;
use sqlx::SqlitePool;

/// Register a node, replacing any previous registration under the same name
pub async fn upsert(pool: &SqlitePool, descriptor: &NodeDescriptor) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO nodes (name, kind, pipeline_id)
        VALUES ($1, $2, $3)
        ON CONFLICT(name) DO UPDATE SET kind = excluded.kind, pipeline_id = excluded.pipeline_id
        "#,
    )
    .bind(&descriptor.name)
    .bind(kind_to_string(descriptor.kind))
    .bind(&descriptor.pipeline_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// List all registered nodes
pub async fn list(pool: &SqlitePool) -> Result<Vec<NodeDescriptor>, sqlx::Error> {
    let rows = sqlx::query_as::<_, NodeRow>(
        r#"
        SELECT name, kind, pipeline_id
        FROM nodes
        ORDER BY name ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Record a lifecycle event for a node within a run
pub async fn insert_event(
    pool: &SqlitePool,
    run_id: i64,
    node_name: &str,
    status: NodeStatus,
) -> Result<(), sqlx::Error> {
    let now = chrono::Utc::now();

    sqlx::query(
        r#"
        INSERT INTO node_events (run_id, node_name, status, created_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(run_id)
    .bind(node_name)
    .bind(status.as_str())
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// List lifecycle events recorded for a run
pub async fn events_for_run(pool: &SqlitePool, run_id: i64) -> Result<Vec<NodeEvent>, sqlx::Error> {
    let rows = sqlx::query_as::<_, NodeEventRow>(
        r#"
        SELECT run_id, node_name, status, created_at
        FROM node_events
        WHERE run_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

// =============================================================================
// Helper Functions
// =============================================================================

fn kind_to_string(kind: NodeKind) -> &'static str {
    kind.as_str()
}

fn string_to_kind(s: &str) -> NodeKind {
    match s {
        "metadata_store" => NodeKind::MetadataStore,
        "resource" => NodeKind::Resource,
        "action" => NodeKind::Action,
        _ => NodeKind::Action,
    }
}

fn string_to_status(s: &str) -> NodeStatus {
    match s {
        "INITIALIZING" => NodeStatus::Initializing,
        "WAITING_RESOURCE" => NodeStatus::WaitingResource,
        "WAITING_METRICS" => NodeStatus::WaitingMetrics,
        "QUEUED" => NodeStatus::Queued,
        "PAUSED" => NodeStatus::Paused,
        "PREPARATION" => NodeStatus::Preparation,
        "EXECUTING" => NodeStatus::Executing,
        "CLEANUP" => NodeStatus::Cleanup,
        "COMPLETE" => NodeStatus::Complete,
        "TRIGGERED" => NodeStatus::Triggered,
        "SKIPPED" => NodeStatus::Skipped,
        "FAILURE" => NodeStatus::Failure,
        _ => NodeStatus::Error,
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct NodeRow {
    name: String,
    kind: String,
    pipeline_id: String,
}

impl From<NodeRow> for NodeDescriptor {
    fn from(row: NodeRow) -> Self {
        NodeDescriptor {
            name: row.name,
            kind: string_to_kind(&row.kind),
            pipeline_id: row.pipeline_id,
        }
    }
}

#[derive(sqlx::FromRow)]
struct NodeEventRow {
    run_id: i64,
    node_name: String,
    status: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<NodeEventRow> for NodeEvent {
    fn from(row: NodeEventRow) -> Self {
        NodeEvent {
            run_id: row.run_id,
            node_name: row.node_name,
            status: string_to_status(&row.status),
            created_at: row.created_at,
        }
    }
}
