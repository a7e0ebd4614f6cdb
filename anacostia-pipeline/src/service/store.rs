//! Metadata Store Service
//!
//! The coordination contract every node goes through: run lifecycle rows,
//! artifact entry state progression, metric logging and promotion, node
//! registration and per-run lifecycle events.
//!
//! All multi-statement operations run inside a transaction on the store's
//! single-connection pool, so `start_run`/`end_run` are serialised and run
//! ids come out strictly monotonic and non-overlapping.

use anacostia_core::domain::artifact::{ArtifactEntry, ArtifactState};
use anacostia_core::domain::metric::Metric;
use anacostia_core::domain::node::{NodeDescriptor, NodeStatus};
use anacostia_core::domain::run::{NodeEvent, Run};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::repository::{artifact_repository, metric_repository, node_repository, run_repository};

/// Service error type
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a run is already active")]
    RunActive,

    #[error("run {0} not found")]
    RunNotFound(i64),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Handle to the pipeline's metadata store
///
/// Cheap to clone; all clones share the underlying pool.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    pool: SqlitePool,
}

impl MetadataStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =============================================================================
    // Run Lifecycle
    // =============================================================================

    /// Start a new run
    ///
    /// Refuses while another run is active. Promotes every `new` artifact
    /// entry with a null run id to `current` under the new id, and promotes
    /// unassigned metrics the same way.
    pub async fn start_run(&self) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await?;

        let active: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM runs WHERE end_time IS NULL")
            .fetch_one(&mut *tx)
            .await?;
        if active > 0 {
            return Err(StoreError::RunActive);
        }

        let now = chrono::Utc::now();
        let run_id: i64 =
            sqlx::query_scalar("INSERT INTO runs (start_time) VALUES ($1) RETURNING run_id")
                .bind(now)
                .fetch_one(&mut *tx)
                .await?;

        sqlx::query(
            r#"
            UPDATE artifacts
            SET state = 'current', run_id = $1
            WHERE state = 'new' AND run_id IS NULL
            "#,
        )
        .bind(run_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE metrics SET run_id = $1 WHERE run_id IS NULL")
            .bind(run_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(run_id, "started run");
        Ok(run_id)
    }

    /// End a run
    ///
    /// Sets the end time and demotes the run's `current` artifacts to `old`.
    pub async fn end_run(&self, run_id: i64) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let now = chrono::Utc::now();
        let updated = sqlx::query("UPDATE runs SET end_time = $1 WHERE run_id = $2")
            .bind(now)
            .bind(run_id)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::RunNotFound(run_id));
        }

        sqlx::query(
            r#"
            UPDATE artifacts
            SET state = 'old'
            WHERE state = 'current' AND run_id = $1
            "#,
        )
        .bind(run_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(run_id, "ended run");
        Ok(())
    }

    /// Mirror a run started by a remote root pipeline
    ///
    /// Leaf pipelines record run rows under the root's id space so local
    /// node events and artifact promotion line up with the federation-wide
    /// run. Idempotent per run id.
    pub async fn mirror_run_start(&self, run_id: i64) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let now = chrono::Utc::now();
        sqlx::query("INSERT OR IGNORE INTO runs (run_id, start_time) VALUES ($1, $2)")
            .bind(run_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            UPDATE artifacts
            SET state = 'current', run_id = $1
            WHERE state = 'new' AND run_id IS NULL
            "#,
        )
        .bind(run_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE metrics SET run_id = $1 WHERE run_id IS NULL")
            .bind(run_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// The currently active run, if any
    pub async fn active_run(&self) -> Result<Option<Run>, StoreError> {
        Ok(run_repository::find_active(&self.pool).await?)
    }

    /// Fetch a run by id
    pub async fn get_run(&self, run_id: i64) -> Result<Run, StoreError> {
        run_repository::find_by_id(&self.pool, run_id)
            .await?
            .ok_or(StoreError::RunNotFound(run_id))
    }

    /// List all runs
    pub async fn list_runs(&self) -> Result<Vec<Run>, StoreError> {
        Ok(run_repository::list_all(&self.pool).await?)
    }

    // =============================================================================
    // Artifact Entries
    // =============================================================================

    /// Create a `new` artifact entry for a location
    ///
    /// Idempotent: a second create for the same location returns the
    /// existing entry id.
    pub async fn create_entry(&self, location: &str) -> Result<i64, StoreError> {
        self.create_entry_with_state(location, ArtifactState::New)
            .await
    }

    /// Create an entry in an explicit initial state
    ///
    /// Used by resource nodes recording pre-existing files with
    /// `init_state = old` at startup.
    pub async fn create_entry_with_state(
        &self,
        location: &str,
        state: ArtifactState,
    ) -> Result<i64, StoreError> {
        Ok(artifact_repository::insert(&self.pool, location, state).await?)
    }

    pub async fn entry_exists(&self, location: &str) -> Result<bool, StoreError> {
        Ok(artifact_repository::exists(&self.pool, location).await?)
    }

    pub async fn get_num_entries(
        &self,
        state: ArtifactState,
        run_id: Option<i64>,
    ) -> Result<i64, StoreError> {
        Ok(artifact_repository::count_by_state(&self.pool, state, run_id).await?)
    }

    pub async fn list_entries(
        &self,
        state: Option<ArtifactState>,
        run_id: Option<i64>,
    ) -> Result<Vec<ArtifactEntry>, StoreError> {
        Ok(artifact_repository::list(&self.pool, state, run_id).await?)
    }

    // =============================================================================
    // Metrics
    // =============================================================================

    /// Log a metric value
    ///
    /// The value is attached to the active run if one exists, otherwise it
    /// stays unassigned until the next `start_run` promotes it.
    pub async fn log_metric(&self, name: &str, value: f64) -> Result<(), StoreError> {
        let run_id = self.active_run().await?.map(|r| r.run_id);
        metric_repository::insert(&self.pool, name, value, run_id).await?;
        Ok(())
    }

    pub async fn get_metrics(
        &self,
        name: &str,
        run_id: Option<i64>,
    ) -> Result<Vec<f64>, StoreError> {
        Ok(metric_repository::values(&self.pool, name, run_id).await?)
    }

    pub async fn list_metrics(
        &self,
        name: &str,
        run_id: Option<i64>,
    ) -> Result<Vec<Metric>, StoreError> {
        Ok(metric_repository::list(&self.pool, name, run_id).await?)
    }

    /// Maximum unpromoted value for a metric, if any
    pub async fn max_unassigned_metric(&self, name: &str) -> Result<Option<f64>, StoreError> {
        Ok(metric_repository::max_unassigned(&self.pool, name).await?)
    }

    // =============================================================================
    // Node Registration & Events
    // =============================================================================

    /// One-time node registration during setup
    pub async fn add_node(&self, descriptor: &NodeDescriptor) -> Result<(), StoreError> {
        node_repository::upsert(&self.pool, descriptor).await?;
        Ok(())
    }

    pub async fn list_nodes(&self) -> Result<Vec<NodeDescriptor>, StoreError> {
        Ok(node_repository::list(&self.pool).await?)
    }

    /// Record a lifecycle event for a node within a run
    pub async fn record_node_event(
        &self,
        run_id: i64,
        node_name: &str,
        status: NodeStatus,
    ) -> Result<(), StoreError> {
        node_repository::insert_event(&self.pool, run_id, node_name, status).await?;
        Ok(())
    }

    pub async fn events_for_run(&self, run_id: i64) -> Result<Vec<NodeEvent>, StoreError> {
        Ok(node_repository::events_for_run(&self.pool, run_id).await?)
    }
}
