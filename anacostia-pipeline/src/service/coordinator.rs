//! Run Coordinator Service
//!
//! Owns the run lifecycle on a root pipeline: evaluates trigger conditions,
//! serialises `start_run`/`end_run` against the metadata store, broadcasts
//! run boundaries on the run switch, tracks per-run node completion and
//! enforces the optional run deadline. On a leaf pipeline it only mirrors
//! run rows and closes them when every local node reaches a terminal state.
//!
//! Only one trigger is honoured while a run is active; the rest are
//! deferred and re-evaluated after `end_run`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anacostia_core::domain::artifact::ArtifactState;
use anacostia_core::domain::node::NodeStatus;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::PipelineRole;
use crate::engine::node::{wait_shutdown, NodeRegistry};
use crate::engine::runs::RunSwitch;
use crate::service::store::{MetadataStore, StoreError};

/// Predicate over metadata-store state that starts a new run
#[derive(Debug, Clone)]
pub enum TriggerCondition {
    /// Fires when the number of `new` entries reaches the threshold
    NewEntries { threshold: i64 },
    /// Fires when the max unpromoted value of a metric exceeds the threshold
    MetricThreshold { name: String, threshold: f64 },
}

impl TriggerCondition {
    pub async fn evaluate(&self, store: &MetadataStore) -> Result<bool, StoreError> {
        match self {
            TriggerCondition::NewEntries { threshold } => {
                let count = store.get_num_entries(ArtifactState::New, None).await?;
                Ok(count >= *threshold)
            }
            TriggerCondition::MetricThreshold { name, threshold } => {
                let max = store.max_unassigned_metric(name).await?;
                Ok(max.is_some_and(|value| value > *threshold))
            }
        }
    }
}

/// Per-run coordination mediated by the metadata store
pub struct RunCoordinator {
    store: MetadataStore,
    runs: RunSwitch,
    role: PipelineRole,
    registry: Arc<NodeRegistry>,
    triggers: Vec<(String, TriggerCondition)>,
    participants: Vec<String>,
    deadline: Option<Duration>,
    // Keyed by run id: an engine can report in before the lifecycle loop
    // has even observed the run beginning.
    completion: Mutex<HashMap<i64, HashSet<String>>>,
    progress: Notify,
}

impl RunCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: MetadataStore,
        runs: RunSwitch,
        role: PipelineRole,
        registry: Arc<NodeRegistry>,
        triggers: Vec<(String, TriggerCondition)>,
        participants: Vec<String>,
        deadline: Option<Duration>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            runs,
            role,
            registry,
            triggers,
            participants,
            deadline,
            completion: Mutex::new(HashMap::new()),
            progress: Notify::new(),
        })
    }

    /// Evaluate trigger conditions and start a run if one fires
    ///
    /// A no-op on leaf pipelines and while a run is active; deferred
    /// triggers are re-evaluated after `end_run`.
    pub async fn poke(&self) -> Result<Option<i64>, StoreError> {
        if self.role != PipelineRole::Root {
            return Ok(None);
        }
        if self.runs.current().is_some() || self.store.active_run().await?.is_some() {
            debug!("trigger evaluation deferred: run active");
            return Ok(None);
        }

        for (node, condition) in &self.triggers {
            if condition.evaluate(&self.store).await? {
                if let Some(handle) = self.registry.get(node) {
                    handle.set_status(NodeStatus::Triggered, None);
                }

                let run_id = match self.store.start_run().await {
                    Ok(run_id) => run_id,
                    // Lost a race with another poke; the winner's run covers
                    // this trigger.
                    Err(StoreError::RunActive) => return Ok(None),
                    Err(e) => return Err(e),
                };

                let deadline = self.deadline.map(|d| Instant::now() + d);
                self.runs.begin(run_id, deadline);
                info!(run_id, trigger = %node, "trigger fired, run started");
                return Ok(Some(run_id));
            }
        }

        Ok(None)
    }

    /// Record that a node reached a terminal state for a run
    pub fn node_finished(&self, run_id: i64, node_name: &str) {
        {
            let mut completion = self.completion.lock().unwrap();
            completion
                .entry(run_id)
                .or_default()
                .insert(node_name.to_string());
        }
        self.progress.notify_waiters();
    }

    /// The run lifecycle loop, spawned once per pipeline
    ///
    /// Waits for each run to begin (root: via `poke`; leaf: via the run
    /// switch observing connector traffic), then for every participant to
    /// finish or the deadline to elapse, then finalises the run.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut last_handled = 0i64;
        loop {
            let active = tokio::select! {
                active = self.runs.next_run(last_handled) => active,
                _ = wait_shutdown(&mut shutdown) => return,
            };
            last_handled = active.run_id;

            // Wait for completion, the deadline, or shutdown
            let mut deadline = active.deadline;
            loop {
                let notified = self.progress.notified();
                if self.is_complete(active.run_id) {
                    break;
                }

                tokio::select! {
                    _ = notified => {}
                    _ = sleep_until_opt(deadline) => {
                        warn!(run_id = active.run_id, "run deadline elapsed, forcing skip");
                        // Ending the switch moves every non-terminal node to
                        // SKIPPED; keep waiting for them to report in.
                        self.runs.end();
                        deadline = None;
                    }
                    _ = wait_shutdown(&mut shutdown) => {
                        self.runs.end();
                        if let Err(e) = self.store.end_run(active.run_id).await {
                            warn!(run_id = active.run_id, "end_run during shutdown: {e}");
                        }
                        return;
                    }
                }
            }

            self.finalize(active.run_id).await;
        }
    }

    async fn finalize(&self, run_id: i64) {
        if let Err(e) = self.store.end_run(run_id).await {
            error!(run_id, "failed to end run: {e}");
        }
        self.registry.clear_inboxes(run_id);
        self.runs.end();
        {
            let mut completion = self.completion.lock().unwrap();
            completion.retain(|&tracked, _| tracked > run_id);
        }
        info!(run_id, "run finished");

        // Deferred triggers get their chance now
        if let Err(e) = self.poke().await {
            error!("trigger re-evaluation after run end failed: {e}");
        }
    }

    fn is_complete(&self, run_id: i64) -> bool {
        let completion = self.completion.lock().unwrap();
        match completion.get(&run_id) {
            Some(finished) => self.participants.iter().all(|node| finished.contains(node)),
            None => false,
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::status::StatusBus;
    use anacostia_core::domain::node::{NodeId, NodeKind};

    async fn fixture(triggers: Vec<(String, TriggerCondition)>) -> (Arc<RunCoordinator>, MetadataStore, RunSwitch) {
        let pool = db::create_pool("sqlite::memory:").await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        let store = MetadataStore::new(pool);

        let bus = StatusBus::new();
        let handle = crate::engine::node::NodeHandle::new(
            NodeId::new("root", "data"),
            NodeKind::Resource,
            bus,
            0,
        );
        let registry = NodeRegistry::new([handle]);

        let runs = RunSwitch::new(PipelineRole::Root);
        let coordinator = RunCoordinator::new(
            store.clone(),
            runs.clone(),
            PipelineRole::Root,
            registry,
            triggers,
            vec!["data".to_string()],
            None,
        );
        (coordinator, store, runs)
    }

    #[tokio::test]
    async fn test_poke_fires_entry_trigger() {
        let (coordinator, store, runs) = fixture(vec![(
            "data".to_string(),
            TriggerCondition::NewEntries { threshold: 1 },
        )])
        .await;

        assert_eq!(coordinator.poke().await.unwrap(), None);

        store.create_entry("/data/a.txt").await.unwrap();
        let run_id = coordinator.poke().await.unwrap().unwrap();
        assert_eq!(runs.current().unwrap().run_id, run_id);
    }

    #[tokio::test]
    async fn test_poke_defers_while_run_active() {
        let (coordinator, store, _runs) = fixture(vec![(
            "data".to_string(),
            TriggerCondition::NewEntries { threshold: 1 },
        )])
        .await;

        store.create_entry("/data/a.txt").await.unwrap();
        let first = coordinator.poke().await.unwrap();
        assert!(first.is_some());

        // A second trigger-worthy entry must not start an overlapping run
        store.create_entry("/data/b.txt").await.unwrap();
        assert_eq!(coordinator.poke().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_metric_trigger_respects_threshold() {
        let (coordinator, store, _runs) = fixture(vec![(
            "metrics".to_string(),
            TriggerCondition::MetricThreshold {
                name: "loss".to_string(),
                threshold: 0.4,
            },
        )])
        .await;

        store.log_metric("loss", 0.1).await.unwrap();
        store.log_metric("loss", 0.2).await.unwrap();
        assert_eq!(coordinator.poke().await.unwrap(), None);

        store.log_metric("loss", 0.5).await.unwrap();
        assert!(coordinator.poke().await.unwrap().is_some());
    }
}
