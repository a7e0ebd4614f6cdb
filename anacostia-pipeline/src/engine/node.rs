//! Node lifecycle engine
//!
//! One state machine drives every node kind; kind-specific behaviour lives
//! in the node's strategy object. Each node runs the loop in its own tokio
//! task:
//!
//! `INITIALIZING` → idle (`WAITING_RESOURCE` / `WAITING_METRICS` / `QUEUED`)
//! → per run: `QUEUED` → `PREPARATION` → `EXECUTING` → `CLEANUP` →
//! `COMPLETE`, with `SKIPPED` / `FAILURE` / `ERROR` terminals and a `PAUSED`
//! parking state at transition boundaries.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use anacostia_core::domain::node::{NodeId, NodeKind, NodeStatus};
use anacostia_core::domain::signal::{Signal, SignalKind};
use anacostia_core::dto::status::StatusUpdate;
use tokio::sync::{watch, Notify};
use tracing::{debug, error, warn};

use crate::connector::{LinkRegistry, RemoteEdge};
use crate::engine::inbox::{SignalInbox, WaitOutcome};
use crate::engine::runs::{ActiveRun, RunSwitch};
use crate::nodes::NodeStrategy;
use crate::service::coordinator::RunCoordinator;
use crate::service::store::MetadataStore;
use crate::status::StatusBus;

/// Shared, externally visible half of a node
///
/// The handle outlives the engine loop: the API layer delivers signals and
/// registers remote predecessors through it, and the pipeline drives
/// pause/resume.
pub struct NodeHandle {
    pub id: NodeId,
    pub kind: NodeKind,
    pub inbox: SignalInbox,
    status: Mutex<(NodeStatus, Option<i64>)>,
    bus: StatusBus,
    pause_tx: watch::Sender<bool>,
    remote_predecessors: Mutex<HashSet<String>>,
    expected_remote_predecessors: usize,
    registration: Notify,
}

impl NodeHandle {
    pub fn new(
        id: NodeId,
        kind: NodeKind,
        bus: StatusBus,
        expected_remote_predecessors: usize,
    ) -> Arc<Self> {
        let (pause_tx, _) = watch::channel(false);
        Arc::new(Self {
            id,
            kind,
            inbox: SignalInbox::new(),
            status: Mutex::new((NodeStatus::Initializing, None)),
            bus,
            pause_tx,
            remote_predecessors: Mutex::new(HashSet::new()),
            expected_remote_predecessors,
            registration: Notify::new(),
        })
    }

    /// Transition the node and publish the update on the status bus
    pub fn set_status(&self, status: NodeStatus, run_id: Option<i64>) {
        {
            let mut current = self.status.lock().unwrap();
            *current = (status, run_id);
        }
        debug!(node = %self.id, status = %status, ?run_id, "status transition");
        self.bus
            .publish(StatusUpdate::new(self.id.clone(), status, run_id));
    }

    pub fn status(&self) -> NodeStatus {
        self.status.lock().unwrap().0
    }

    pub fn current_status(&self) -> (NodeStatus, Option<i64>) {
        *self.status.lock().unwrap()
    }

    /// Record an inbound remote predecessor learned from a handshake
    pub fn register_remote_predecessor(&self, predecessor_id: &NodeId) {
        self.remote_predecessors
            .lock()
            .unwrap()
            .insert(predecessor_id.to_string());
        self.registration.notify_waiters();
    }

    pub fn remote_predecessor_ids(&self) -> Vec<String> {
        let set = self.remote_predecessors.lock().unwrap();
        let mut ids: Vec<String> = set.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Wait until every configured remote predecessor has handshaken in
    pub async fn await_remote_predecessors(&self) {
        loop {
            let notified = self.registration.notified();
            {
                let set = self.remote_predecessors.lock().unwrap();
                if set.len() >= self.expected_remote_predecessors {
                    return;
                }
            }
            notified.await;
        }
    }

    pub fn pause(&self) {
        self.pause_tx.send_replace(true);
    }

    pub fn resume(&self) {
        self.pause_tx.send_replace(false);
    }

    pub fn pause_rx(&self) -> watch::Receiver<bool> {
        self.pause_tx.subscribe()
    }
}

/// Lookup table of node handles, built once at launch
pub struct NodeRegistry {
    nodes: HashMap<String, Arc<NodeHandle>>,
}

impl NodeRegistry {
    pub fn new(handles: impl IntoIterator<Item = Arc<NodeHandle>>) -> Arc<Self> {
        let nodes = handles
            .into_iter()
            .map(|h| (h.id.node_name.clone(), h))
            .collect();
        Arc::new(Self { nodes })
    }

    pub fn get(&self, node_name: &str) -> Option<&Arc<NodeHandle>> {
        self.nodes.get(node_name)
    }

    pub fn handles(&self) -> impl Iterator<Item = &Arc<NodeHandle>> {
        self.nodes.values()
    }

    /// Clear every inbox at the end of a run
    pub fn clear_inboxes(&self, run_id: i64) {
        for handle in self.nodes.values() {
            handle.inbox.clear_run(run_id);
        }
    }
}

/// Everything an engine loop needs from its pipeline
#[derive(Clone)]
pub struct EngineContext {
    pub pipeline_id: String,
    pub store: MetadataStore,
    pub runs: RunSwitch,
    pub coordinator: Arc<RunCoordinator>,
    pub registry: Arc<NodeRegistry>,
    pub links: Arc<LinkRegistry>,
    pub shutdown: watch::Receiver<bool>,
}

/// The lifecycle state machine for one node
pub struct LifecycleEngine {
    handle: Arc<NodeHandle>,
    strategy: Arc<dyn NodeStrategy>,
    local_predecessors: Vec<String>,
    local_successors: Vec<String>,
    remote_successors: Vec<RemoteEdge>,
    wait_for_connection: bool,
    ctx: EngineContext,
}

impl LifecycleEngine {
    pub fn new(
        handle: Arc<NodeHandle>,
        strategy: Arc<dyn NodeStrategy>,
        local_predecessors: Vec<String>,
        local_successors: Vec<String>,
        remote_successors: Vec<RemoteEdge>,
        wait_for_connection: bool,
        ctx: EngineContext,
    ) -> Self {
        Self {
            handle,
            strategy,
            local_predecessors,
            local_successors,
            remote_successors,
            wait_for_connection,
            ctx,
        }
    }

    /// Drive the node until shutdown
    pub async fn run(self) {
        let mut shutdown = self.ctx.shutdown.clone();
        let handle = Arc::clone(&self.handle);

        handle.set_status(NodeStatus::Initializing, None);

        // INITIALIZING holds until the remote topology is live: every
        // configured remote predecessor registered, and (when asked to wait)
        // every remote successor handshaken.
        let init = async {
            handle.await_remote_predecessors().await;
            if self.wait_for_connection {
                let urls: Vec<String> = self
                    .remote_successors
                    .iter()
                    .map(|edge| edge.url.clone())
                    .collect();
                self.ctx.links.await_handshaken(&urls).await;
            }
        };
        tokio::select! {
            _ = init => {}
            _ = wait_shutdown(&mut shutdown) => return,
        }

        let mut last_run = 0i64;
        loop {
            handle.set_status(self.idle_status(), None);

            let active = tokio::select! {
                active = self.ctx.runs.next_run(last_run) => active,
                _ = wait_shutdown(&mut shutdown) => break,
            };
            last_run = active.run_id;

            self.execute_run(&active, &mut shutdown).await;
            self.ctx
                .coordinator
                .node_finished(active.run_id, &handle.id.node_name);

            if *shutdown.borrow() {
                break;
            }
        }

        if let Err(e) = self.strategy.teardown().await {
            warn!(node = %handle.id, "teardown failed: {e:#}");
        }
    }

    /// One full traversal of the per-run state machine
    async fn execute_run(&self, active: &ActiveRun, shutdown: &mut watch::Receiver<bool>) {
        let handle = &self.handle;
        let run_id = active.run_id;

        handle.inbox.begin_run(run_id);
        self.pause_gate().await;
        handle.set_status(NodeStatus::Queued, Some(run_id));

        let expected = self.expected_predecessors();
        let outcome = tokio::select! {
            outcome = handle.inbox.wait_for(run_id, &expected, active.deadline) => outcome,
            _ = self.ctx.runs.until_ended(run_id) => WaitOutcome::DeadlineElapsed,
            _ = wait_shutdown(shutdown) => {
                self.finish_skipped(run_id, false).await;
                return;
            }
        };

        match outcome {
            WaitOutcome::AllSuccess => {}
            WaitOutcome::NotSuccess => {
                // Skip propagation: tell successors now rather than letting
                // them wait out the deadline.
                self.finish_skipped(run_id, true).await;
                return;
            }
            WaitOutcome::DeadlineElapsed => {
                self.finish_skipped(run_id, false).await;
                return;
            }
        }

        // PREPARATION
        self.pause_gate().await;
        handle.set_status(NodeStatus::Preparation, Some(run_id));
        let succeeded = match self.strategy.prepare(run_id).await {
            Ok(()) => {
                // EXECUTING
                self.pause_gate().await;
                handle.set_status(NodeStatus::Executing, Some(run_id));
                self.record_event(run_id, NodeStatus::Executing).await;

                let result = tokio::select! {
                    result = self.strategy.execute(run_id) => Some(result),
                    // Run cancelled mid-execution: the callback future is
                    // dropped and its eventual result discarded.
                    _ = self.ctx.runs.until_ended(run_id) => None,
                    _ = wait_shutdown(shutdown) => None,
                };

                let Some(result) = result else {
                    self.finish_skipped(run_id, true).await;
                    return;
                };

                match result {
                    Ok(true) => true,
                    Ok(false) => {
                        warn!(node = %handle.id, run_id, "execution reported failure");
                        false
                    }
                    Err(e) => {
                        error!(node = %handle.id, run_id, "execution errored: {e:#}");
                        false
                    }
                }
            }
            Err(e) => {
                error!(node = %handle.id, run_id, "preparation failed: {e:#}");
                false
            }
        };

        // CLEANUP
        self.pause_gate().await;
        handle.set_status(NodeStatus::Cleanup, Some(run_id));
        self.record_event(run_id, NodeStatus::Cleanup).await;

        let kind = if succeeded {
            SignalKind::Success
        } else {
            SignalKind::Failure
        };
        let delivered = self.emit_signals(run_id, kind).await;

        let terminal = if !delivered {
            NodeStatus::Error
        } else if succeeded {
            NodeStatus::Complete
        } else {
            NodeStatus::Failure
        };
        handle.set_status(terminal, Some(run_id));
        self.record_event(run_id, terminal).await;
    }

    /// Terminal SKIPPED, optionally propagating skip signals downstream
    async fn finish_skipped(&self, run_id: i64, emit: bool) {
        if emit {
            let _ = self.emit_signals(run_id, SignalKind::Skip).await;
        }
        self.handle.set_status(NodeStatus::Skipped, Some(run_id));
        self.record_event(run_id, NodeStatus::Skipped).await;
    }

    /// Emit one outcome signal per successor
    ///
    /// Local successors are written directly into their inbox. Remote sends
    /// go through the connector client, which retries with backoff;
    /// exhausting the budget reports false and the caller turns the node
    /// ERROR.
    async fn emit_signals(&self, run_id: i64, kind: SignalKind) -> bool {
        for name in &self.local_successors {
            if let Some(successor) = self.ctx.registry.get(name) {
                let signal = Signal::new(self.handle.id.clone(), successor.id.clone(), run_id, kind);
                successor.inbox.deliver(signal);
            }
        }

        let mut all_delivered = true;
        for edge in &self.remote_successors {
            let to = match self.ctx.links.peer(&edge.url) {
                Some(peer) => NodeId::new(peer.receiver_id.pipeline_id.clone(), edge.node.clone()),
                None => NodeId::new("unknown", edge.node.clone()),
            };
            let signal = Signal::new(self.handle.id.clone(), to, run_id, kind);

            match self.ctx.links.client(&edge.url) {
                Some(client) => {
                    if let Err(e) = client.send_signal(&signal).await {
                        error!(
                            node = %self.handle.id,
                            peer = %edge.url,
                            run_id,
                            "signal delivery failed: {e}"
                        );
                        all_delivered = false;
                    }
                }
                None => all_delivered = false,
            }
        }
        all_delivered
    }

    /// Park in PAUSED while the pause switch is set
    async fn pause_gate(&self) {
        let mut rx = self.handle.pause_rx();
        if !*rx.borrow_and_update() {
            return;
        }

        let (previous, run_id) = self.handle.current_status();
        self.handle.set_status(NodeStatus::Paused, run_id);
        while *rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                break;
            }
        }
        self.handle.set_status(previous, run_id);
    }

    /// Inbox keys this node must see before leaving QUEUED
    fn expected_predecessors(&self) -> Vec<String> {
        let mut expected: Vec<String> = self
            .local_predecessors
            .iter()
            .map(|name| NodeId::new(self.ctx.pipeline_id.clone(), name.clone()).to_string())
            .collect();
        expected.extend(self.handle.remote_predecessor_ids());
        expected
    }

    async fn record_event(&self, run_id: i64, status: NodeStatus) {
        if let Err(e) = self
            .ctx
            .store
            .record_node_event(run_id, &self.handle.id.node_name, status)
            .await
        {
            // The store is the source of ordering truth; losing it is fatal
            // for the pipeline, but the node loop itself just surfaces it.
            error!(node = %self.handle.id, run_id, "failed to record node event: {e}");
        }
    }

    fn idle_status(&self) -> NodeStatus {
        match self.handle.kind {
            NodeKind::Resource => NodeStatus::WaitingResource,
            NodeKind::MetadataStore => NodeStatus::WaitingMetrics,
            NodeKind::Action => NodeStatus::Queued,
        }
    }
}

/// Resolve when the shutdown flag flips true (or the sender is gone)
pub(crate) async fn wait_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
