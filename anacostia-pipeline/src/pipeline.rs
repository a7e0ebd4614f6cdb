//! Pipeline topology & launcher
//!
//! Assembly takes an unordered collection of node definitions, validates the
//! local graph (exactly one metadata store, resolvable predecessors, no
//! duplicate edges, acyclic), and produces a launchable pipeline. Launch
//! wires the store, engines, monitors, coordinator and HTTP server together;
//! teardown drains everything in reverse topological order.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anacostia_core::domain::artifact::ArtifactState;
use anacostia_core::domain::node::{NodeDescriptor, NodeId, NodeKind, NodeStatus};
use anacostia_core::domain::signal::{Signal, SignalKind};
use anacostia_core::dto::graph::{GraphEdge, GraphNode, GraphResponse};
use anacostia_core::dto::status::StatusUpdate;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::api::{self, AppState};
use crate::config::{PipelineConfig, PipelineRole};
use crate::connector::{InvalidRemoteEdge, LinkRegistry, RemoteEdge, RunIdSpace};
use crate::db;
use crate::engine::node::{wait_shutdown, EngineContext, LifecycleEngine, NodeHandle, NodeRegistry};
use crate::engine::runs::RunSwitch;
use crate::monitor::ResourceMonitor;
use crate::nodes::{
    ActionStrategy, Execute, FilesystemResourceStrategy, MetadataStoreStrategy, NodeStrategy,
};
use crate::service::coordinator::{RunCoordinator, TriggerCondition};
use crate::service::store::{MetadataStore, StoreError};
use crate::status::StatusBus;

/// Kind-specific construction data for a node
pub enum NodeBehavior {
    MetadataStore,
    FilesystemResource {
        path: PathBuf,
        init_state: ArtifactState,
        monitoring: bool,
    },
    Action {
        callback: Arc<dyn Execute>,
    },
}

impl NodeBehavior {
    fn kind(&self) -> NodeKind {
        match self {
            NodeBehavior::MetadataStore => NodeKind::MetadataStore,
            NodeBehavior::FilesystemResource { .. } => NodeKind::Resource,
            NodeBehavior::Action { .. } => NodeKind::Action,
        }
    }
}

/// One node in the pipeline definition
pub struct NodeDefinition {
    pub name: String,
    pub predecessors: Vec<String>,
    /// Remote predecessor URLs, `http://host:port/node_name`
    pub remote_predecessors: Vec<String>,
    /// Remote successor URLs, `http://host:port/node_name`
    pub remote_successors: Vec<String>,
    pub wait_for_connection: bool,
    /// Trigger condition; filesystem resources default to one new entry
    pub trigger: Option<TriggerCondition>,
    pub behavior: NodeBehavior,
}

impl NodeDefinition {
    pub fn metadata_store(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            predecessors: Vec::new(),
            remote_predecessors: Vec::new(),
            remote_successors: Vec::new(),
            wait_for_connection: false,
            trigger: None,
            behavior: NodeBehavior::MetadataStore,
        }
    }

    pub fn filesystem_resource(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            predecessors: Vec::new(),
            remote_predecessors: Vec::new(),
            remote_successors: Vec::new(),
            wait_for_connection: false,
            trigger: None,
            behavior: NodeBehavior::FilesystemResource {
                path: path.into(),
                init_state: ArtifactState::New,
                monitoring: true,
            },
        }
    }

    pub fn action(
        name: impl Into<String>,
        predecessors: Vec<String>,
        callback: Arc<dyn Execute>,
    ) -> Self {
        Self {
            name: name.into(),
            predecessors,
            remote_predecessors: Vec::new(),
            remote_successors: Vec::new(),
            wait_for_connection: false,
            trigger: None,
            behavior: NodeBehavior::Action { callback },
        }
    }

    pub fn with_trigger(mut self, trigger: TriggerCondition) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn with_remote_predecessors(mut self, urls: Vec<String>) -> Self {
        self.remote_predecessors = urls;
        self
    }

    pub fn with_remote_successors(mut self, urls: Vec<String>) -> Self {
        self.remote_successors = urls;
        self
    }

    pub fn with_wait_for_connection(mut self, wait: bool) -> Self {
        self.wait_for_connection = wait;
        self
    }

    pub fn with_init_state(mut self, state: ArtifactState) -> Self {
        if let NodeBehavior::FilesystemResource { init_state, .. } = &mut self.behavior {
            *init_state = state;
        }
        self
    }

    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        if let NodeBehavior::FilesystemResource { monitoring, .. } = &mut self.behavior {
            *monitoring = enabled;
        }
        self
    }
}

/// Setup errors; any of these refuses the launch
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("pipeline must contain at least one node")]
    Empty,

    #[error("duplicate node name '{0}'")]
    DuplicateNode(String),

    #[error("pipeline must contain exactly one metadata store node")]
    NoMetadataStore,

    #[error("there can only be one metadata store node (found '{0}' and '{1}')")]
    DuplicateMetadataStore(String, String),

    #[error("node '{node}' references unknown predecessor '{predecessor}'")]
    UnknownPredecessor { node: String, predecessor: String },

    #[error("duplicate edge from '{source_node}' to '{target}'")]
    DuplicateEdge { source_node: String, target: String },

    #[error("node dependencies do not form a directed acyclic graph (cycle involving '{0}')")]
    Cycle(String),

    #[error(transparent)]
    InvalidRemoteEdge(#[from] InvalidRemoteEdge),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A validated, not-yet-launched pipeline
pub struct Pipeline {
    config: PipelineConfig,
    definitions: Vec<NodeDefinition>,
    /// Node names in topological order of the local graph
    order: Vec<String>,
    graph: GraphResponse,
}

impl Pipeline {
    /// Validate the node set and local graph
    pub fn new(
        config: PipelineConfig,
        mut definitions: Vec<NodeDefinition>,
    ) -> Result<Self, PipelineError> {
        config
            .validate()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        if definitions.is_empty() {
            return Err(PipelineError::Empty);
        }

        // Unique names
        let mut names = HashSet::new();
        for def in &definitions {
            if !names.insert(def.name.clone()) {
                return Err(PipelineError::DuplicateNode(def.name.clone()));
            }
        }

        // Exactly one metadata store
        let mut store_name: Option<String> = None;
        for def in &definitions {
            if matches!(def.behavior, NodeBehavior::MetadataStore) {
                if let Some(existing) = &store_name {
                    return Err(PipelineError::DuplicateMetadataStore(
                        existing.clone(),
                        def.name.clone(),
                    ));
                }
                store_name = Some(def.name.clone());
            }
        }
        let store_name = store_name.ok_or(PipelineError::NoMetadataStore)?;

        // Resource nodes implicitly depend on the store: its success signal
        // is what releases them into each run.
        for def in &mut definitions {
            if matches!(def.behavior, NodeBehavior::FilesystemResource { .. })
                && !def.predecessors.contains(&store_name)
            {
                def.predecessors.insert(0, store_name.clone());
            }
        }

        // Predecessor references resolve, multigraph disallowed
        for def in &definitions {
            let mut seen = HashSet::new();
            for predecessor in &def.predecessors {
                if !names.contains(predecessor) {
                    return Err(PipelineError::UnknownPredecessor {
                        node: def.name.clone(),
                        predecessor: predecessor.clone(),
                    });
                }
                if !seen.insert(predecessor.clone()) {
                    return Err(PipelineError::DuplicateEdge {
                        source_node: predecessor.clone(),
                        target: def.name.clone(),
                    });
                }
            }
        }

        // Remote URLs must parse up front
        for def in &definitions {
            for url in def.remote_predecessors.iter().chain(&def.remote_successors) {
                RemoteEdge::parse(url)?;
            }
        }

        // Acyclicity via topological sort of the local edge graph.
        // Edge direction: predecessor -> node.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for def in &definitions {
            graph.add_node(def.name.as_str());
        }
        for def in &definitions {
            for predecessor in &def.predecessors {
                graph.add_edge(predecessor.as_str(), def.name.as_str(), ());
            }
        }

        let order = match toposort(&graph, None) {
            Ok(order) => order.into_iter().map(|name| name.to_string()).collect(),
            Err(cycle) => {
                return Err(PipelineError::Cycle(cycle.node_id().to_string()));
            }
        };

        let graph = build_graph_response(&definitions);

        Ok(Self {
            config,
            definitions,
            order,
            graph,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Node names in topological order
    pub fn topological_order(&self) -> &[String] {
        &self.order
    }

    pub fn graph(&self) -> &GraphResponse {
        &self.graph
    }

    /// Launch the pipeline: store, engines, monitors, coordinator, server
    pub async fn launch(self) -> Result<PipelineHandle, PipelineError> {
        let Pipeline {
            config,
            definitions,
            order,
            graph,
        } = self;

        let pipeline_id = config.name.clone();
        info!(pipeline = %pipeline_id, role = ?config.role, "launching pipeline");

        // Metadata store
        let pool = db::create_pool(&config.database_url)
            .await
            .map_err(StoreError::from)?;
        db::run_migrations(&pool).await.map_err(StoreError::from)?;
        let store = MetadataStore::new(pool);

        for def in &definitions {
            store
                .add_node(&NodeDescriptor {
                    name: def.name.clone(),
                    kind: def.behavior.kind(),
                    pipeline_id: pipeline_id.clone(),
                })
                .await?;
        }

        // Shared machinery
        let bus = StatusBus::new();
        let runs = RunSwitch::new(config.role);
        let space = match config.role {
            PipelineRole::Root => RunIdSpace::known(&pipeline_id),
            PipelineRole::Leaf => RunIdSpace::unknown(),
        };

        let handles: Vec<Arc<NodeHandle>> = definitions
            .iter()
            .map(|def| {
                NodeHandle::new(
                    NodeId::new(pipeline_id.clone(), def.name.clone()),
                    def.behavior.kind(),
                    bus.clone(),
                    def.remote_predecessors.len(),
                )
            })
            .collect();
        let registry = NodeRegistry::new(handles);

        // One client per distinct peer base URL, successors and predecessors
        let mut peer_urls = Vec::new();
        for def in &definitions {
            for url in def.remote_successors.iter().chain(&def.remote_predecessors) {
                peer_urls.push(RemoteEdge::parse(url)?.url);
            }
        }
        let links = Arc::new(LinkRegistry::new(peer_urls, config.retry.clone()));

        // Triggers: explicit, or the default one-new-entry rule for
        // filesystem resources
        let mut triggers = Vec::new();
        for def in &definitions {
            match (&def.trigger, &def.behavior) {
                (Some(trigger), _) => triggers.push((def.name.clone(), trigger.clone())),
                (None, NodeBehavior::FilesystemResource { .. }) => triggers.push((
                    def.name.clone(),
                    TriggerCondition::NewEntries { threshold: 1 },
                )),
                _ => {}
            }
        }

        let participants: Vec<String> = definitions.iter().map(|def| def.name.clone()).collect();
        let coordinator = RunCoordinator::new(
            store.clone(),
            runs.clone(),
            config.role,
            Arc::clone(&registry),
            triggers,
            participants,
            config.run_deadline,
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // HTTP server; bind first so ephemeral ports resolve before peers
        // are told about us
        let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
        let local_addr = listener.local_addr()?;
        let base_url = match &config.public_url {
            Some(url) => url.clone(),
            None => format!("http://{}:{}", config.host, local_addr.port()),
        };

        let resource_dirs: HashMap<String, PathBuf> = definitions
            .iter()
            .filter_map(|def| match &def.behavior {
                NodeBehavior::FilesystemResource { path, .. } => {
                    Some((def.name.clone(), path.clone()))
                }
                _ => None,
            })
            .collect();

        let state = AppState {
            pipeline_id: pipeline_id.clone(),
            base_url: base_url.clone(),
            registry: Arc::clone(&registry),
            store: store.clone(),
            runs: runs.clone(),
            bus: bus.clone(),
            coordinator: Arc::clone(&coordinator),
            graph: Arc::new(graph),
            resource_dirs: Arc::new(resource_dirs),
            space: Arc::clone(&space),
            run_deadline: config.run_deadline,
        };
        let router = api::create_router(state);
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!("HTTP server error: {e}");
            }
        });
        info!(pipeline = %pipeline_id, addr = %local_addr, "HTTP server bound");

        // Build strategies and set them up in topological order: the store
        // first, then resources, then actions.
        let mut strategies: HashMap<String, Arc<dyn NodeStrategy>> = HashMap::new();
        for def in &definitions {
            let id = NodeId::new(pipeline_id.clone(), def.name.clone());
            let strategy: Arc<dyn NodeStrategy> = match &def.behavior {
                NodeBehavior::MetadataStore => {
                    Arc::new(MetadataStoreStrategy::new(id, store.clone()))
                }
                NodeBehavior::FilesystemResource { path, .. } => Arc::new(
                    FilesystemResourceStrategy::new(id, store.clone(), path.clone()),
                ),
                NodeBehavior::Action { callback } => {
                    let mut remote_stores = Vec::new();
                    for url in &def.remote_predecessors {
                        let edge = RemoteEdge::parse(url)?;
                        if let Some(client) = links.client(&edge.url) {
                            remote_stores.push(client.clone());
                        }
                    }
                    Arc::new(ActionStrategy::new(
                        id,
                        store.clone(),
                        remote_stores,
                        Arc::clone(callback),
                    ))
                }
            };
            strategies.insert(def.name.clone(), strategy);
        }

        for name in &order {
            if let Some(strategy) = strategies.get(name) {
                info!(pipeline = %pipeline_id, node = %name, "setting up node");
                strategy
                    .setup()
                    .await
                    .map_err(|e| PipelineError::Config(format!("setup of '{name}' failed: {e:#}")))?;
            }
        }

        // Outbound handshakes. A leaf waits until it learns its run id
        // space from an inbound handshake before introducing itself
        // downstream, so the space propagates root-first along chains.
        let all_remote_successors: Vec<(NodeId, RemoteEdge)> = {
            let mut edges = Vec::new();
            for def in &definitions {
                for url in &def.remote_successors {
                    edges.push((
                        NodeId::new(pipeline_id.clone(), def.name.clone()),
                        RemoteEdge::parse(url)?,
                    ));
                }
            }
            edges
        };

        let handshake_task = {
            let links = Arc::clone(&links);
            let space = Arc::clone(&space);
            let pipeline_id = pipeline_id.clone();
            let edges = all_remote_successors.clone();
            let mut shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                let space_id = tokio::select! {
                    space_id = space.wait_known() => space_id,
                    _ = wait_shutdown(&mut shutdown) => return,
                };
                for (predecessor_id, edge) in edges {
                    let result = tokio::select! {
                        result = links.handshake(&edge, predecessor_id, &pipeline_id, &space_id) => result,
                        _ = wait_shutdown(&mut shutdown) => return,
                    };
                    if let Err(e) = result {
                        error!(peer = %edge.url, "handshake failed: {e}");
                    }
                }
            })
        };

        // Engine context shared by all node loops
        let ctx = EngineContext {
            pipeline_id: pipeline_id.clone(),
            store: store.clone(),
            runs: runs.clone(),
            coordinator: Arc::clone(&coordinator),
            registry: Arc::clone(&registry),
            links: Arc::clone(&links),
            shutdown: shutdown_rx.clone(),
        };

        // Local successor lists derive from the predecessor lists
        let mut successors: HashMap<String, Vec<String>> = HashMap::new();
        for def in &definitions {
            for predecessor in &def.predecessors {
                successors
                    .entry(predecessor.clone())
                    .or_default()
                    .push(def.name.clone());
            }
        }

        // Launch engines in topological order
        let mut engines = Vec::new();
        for name in &order {
            let def = definitions
                .iter()
                .find(|def| &def.name == name)
                .expect("topological order only contains defined nodes");
            let handle = registry
                .get(name)
                .expect("registry contains every defined node")
                .clone();
            let strategy = strategies
                .get(name)
                .expect("strategy built for every defined node")
                .clone();

            let mut remote_successors = Vec::new();
            for url in &def.remote_successors {
                remote_successors.push(RemoteEdge::parse(url)?);
            }

            let engine = LifecycleEngine::new(
                handle,
                strategy,
                def.predecessors.clone(),
                successors.get(name).cloned().unwrap_or_default(),
                remote_successors,
                def.wait_for_connection,
                ctx.clone(),
            );
            engines.push((name.clone(), tokio::spawn(engine.run())));
        }

        // Resource monitors
        let mut monitors = Vec::new();
        for def in &definitions {
            if let NodeBehavior::FilesystemResource {
                path,
                init_state,
                monitoring: true,
            } = &def.behavior
            {
                let monitor = ResourceMonitor::new(
                    NodeId::new(pipeline_id.clone(), def.name.clone()),
                    path.clone(),
                    store.clone(),
                    Arc::clone(&coordinator),
                    *init_state,
                    config.monitor_poll_interval,
                );
                monitors.push(tokio::spawn(monitor.run(shutdown_rx.clone())));
            }
        }

        // Run lifecycle loop and run_start forwarding
        let coordinator_task = tokio::spawn(Arc::clone(&coordinator).run(shutdown_rx.clone()));
        let forwarder_task = tokio::spawn(forward_run_starts(
            runs.clone(),
            Arc::clone(&links),
            all_remote_successors,
            shutdown_rx.clone(),
        ));

        // Metric triggers may already be satisfied at launch
        if let Err(e) = coordinator.poke().await {
            warn!("initial trigger evaluation failed: {e}");
        }

        info!(pipeline = %pipeline_id, "pipeline launched");

        Ok(PipelineHandle {
            pipeline_id,
            base_url,
            local_addr,
            store,
            registry,
            runs,
            bus,
            coordinator,
            shutdown_tx,
            engines,
            monitors,
            coordinator_task,
            forwarder_task,
            handshake_task,
            server,
        })
    }
}

/// A launched pipeline
pub struct PipelineHandle {
    pipeline_id: String,
    base_url: String,
    local_addr: SocketAddr,
    store: MetadataStore,
    registry: Arc<NodeRegistry>,
    runs: RunSwitch,
    bus: StatusBus,
    coordinator: Arc<RunCoordinator>,
    shutdown_tx: watch::Sender<bool>,
    engines: Vec<(String, JoinHandle<()>)>,
    monitors: Vec<JoinHandle<()>>,
    coordinator_task: JoinHandle<()>,
    forwarder_task: JoinHandle<()>,
    handshake_task: JoinHandle<()>,
    server: JoinHandle<()>,
}

impl PipelineHandle {
    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    /// Subscribe to the status fan-out
    pub fn status_stream(&self) -> broadcast::Receiver<StatusUpdate> {
        self.bus.subscribe()
    }

    /// Current status of a node, if it exists
    pub fn node_status(&self, name: &str) -> Option<NodeStatus> {
        self.registry.get(name).map(|handle| handle.status())
    }

    /// The run currently in progress, if any
    pub fn current_run(&self) -> Option<i64> {
        self.runs.current().map(|active| active.run_id)
    }

    pub fn pause_node(&self, name: &str) -> bool {
        match self.registry.get(name) {
            Some(handle) => {
                handle.pause();
                true
            }
            None => false,
        }
    }

    pub fn resume_node(&self, name: &str) -> bool {
        match self.registry.get(name) {
            Some(handle) => {
                handle.resume();
                true
            }
            None => false,
        }
    }

    /// Re-evaluate trigger conditions now
    pub async fn evaluate_triggers(&self) -> Result<Option<i64>, StoreError> {
        self.coordinator.poke().await
    }

    /// Stop monitors, cancel the current run, drain engines in reverse
    /// topological order and close the server
    pub async fn shutdown(mut self) -> Result<(), PipelineError> {
        info!(pipeline = %self.pipeline_id, "terminating pipeline");

        let _ = self.shutdown_tx.send(true);
        self.runs.end();

        for monitor in self.monitors.drain(..) {
            let _ = monitor.await;
        }

        // Successors drain first so no engine blocks on a signal that will
        // never arrive
        for (name, engine) in self.engines.drain(..).rev() {
            if engine.await.is_err() {
                warn!(node = %name, "engine task panicked during teardown");
            }
        }

        let _ = self.coordinator_task.await;
        let _ = self.forwarder_task.await;
        self.handshake_task.abort();
        self.server.abort();

        info!(pipeline = %self.pipeline_id, "pipeline terminated");
        Ok(())
    }
}

/// Send run_start to every connected peer when a run begins
///
/// Best effort: a peer that has not handshaken yet will pick the run up
/// from the first data signal instead.
async fn forward_run_starts(
    runs: RunSwitch,
    links: Arc<LinkRegistry>,
    edges: Vec<(NodeId, RemoteEdge)>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut last = 0i64;
    loop {
        let active = tokio::select! {
            active = runs.next_run(last) => active,
            _ = wait_shutdown(&mut shutdown) => return,
        };
        last = active.run_id;

        for (from, edge) in &edges {
            let Some(peer) = links.peer(&edge.url) else {
                continue;
            };
            let Some(client) = links.client(&edge.url) else {
                continue;
            };

            let to = NodeId::new(peer.receiver_id.pipeline_id.clone(), edge.node.clone());
            let signal = Signal::new(from.clone(), to, active.run_id, SignalKind::RunStart);
            if let Err(e) = client.send_signal(&signal).await {
                warn!(peer = %edge.url, run_id = active.run_id, "run_start forwarding failed: {e}");
            }
        }
    }
}

fn build_graph_response(definitions: &[NodeDefinition]) -> GraphResponse {
    let nodes = definitions
        .iter()
        .map(|def| GraphNode {
            id: def.name.clone(),
            label: def.name.clone(),
            endpoint: format!("/node/{}", def.name),
            status_endpoint: format!("/node/{}/status", def.name),
            base_type: def.behavior.kind().as_str().to_string(),
        })
        .collect();

    let edges = definitions
        .iter()
        .flat_map(|def| {
            def.predecessors.iter().map(|predecessor| GraphEdge {
                id: format!("{}->{}", predecessor, def.name),
                source: predecessor.clone(),
                target: def.name.clone(),
            })
        })
        .collect();

    GraphResponse { nodes, edges }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::FnExecute;

    fn noop_action(name: &str, predecessors: Vec<String>) -> NodeDefinition {
        NodeDefinition::action(
            name,
            predecessors,
            Arc::new(FnExecute::new(|_ctx| async move { Ok(true) })),
        )
    }

    fn config() -> PipelineConfig {
        PipelineConfig::new("root", "127.0.0.1", 0)
    }

    #[test]
    fn test_rejects_empty_pipeline() {
        assert!(matches!(
            Pipeline::new(config(), Vec::new()),
            Err(PipelineError::Empty)
        ));
    }

    #[test]
    fn test_rejects_missing_metadata_store() {
        let result = Pipeline::new(config(), vec![noop_action("train", Vec::new())]);
        assert!(matches!(result, Err(PipelineError::NoMetadataStore)));
    }

    #[test]
    fn test_rejects_duplicate_metadata_store() {
        let result = Pipeline::new(
            config(),
            vec![
                NodeDefinition::metadata_store("store_a"),
                NodeDefinition::metadata_store("store_b"),
            ],
        );
        assert!(matches!(
            result,
            Err(PipelineError::DuplicateMetadataStore(_, _))
        ));
    }

    #[test]
    fn test_rejects_unknown_predecessor() {
        let result = Pipeline::new(
            config(),
            vec![
                NodeDefinition::metadata_store("store"),
                noop_action("train", vec!["missing".to_string()]),
            ],
        );
        assert!(matches!(
            result,
            Err(PipelineError::UnknownPredecessor { .. })
        ));
    }

    #[test]
    fn test_rejects_duplicate_edge() {
        let result = Pipeline::new(
            config(),
            vec![
                NodeDefinition::metadata_store("store"),
                noop_action("train", vec!["store".to_string(), "store".to_string()]),
            ],
        );
        assert!(matches!(result, Err(PipelineError::DuplicateEdge { .. })));
    }

    #[test]
    fn test_rejects_cycle() {
        let result = Pipeline::new(
            config(),
            vec![
                NodeDefinition::metadata_store("store"),
                noop_action("a", vec!["b".to_string()]),
                noop_action("b", vec!["a".to_string()]),
            ],
        );
        assert!(matches!(result, Err(PipelineError::Cycle(_))));
    }

    #[test]
    fn test_resource_gets_store_predecessor() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            config(),
            vec![
                NodeDefinition::metadata_store("store"),
                NodeDefinition::filesystem_resource("data", dir.path()),
                noop_action("train", vec!["data".to_string()]),
            ],
        )
        .unwrap();

        let order = pipeline.topological_order();
        let store_pos = order.iter().position(|n| n == "store").unwrap();
        let data_pos = order.iter().position(|n| n == "data").unwrap();
        let train_pos = order.iter().position(|n| n == "train").unwrap();
        assert!(store_pos < data_pos);
        assert!(data_pos < train_pos);

        // The implicit store -> data edge shows up in the graph snapshot
        assert!(pipeline
            .graph()
            .edges
            .iter()
            .any(|e| e.source == "store" && e.target == "data"));
    }

    #[test]
    fn test_rejects_invalid_remote_url() {
        let result = Pipeline::new(
            config(),
            vec![
                NodeDefinition::metadata_store("store"),
                noop_action("train", Vec::new())
                    .with_remote_successors(vec!["not-a-url".to_string()]),
            ],
        );
        assert!(matches!(result, Err(PipelineError::InvalidRemoteEdge(_))));
    }
}
