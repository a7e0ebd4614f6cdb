//! Federated pipeline scenarios: remote successor chains, unreachable
//! peers, three-pipeline chains and the mixed local/remote triangle.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anacostia_client::RetryPolicy;
use anacostia_core::domain::node::NodeStatus;
use anacostia_pipeline::{
    ActionContext, Execute, FnExecute, MetadataStore, NodeDefinition, Pipeline, PipelineConfig,
    PipelineRole,
};

fn counting_action(counter: Arc<AtomicU32>) -> Arc<dyn Execute> {
    Arc::new(FnExecute::new(move |_ctx: ActionContext| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }))
}

/// Reserve a port for a pipeline that has to be addressable before launch
fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(200),
    }
}

async fn wait_for<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    loop {
        if check().await {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn wait_for_run_end(store: &MetadataStore, run_id: i64) {
    let store = store.clone();
    wait_for("run to end", move || {
        let store = store.clone();
        async move {
            matches!(
                store.get_run(run_id).await,
                Ok(run) if run.end_time.is_some()
            )
        }
    })
    .await;
}

#[tokio::test]
async fn two_pipeline_chain_completes_on_both_sides() {
    let root_port = free_port();
    let leaf_executions = Arc::new(AtomicU32::new(0));

    // Leaf first: the root needs its address
    let leaf = Pipeline::new(
        PipelineConfig::new("leaf", "127.0.0.1", 0)
            .with_role(PipelineRole::Leaf)
            .with_retry(fast_retry()),
        vec![
            NodeDefinition::metadata_store("leaf_store"),
            NodeDefinition::action(
                "evaluate",
                Vec::new(),
                counting_action(Arc::clone(&leaf_executions)),
            )
            .with_remote_predecessors(vec![format!("http://127.0.0.1:{root_port}/train")]),
        ],
    )
    .unwrap()
    .launch()
    .await
    .unwrap();

    let leaf_port = leaf.local_addr().port();
    let data_dir = tempfile::tempdir().unwrap();

    let root = Pipeline::new(
        PipelineConfig::new("root", "127.0.0.1", root_port).with_retry(fast_retry()),
        vec![
            NodeDefinition::metadata_store("store"),
            NodeDefinition::filesystem_resource("data", data_dir.path()),
            NodeDefinition::action(
                "train",
                vec!["data".to_string()],
                counting_action(Arc::new(AtomicU32::new(0))),
            )
            .with_remote_successors(vec![format!("http://127.0.0.1:{leaf_port}/evaluate")]),
        ],
    )
    .unwrap()
    .launch()
    .await
    .unwrap();

    tokio::fs::write(data_dir.path().join("a.txt"), b"hello")
        .await
        .unwrap();

    wait_for_run_end(root.store(), 1).await;
    wait_for_run_end(leaf.store(), 1).await;

    // The leaf action ran exactly once for run 1 (retried deliveries dedupe)
    assert_eq!(leaf_executions.load(Ordering::SeqCst), 1);
    let leaf_events = leaf.store().events_for_run(1).await.unwrap();
    assert!(leaf_events
        .iter()
        .any(|e| e.node_name == "evaluate" && e.status == NodeStatus::Complete));

    root.shutdown().await.unwrap();
    leaf.shutdown().await.unwrap();
}

#[tokio::test]
async fn unreachable_peer_marks_sender_error_but_run_ends() {
    // Nothing listens here
    let dead_port = free_port();
    let data_dir = tempfile::tempdir().unwrap();

    let root = Pipeline::new(
        PipelineConfig::new("root", "127.0.0.1", 0).with_retry(fast_retry()),
        vec![
            NodeDefinition::metadata_store("store"),
            NodeDefinition::filesystem_resource("data", data_dir.path()),
            NodeDefinition::action(
                "train",
                vec!["data".to_string()],
                counting_action(Arc::new(AtomicU32::new(0))),
            )
            .with_remote_successors(vec![format!("http://127.0.0.1:{dead_port}/evaluate")]),
        ],
    )
    .unwrap()
    .launch()
    .await
    .unwrap();

    tokio::fs::write(data_dir.path().join("a.txt"), b"hello")
        .await
        .unwrap();

    let store = root.store().clone();
    wait_for_run_end(&store, 1).await;

    // The emitting node exhausted its retry budget and reports ERROR; the
    // run still terminates and no second run begins.
    let events = store.events_for_run(1).await.unwrap();
    assert!(events
        .iter()
        .any(|e| e.node_name == "train" && e.status == NodeStatus::Error));

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(store.list_runs().await.unwrap().len(), 1);

    root.shutdown().await.unwrap();
}

#[tokio::test]
async fn three_pipeline_chain_executes_in_order() {
    let root_port = free_port();
    let leaf1_port = free_port();
    let final_executions = Arc::new(AtomicU32::new(0));

    let leaf2 = Pipeline::new(
        PipelineConfig::new("leaf2", "127.0.0.1", 0)
            .with_role(PipelineRole::Leaf)
            .with_retry(fast_retry()),
        vec![
            NodeDefinition::metadata_store("leaf2_store"),
            NodeDefinition::action(
                "final",
                Vec::new(),
                counting_action(Arc::clone(&final_executions)),
            )
            .with_remote_predecessors(vec![format!("http://127.0.0.1:{leaf1_port}/relay")]),
        ],
    )
    .unwrap()
    .launch()
    .await
    .unwrap();
    let leaf2_port = leaf2.local_addr().port();

    let leaf1 = Pipeline::new(
        PipelineConfig::new("leaf1", "127.0.0.1", leaf1_port)
            .with_role(PipelineRole::Leaf)
            .with_retry(fast_retry()),
        vec![
            NodeDefinition::metadata_store("leaf1_store"),
            NodeDefinition::action(
                "relay",
                Vec::new(),
                counting_action(Arc::new(AtomicU32::new(0))),
            )
            .with_remote_predecessors(vec![format!("http://127.0.0.1:{root_port}/train")])
            .with_remote_successors(vec![format!("http://127.0.0.1:{leaf2_port}/final")]),
        ],
    )
    .unwrap()
    .launch()
    .await
    .unwrap();

    let data_dir = tempfile::tempdir().unwrap();
    let root = Pipeline::new(
        PipelineConfig::new("root", "127.0.0.1", root_port).with_retry(fast_retry()),
        vec![
            NodeDefinition::metadata_store("store"),
            NodeDefinition::filesystem_resource("data", data_dir.path()),
            NodeDefinition::action(
                "train",
                vec!["data".to_string()],
                counting_action(Arc::new(AtomicU32::new(0))),
            )
            .with_remote_successors(vec![format!("http://127.0.0.1:{leaf1_port}/relay")]),
        ],
    )
    .unwrap()
    .launch()
    .await
    .unwrap();

    tokio::fs::write(data_dir.path().join("a.txt"), b"hello")
        .await
        .unwrap();

    wait_for_run_end(root.store(), 1).await;
    wait_for_run_end(leaf1.store(), 1).await;
    wait_for_run_end(leaf2.store(), 1).await;

    assert_eq!(final_executions.load(Ordering::SeqCst), 1);

    // Downstream execution never precedes upstream cleanup
    let root_events = root.store().events_for_run(1).await.unwrap();
    let leaf1_events = leaf1.store().events_for_run(1).await.unwrap();
    let leaf2_events = leaf2.store().events_for_run(1).await.unwrap();

    let train_cleanup = root_events
        .iter()
        .find(|e| e.node_name == "train" && e.status == NodeStatus::Cleanup)
        .unwrap();
    let relay_executing = leaf1_events
        .iter()
        .find(|e| e.node_name == "relay" && e.status == NodeStatus::Executing)
        .unwrap();
    let relay_cleanup = leaf1_events
        .iter()
        .find(|e| e.node_name == "relay" && e.status == NodeStatus::Cleanup)
        .unwrap();
    let final_executing = leaf2_events
        .iter()
        .find(|e| e.node_name == "final" && e.status == NodeStatus::Executing)
        .unwrap();

    assert!(relay_executing.created_at >= train_cleanup.created_at);
    assert!(final_executing.created_at >= relay_cleanup.created_at);

    root.shutdown().await.unwrap();
    leaf1.shutdown().await.unwrap();
    leaf2.shutdown().await.unwrap();
}

#[tokio::test]
async fn triangle_waits_for_local_and_remote_predecessors() {
    let root_port = free_port();
    let join_executions = Arc::new(AtomicU32::new(0));

    let leaf = Pipeline::new(
        PipelineConfig::new("leafb", "127.0.0.1", 0)
            .with_role(PipelineRole::Leaf)
            .with_retry(fast_retry()),
        vec![
            NodeDefinition::metadata_store("leaf_store"),
            NodeDefinition::action(
                "bridge",
                Vec::new(),
                counting_action(Arc::new(AtomicU32::new(0))),
            )
            .with_remote_predecessors(vec![format!("http://127.0.0.1:{root_port}/fan_out")])
            .with_remote_successors(vec![format!("http://127.0.0.1:{root_port}/join")]),
        ],
    )
    .unwrap()
    .launch()
    .await
    .unwrap();
    let leaf_port = leaf.local_addr().port();

    let data_dir = tempfile::tempdir().unwrap();
    let root = Pipeline::new(
        PipelineConfig::new("root", "127.0.0.1", root_port).with_retry(fast_retry()),
        vec![
            NodeDefinition::metadata_store("store"),
            NodeDefinition::filesystem_resource("data", data_dir.path()),
            NodeDefinition::action(
                "fan_out",
                vec!["data".to_string()],
                counting_action(Arc::new(AtomicU32::new(0))),
            )
            .with_remote_successors(vec![format!("http://127.0.0.1:{leaf_port}/bridge")]),
            NodeDefinition::action(
                "join",
                vec!["fan_out".to_string()],
                counting_action(Arc::clone(&join_executions)),
            )
            .with_remote_predecessors(vec![format!("http://127.0.0.1:{leaf_port}/bridge")]),
        ],
    )
    .unwrap()
    .launch()
    .await
    .unwrap();

    tokio::fs::write(data_dir.path().join("a.txt"), b"hello")
        .await
        .unwrap();

    wait_for_run_end(root.store(), 1).await;
    wait_for_run_end(leaf.store(), 1).await;

    assert_eq!(join_executions.load(Ordering::SeqCst), 1);

    // The join node executed only after both its local predecessor and the
    // leaf bridge finished cleanup
    let root_events = root.store().events_for_run(1).await.unwrap();
    let leaf_events = leaf.store().events_for_run(1).await.unwrap();

    let join_executing = root_events
        .iter()
        .find(|e| e.node_name == "join" && e.status == NodeStatus::Executing)
        .unwrap();
    let fan_out_cleanup = root_events
        .iter()
        .find(|e| e.node_name == "fan_out" && e.status == NodeStatus::Cleanup)
        .unwrap();
    let bridge_cleanup = leaf_events
        .iter()
        .find(|e| e.node_name == "bridge" && e.status == NodeStatus::Cleanup)
        .unwrap();

    assert!(join_executing.created_at >= fan_out_cleanup.created_at);
    assert!(join_executing.created_at >= bridge_cleanup.created_at);
    assert!(root_events
        .iter()
        .any(|e| e.node_name == "join" && e.status == NodeStatus::Complete));
    assert!(leaf_events
        .iter()
        .any(|e| e.node_name == "bridge" && e.status == NodeStatus::Complete));

    root.shutdown().await.unwrap();
    leaf.shutdown().await.unwrap();
}
