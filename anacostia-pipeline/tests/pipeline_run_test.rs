//! Single-pipeline end-to-end scenarios: filesystem trigger, metric
//! threshold trigger, failure/skip propagation and pause/resume.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anacostia_core::domain::artifact::ArtifactState;
use anacostia_core::domain::node::NodeStatus;
use anacostia_pipeline::{
    db, ActionContext, Execute, FnExecute, MetadataStore, NodeDefinition, Pipeline,
    PipelineConfig, TriggerCondition,
};
use tokio::sync::broadcast;

fn counting_action(counter: Arc<AtomicU32>) -> Arc<dyn Execute> {
    Arc::new(FnExecute::new(move |_ctx: ActionContext| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }))
}

fn failing_action() -> Arc<dyn Execute> {
    Arc::new(FnExecute::new(|_ctx: ActionContext| async move { Ok(false) }))
}

async fn wait_for<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
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
async fn filesystem_trigger_runs_pipeline_once() {
    let data_dir = tempfile::tempdir().unwrap();
    let executions = Arc::new(AtomicU32::new(0));

    let pipeline = Pipeline::new(
        PipelineConfig::new("root", "127.0.0.1", 0),
        vec![
            NodeDefinition::metadata_store("store"),
            NodeDefinition::filesystem_resource("data", data_dir.path()),
            NodeDefinition::action(
                "train",
                vec!["data".to_string()],
                counting_action(Arc::clone(&executions)),
            ),
        ],
    )
    .unwrap();

    let handle = pipeline.launch().await.unwrap();
    let mut statuses = handle.status_stream();

    tokio::fs::write(data_dir.path().join("a.txt"), b"hello")
        .await
        .unwrap();

    let store = handle.store().clone();
    wait_for_run_end(&store, 1).await;

    assert_eq!(executions.load(Ordering::SeqCst), 1);

    // The artifact was consumed by run 1 and demoted when it ended
    let old = store
        .list_entries(Some(ArtifactState::Old), Some(1))
        .await
        .unwrap();
    assert_eq!(old.len(), 1);
    assert!(old[0].location.ends_with("a.txt"));
    assert_eq!(old[0].run_id, Some(1));

    // The action's status stream shows EXECUTING before COMPLETE
    let mut seen = Vec::new();
    loop {
        match statuses.try_recv() {
            Ok(update) if update.node_id.node_name == "train" => seen.push(update.status),
            Ok(_) => {}
            Err(broadcast::error::TryRecvError::Lagged(_)) => {}
            Err(_) => break,
        }
    }
    let executing = seen
        .iter()
        .position(|s| *s == NodeStatus::Executing)
        .expect("train never reached EXECUTING");
    let complete = seen
        .iter()
        .position(|s| *s == NodeStatus::Complete)
        .expect("train never reached COMPLETE");
    assert!(executing < complete);

    // Topological ordering: the action executes only after its predecessor
    // finished cleanup
    let events = store.events_for_run(1).await.unwrap();
    let train_executing = events
        .iter()
        .find(|e| e.node_name == "train" && e.status == NodeStatus::Executing)
        .unwrap();
    let data_cleanup = events
        .iter()
        .find(|e| e.node_name == "data" && e.status == NodeStatus::Cleanup)
        .unwrap();
    assert!(train_executing.created_at >= data_cleanup.created_at);

    // One file, one run; nothing further triggers
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(store.list_runs().await.unwrap().len(), 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn metric_threshold_triggers_run_at_launch() {
    let dir = tempfile::tempdir().unwrap();
    let database_url = format!("sqlite://{}", dir.path().join("meta.db").display());

    // Metrics logged before the pipeline starts stay unassigned
    {
        let pool = db::create_pool(&database_url).await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        let store = MetadataStore::new(pool);
        store.log_metric("x", 0.1).await.unwrap();
        store.log_metric("x", 0.2).await.unwrap();
        store.log_metric("x", 0.5).await.unwrap();
    }

    let executions = Arc::new(AtomicU32::new(0));
    let pipeline = Pipeline::new(
        PipelineConfig::new("root", "127.0.0.1", 0).with_database_url(database_url.clone()),
        vec![
            NodeDefinition::metadata_store("store").with_trigger(
                TriggerCondition::MetricThreshold {
                    name: "x".to_string(),
                    threshold: 0.4,
                },
            ),
            NodeDefinition::action(
                "react",
                vec!["store".to_string()],
                counting_action(Arc::clone(&executions)),
            ),
        ],
    )
    .unwrap();

    let handle = pipeline.launch().await.unwrap();
    let store = handle.store().clone();

    wait_for_run_end(&store, 1).await;

    assert_eq!(executions.load(Ordering::SeqCst), 1);
    assert_eq!(store.list_runs().await.unwrap().len(), 1);

    // Pre-run metrics were promoted with the run id
    assert!(store.get_metrics("x", None).await.unwrap().is_empty());
    assert_eq!(
        store.get_metrics("x", Some(1)).await.unwrap(),
        vec![0.1, 0.2, 0.5]
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn failure_skips_downstream_and_run_still_ends() {
    let data_dir = tempfile::tempdir().unwrap();
    let report_executions = Arc::new(AtomicU32::new(0));

    let pipeline = Pipeline::new(
        PipelineConfig::new("root", "127.0.0.1", 0),
        vec![
            NodeDefinition::metadata_store("store"),
            NodeDefinition::filesystem_resource("data", data_dir.path()),
            NodeDefinition::action("flaky", vec!["data".to_string()], failing_action()),
            NodeDefinition::action(
                "report",
                vec!["flaky".to_string()],
                counting_action(Arc::clone(&report_executions)),
            ),
        ],
    )
    .unwrap();

    let handle = pipeline.launch().await.unwrap();
    tokio::fs::write(data_dir.path().join("a.txt"), b"hello")
        .await
        .unwrap();

    let store = handle.store().clone();
    wait_for_run_end(&store, 1).await;

    // Failure terminates the failing node; its successor is skipped and
    // never executes, yet the run reaches end_time.
    assert_eq!(report_executions.load(Ordering::SeqCst), 0);

    let events = store.events_for_run(1).await.unwrap();
    assert!(events
        .iter()
        .any(|e| e.node_name == "flaky" && e.status == NodeStatus::Failure));
    assert!(events
        .iter()
        .any(|e| e.node_name == "report" && e.status == NodeStatus::Skipped));
    assert!(!events
        .iter()
        .any(|e| e.node_name == "report" && e.status == NodeStatus::Executing));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn paused_node_stalls_run_until_resumed() {
    let data_dir = tempfile::tempdir().unwrap();
    let executions = Arc::new(AtomicU32::new(0));

    let pipeline = Pipeline::new(
        PipelineConfig::new("root", "127.0.0.1", 0),
        vec![
            NodeDefinition::metadata_store("store"),
            NodeDefinition::filesystem_resource("data", data_dir.path()),
            NodeDefinition::action(
                "train",
                vec!["data".to_string()],
                counting_action(Arc::clone(&executions)),
            ),
        ],
    )
    .unwrap();

    let handle = pipeline.launch().await.unwrap();
    assert!(handle.pause_node("data"));

    tokio::fs::write(data_dir.path().join("a.txt"), b"hello")
        .await
        .unwrap();

    let store = handle.store().clone();

    // The run starts (the trigger fires regardless) but the paused resource
    // holds it open and the action never runs
    wait_for("run to start", || {
        let store = store.clone();
        async move { matches!(store.active_run().await, Ok(Some(_))) }
    })
    .await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(executions.load(Ordering::SeqCst), 0);
    assert!(store.active_run().await.unwrap().is_some());

    assert!(handle.resume_node("data"));
    wait_for_run_end(&store, 1).await;
    assert_eq!(executions.load(Ordering::SeqCst), 1);

    handle.shutdown().await.unwrap();
}
