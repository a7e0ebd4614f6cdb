//! Action node strategy
//!
//! Action nodes run a user-supplied callback against the metadata store.
//! The callback is opaque to the engine: it returns `Ok(true)` on success,
//! `Ok(false)` on a reported failure, and any error is treated as a failure
//! for the run.

use std::future::Future;
use std::sync::Arc;

use anacostia_client::ConnectorClient;
use anacostia_core::domain::node::NodeId;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::nodes::NodeStrategy;
use crate::service::store::MetadataStore;

/// Everything a user callback gets to work with
#[derive(Clone)]
pub struct ActionContext {
    pub node: NodeId,
    pub run_id: i64,
    /// The local pipeline's metadata store
    pub store: MetadataStore,
    /// Clients for each remote predecessor pipeline, for artifact and
    /// metadata RPC against the stores that own the inputs
    pub remote_stores: Vec<ConnectorClient>,
}

/// User-supplied body of an action node
#[async_trait]
pub trait Execute: Send + Sync {
    async fn execute(&self, ctx: ActionContext) -> anyhow::Result<bool>;
}

/// Adapter turning an async closure into an [`Execute`]
pub struct FnExecute<F>(F);

impl<F> FnExecute<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> Execute for FnExecute<F>
where
    F: Fn(ActionContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
{
    async fn execute(&self, ctx: ActionContext) -> anyhow::Result<bool> {
        (self.0)(ctx).await
    }
}

/// Strategy wrapping the user callback
pub struct ActionStrategy {
    node: NodeId,
    store: MetadataStore,
    remote_stores: Vec<ConnectorClient>,
    callback: Arc<dyn Execute>,
    prepared: Mutex<Option<ActionContext>>,
}

impl ActionStrategy {
    pub fn new(
        node: NodeId,
        store: MetadataStore,
        remote_stores: Vec<ConnectorClient>,
        callback: Arc<dyn Execute>,
    ) -> Self {
        Self {
            node,
            store,
            remote_stores,
            callback,
            prepared: Mutex::new(None),
        }
    }

    fn context(&self, run_id: i64) -> ActionContext {
        ActionContext {
            node: self.node.clone(),
            run_id,
            store: self.store.clone(),
            remote_stores: self.remote_stores.clone(),
        }
    }
}

#[async_trait]
impl NodeStrategy for ActionStrategy {
    async fn prepare(&self, run_id: i64) -> anyhow::Result<()> {
        *self.prepared.lock().await = Some(self.context(run_id));
        Ok(())
    }

    async fn execute(&self, run_id: i64) -> anyhow::Result<bool> {
        let ctx = self
            .prepared
            .lock()
            .await
            .take()
            .unwrap_or_else(|| self.context(run_id));
        self.callback.execute(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn test_callback_outcome_passes_through() {
        let pool = db::create_pool("sqlite::memory:").await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        let store = MetadataStore::new(pool);

        let strategy = ActionStrategy::new(
            NodeId::new("root", "train"),
            store,
            Vec::new(),
            Arc::new(FnExecute::new(|ctx: ActionContext| async move {
                Ok(ctx.run_id == 1)
            })),
        );

        strategy.prepare(1).await.unwrap();
        assert!(strategy.execute(1).await.unwrap());

        strategy.prepare(2).await.unwrap();
        assert!(!strategy.execute(2).await.unwrap());
    }
}
