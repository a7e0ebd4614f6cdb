//! Metadata store node strategy
//!
//! The store node has no predecessors, so it is the first node to clear
//! QUEUED each run; its success signal is what releases the resource nodes.
//! The run row itself is created by the coordinator's `start_run` (or the
//! leaf mirror); the strategy's body verifies the row is persisted.

use anacostia_core::domain::node::NodeId;
use async_trait::async_trait;

use crate::nodes::NodeStrategy;
use crate::service::store::MetadataStore;

pub struct MetadataStoreStrategy {
    node: NodeId,
    store: MetadataStore,
}

impl MetadataStoreStrategy {
    pub fn new(node: NodeId, store: MetadataStore) -> Self {
        Self { node, store }
    }
}

#[async_trait]
impl NodeStrategy for MetadataStoreStrategy {
    async fn execute(&self, run_id: i64) -> anyhow::Result<bool> {
        let run = self.store.get_run(run_id).await?;
        tracing::debug!(node = %self.node, run_id = run.run_id, "run row persisted");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn test_execute_fails_without_run_row() {
        let pool = db::create_pool("sqlite::memory:").await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        let store = MetadataStore::new(pool);

        let strategy = MetadataStoreStrategy::new(NodeId::new("root", "store"), store.clone());
        assert!(strategy.execute(42).await.is_err());

        let run_id = store.start_run().await.unwrap();
        assert!(strategy.execute(run_id).await.unwrap());
    }
}
