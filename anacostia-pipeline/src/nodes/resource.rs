//! Filesystem resource node strategy
//!
//! A resource node fronts a watched directory. Its monitor task records
//! entries as files appear; the strategy's per-run work is to pin the
//! `current` artifact set for the run so downstream readers see a fixed
//! view for the run's duration.

use std::path::{Path, PathBuf};

use anacostia_core::domain::artifact::{ArtifactEntry, ArtifactState};
use anacostia_core::domain::node::NodeId;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::nodes::NodeStrategy;
use crate::service::store::MetadataStore;

pub struct FilesystemResourceStrategy {
    node: NodeId,
    store: MetadataStore,
    path: PathBuf,
    current: Mutex<Vec<ArtifactEntry>>,
}

impl FilesystemResourceStrategy {
    pub fn new(node: NodeId, store: MetadataStore, path: PathBuf) -> Self {
        Self {
            node,
            store,
            path,
            current: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The artifact set pinned for the run in progress
    pub async fn current_artifacts(&self) -> Vec<ArtifactEntry> {
        self.current.lock().await.clone()
    }
}

#[async_trait]
impl NodeStrategy for FilesystemResourceStrategy {
    async fn setup(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    async fn prepare(&self, run_id: i64) -> anyhow::Result<()> {
        let entries = self
            .store
            .list_entries(Some(ArtifactState::Current), Some(run_id))
            .await?;
        debug!(
            node = %self.node,
            run_id,
            count = entries.len(),
            "pinned current artifact set"
        );
        *self.current.lock().await = entries;
        Ok(())
    }

    async fn execute(&self, _run_id: i64) -> anyhow::Result<bool> {
        Ok(true)
    }

    async fn teardown(&self) -> anyhow::Result<()> {
        self.current.lock().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn test_prepare_pins_current_set_for_run() {
        let pool = db::create_pool("sqlite::memory:").await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        let store = MetadataStore::new(pool);

        store.create_entry("/data/a.txt").await.unwrap();
        store.create_entry("/data/b.txt").await.unwrap();
        let run_id = store.start_run().await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let strategy = FilesystemResourceStrategy::new(
            NodeId::new("root", "data"),
            store.clone(),
            dir.path().to_path_buf(),
        );

        strategy.prepare(run_id).await.unwrap();
        let pinned = strategy.current_artifacts().await;
        assert_eq!(pinned.len(), 2);
        assert!(pinned.iter().all(|e| e.run_id == Some(run_id)));

        // Entries recorded after the pin do not join the running set
        store.create_entry("/data/late.txt").await.unwrap();
        assert_eq!(strategy.current_artifacts().await.len(), 2);
    }
}
