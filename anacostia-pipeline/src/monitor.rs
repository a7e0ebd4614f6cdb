//! Resource monitor
//!
//! Each resource node owns one of these: a task that watches the node's
//! directory (debounced notify events plus a periodic rescan), records
//! unseen files as artifact entries, and asks the coordinator to re-evaluate
//! trigger conditions. It runs independently of the node's lifecycle loop;
//! the two share only the metadata store.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anacostia_core::domain::artifact::ArtifactState;
use anacostia_core::domain::node::NodeId;
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::engine::node::wait_shutdown;
use crate::service::coordinator::RunCoordinator;
use crate::service::store::MetadataStore;

const DEBOUNCE_WINDOW: Duration = Duration::from_millis(200);

pub struct ResourceMonitor {
    node: NodeId,
    path: PathBuf,
    store: MetadataStore,
    coordinator: Arc<RunCoordinator>,
    /// State recorded for files already present at startup
    init_state: ArtifactState,
    poll_interval: Duration,
}

impl ResourceMonitor {
    pub fn new(
        node: NodeId,
        path: PathBuf,
        store: MetadataStore,
        coordinator: Arc<RunCoordinator>,
        init_state: ArtifactState,
        poll_interval: Duration,
    ) -> Self {
        Self {
            node,
            path,
            store,
            coordinator,
            init_state,
            poll_interval,
        }
    }

    /// Watch the directory until shutdown
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(node = %self.node, path = %self.path.display(), "monitor started");

        // Files present before launch are recorded with the configured
        // init_state rather than as new.
        if let Err(e) = self.scan(self.init_state).await {
            warn!(node = %self.node, "initial scan failed: {e}");
        }
        self.poke().await;

        // Debounced watcher; the notify thread feeds the async loop through
        // an unbounded channel. If the watcher cannot be set up we fall back
        // to the periodic rescan alone.
        let (tx, mut rx) = mpsc::unbounded_channel::<DebounceEventResult>();
        let _debouncer = match new_debouncer(DEBOUNCE_WINDOW, move |result: DebounceEventResult| {
            let _ = tx.send(result);
        }) {
            Ok(mut debouncer) => {
                if let Err(e) = debouncer
                    .watcher()
                    .watch(&self.path, RecursiveMode::Recursive)
                {
                    warn!(node = %self.node, "filesystem watch failed, polling only: {e}");
                }
                Some(debouncer)
            }
            Err(e) => {
                warn!(node = %self.node, "debouncer setup failed, polling only: {e}");
                None
            }
        };

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                Some(result) = rx.recv() => {
                    match result {
                        Ok(events) => {
                            let mut recorded = false;
                            for event in events {
                                recorded |= self.record_file(&event.path).await;
                            }
                            if recorded {
                                self.poke().await;
                            }
                        }
                        Err(e) => warn!(node = %self.node, "watch error: {e}"),
                    }
                }
                _ = interval.tick() => {
                    match self.scan(ArtifactState::New).await {
                        Ok(recorded) if recorded > 0 => {
                            debug!(node = %self.node, recorded, "rescan found files");
                        }
                        Ok(_) => {}
                        Err(e) => warn!(node = %self.node, "rescan failed: {e}"),
                    }
                    self.poke().await;
                }
                _ = wait_shutdown(&mut shutdown) => break,
            }
        }

        info!(node = %self.node, "monitor stopped");
    }

    /// Record every file under the directory; returns how many were unseen
    async fn scan(&self, state: ArtifactState) -> std::io::Result<usize> {
        let mut recorded = 0;
        for path in walk_files(&self.path).await? {
            if self.record(&path, state).await {
                recorded += 1;
            }
        }
        Ok(recorded)
    }

    /// Record a single reported path if it is a file we have not seen
    async fn record_file(&self, path: &Path) -> bool {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => self.record(path, ArtifactState::New).await,
            _ => false,
        }
    }

    async fn record(&self, path: &Path, state: ArtifactState) -> bool {
        // Stable identity is the canonical absolute path
        let location = match tokio::fs::canonicalize(path).await {
            Ok(canonical) => canonical.to_string_lossy().into_owned(),
            Err(_) => return false,
        };

        match self.store.entry_exists(&location).await {
            Ok(true) => false,
            Ok(false) => match self.store.create_entry_with_state(&location, state).await {
                Ok(_) => {
                    info!(node = %self.node, location = %location, "recorded artifact");
                    true
                }
                Err(e) => {
                    warn!(node = %self.node, location = %location, "failed to record: {e}");
                    false
                }
            },
            Err(e) => {
                warn!(node = %self.node, "entry_exists failed: {e}");
                false
            }
        }
    }

    async fn poke(&self) {
        if let Err(e) = self.coordinator.poke().await {
            warn!(node = %self.node, "trigger evaluation failed: {e}");
        }
    }
}

/// Collect every regular file under `root`, recursively
async fn walk_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                stack.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_walk_files_recurses() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir(dir.path().join("sub")).await.unwrap();
        tokio::fs::write(dir.path().join("a.txt"), b"a").await.unwrap();
        tokio::fs::write(dir.path().join("sub/b.txt"), b"b")
            .await
            .unwrap();

        let mut files = walk_files(dir.path()).await.unwrap();
        files.sort();
        assert_eq!(files.len(), 2);
        assert!(files[1].ends_with("sub/b.txt") || files[0].ends_with("sub/b.txt"));
    }
}
