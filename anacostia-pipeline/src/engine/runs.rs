//! Run switch
//!
//! The in-process broadcast of run boundaries. On a root pipeline the
//! coordinator flips the switch when a trigger starts a run; on a leaf the
//! switch advances when connector traffic carries a higher run id. Engines
//! wait on the switch to enter QUEUED and watch it for cancellation.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::PipelineRole;

/// The run currently in progress
#[derive(Debug, Clone)]
pub struct ActiveRun {
    pub run_id: i64,
    pub deadline: Option<Instant>,
}

/// Shared run-boundary switch
///
/// Cheap to clone; all clones share the sender.
#[derive(Debug, Clone)]
pub struct RunSwitch {
    tx: Arc<watch::Sender<Option<ActiveRun>>>,
    role: PipelineRole,
    // highest run id ever begun; observe() never moves backwards
    last: Arc<Mutex<i64>>,
}

impl RunSwitch {
    pub fn new(role: PipelineRole) -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            role,
            last: Arc::new(Mutex::new(0)),
        }
    }

    pub fn role(&self) -> PipelineRole {
        self.role
    }

    /// Begin a run (root coordinator only)
    pub fn begin(&self, run_id: i64, deadline: Option<Instant>) {
        {
            let mut last = self.last.lock().unwrap();
            *last = (*last).max(run_id);
        }
        self.tx.send_replace(Some(ActiveRun { run_id, deadline }));
    }

    /// End or cancel the current run
    pub fn end(&self) {
        self.tx.send_replace(None);
    }

    /// Whether observing this run id would advance the switch
    ///
    /// Lets the signal handler mirror the run row into the local store
    /// before any engine can see the new run.
    pub fn would_advance(&self, run_id: i64) -> bool {
        self.role == PipelineRole::Leaf && run_id > *self.last.lock().unwrap()
    }

    /// Observe a run id seen on inbound connector traffic
    ///
    /// Leaf pipelines adopt the highest id seen as the current run. On a
    /// root pipeline this is a no-op: only the coordinator begins runs.
    /// Returns true when the switch advanced.
    pub fn observe(&self, run_id: i64, deadline: Option<Instant>) -> bool {
        if self.role != PipelineRole::Leaf {
            return false;
        }

        let mut last = self.last.lock().unwrap();
        if run_id <= *last {
            return false;
        }
        *last = run_id;
        self.tx.send_replace(Some(ActiveRun { run_id, deadline }));
        true
    }

    /// The run currently in progress, if any
    pub fn current(&self) -> Option<ActiveRun> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ActiveRun>> {
        self.tx.subscribe()
    }

    /// Wait until a run newer than `after` begins
    pub async fn next_run(&self, after: i64) -> ActiveRun {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(active) = rx.borrow_and_update().clone() {
                if active.run_id > after {
                    return active;
                }
            }
            if rx.changed().await.is_err() {
                // Sender gone: the pipeline is tearing down. Park; the
                // caller's shutdown branch wins the select.
                std::future::pending::<()>().await;
            }
        }
    }

    /// Wait until the given run is no longer current
    pub async fn until_ended(&self, run_id: i64) {
        let mut rx = self.tx.subscribe();
        loop {
            match rx.borrow_and_update().as_ref() {
                Some(active) if active.run_id == run_id => {}
                _ => return,
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Whether the given run has been ended or superseded
    pub fn is_ended(&self, run_id: i64) -> bool {
        match self.tx.borrow().as_ref() {
            Some(active) => active.run_id != run_id,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_begin_and_next_run() {
        let switch = RunSwitch::new(PipelineRole::Root);
        switch.begin(1, None);
        let active = switch.next_run(0).await;
        assert_eq!(active.run_id, 1);
    }

    #[tokio::test]
    async fn test_observe_only_advances_on_leaf() {
        let root = RunSwitch::new(PipelineRole::Root);
        assert!(!root.observe(1, None));
        assert!(root.current().is_none());

        let leaf = RunSwitch::new(PipelineRole::Leaf);
        assert!(leaf.observe(1, None));
        assert!(!leaf.observe(1, None));
        assert!(leaf.observe(2, None));
        assert_eq!(leaf.current().unwrap().run_id, 2);
    }

    #[tokio::test]
    async fn test_until_ended_returns_after_end() {
        let switch = RunSwitch::new(PipelineRole::Root);
        switch.begin(1, None);

        let waiter = {
            let switch = switch.clone();
            tokio::spawn(async move { switch.until_ended(1).await })
        };
        switch.end();
        waiter.await.unwrap();
        assert!(switch.is_ended(1));
    }
}
