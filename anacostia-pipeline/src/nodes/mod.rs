//! Nodes Module
//!
//! Kind-specific behaviour, expressed as strategy objects driven by the one
//! lifecycle engine. A node is a kind tag plus a strategy; there is no
//! inheritance tree.

pub mod action;
pub mod metadata;
pub mod resource;

pub use action::{ActionContext, ActionStrategy, Execute, FnExecute};
pub use metadata::MetadataStoreStrategy;
pub use resource::FilesystemResourceStrategy;

use async_trait::async_trait;

/// The capability interface the lifecycle engine drives
///
/// `prepare` and `execute` are the two halves of a node's per-run step;
/// signal emission and status accounting stay in the engine.
#[async_trait]
pub trait NodeStrategy: Send + Sync {
    /// One-time work at pipeline setup
    async fn setup(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Type-specific pre-execute work for a run
    async fn prepare(&self, run_id: i64) -> anyhow::Result<()> {
        let _ = run_id;
        Ok(())
    }

    /// The type-specific body; `Ok(false)` is a reported failure
    async fn execute(&self, run_id: i64) -> anyhow::Result<bool>;

    /// One-time work at pipeline teardown
    async fn teardown(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
