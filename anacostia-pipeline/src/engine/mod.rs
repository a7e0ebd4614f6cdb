//! Engine Module
//!
//! The node lifecycle engine: one state machine drives every node kind, fed
//! by the run switch (run boundaries) and the per-node signal inbox
//! (predecessor completion).

pub mod inbox;
pub mod node;
pub mod runs;

pub use inbox::{SignalInbox, WaitOutcome};
pub use node::{EngineContext, LifecycleEngine, NodeHandle, NodeRegistry};
pub use runs::{ActiveRun, RunSwitch};
