//! Service Module
//!
//! Business logic layer for the pipeline process.
//! Services orchestrate between repositories and contain domain logic.

pub mod coordinator;
pub mod store;

pub use coordinator::{RunCoordinator, TriggerCondition};
pub use store::{MetadataStore, StoreError};
