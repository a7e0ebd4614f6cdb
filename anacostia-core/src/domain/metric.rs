//! Metric domain types

use serde::{Deserialize, Serialize};

/// A logged metric value
///
/// Metrics logged outside a run carry a null `run_id` and are promoted with
/// the new run id when a run starts. Threshold triggers evaluate only the
/// unpromoted values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub id: i64,
    pub name: String,
    pub value: f64,
    pub run_id: Option<i64>,
    pub logged_at: chrono::DateTime<chrono::Utc>,
}
