//! Search-side types shared by the index and the hybrid coordinator.
//!
//! - `control`: cooperative cancellation and deadlines
//! - `hybrid`: vector ranking combined with row predicates and distance thresholds
//! - `metrics`: per-index search counters and latency

use serde::{Deserialize, Serialize};

pub mod control;
pub mod hybrid;
pub mod metrics;

/// A single nearest-neighbor hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VectorSearchResult {
    /// Row identifier the vector was inserted under.
    pub id: u64,
    /// Distance to the query under the index metric (lower is closer).
    pub distance: f32,
}
