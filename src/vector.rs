//! Approximate nearest-neighbor search over fixed-dimension vectors.
//!
//! # Module Structure
//!
//! - `core`: vector values, distance metrics and operators
//! - `index`: index configuration and the HNSW graph index
//! - `search`: cancellation control and hybrid (filtered) search
//! - `registry`: indexes keyed by the table column they cover

pub mod core;
pub mod index;
pub mod registry;
pub mod search;

pub use self::core::distance::{DistanceMetric, DistanceOperator, vector_distance, vector_norm};
pub use self::core::vector::Vector;
pub use self::index::config::HnswIndexConfig;
pub use self::index::hnsw::HnswIndex;
pub use self::search::VectorSearchResult;
