//! # Vectra
//!
//! Approximate nearest-neighbor search over dense vectors using a
//! Hierarchical Navigable Small World graph.
//!
//! ## Features
//!
//! - Cosine, Euclidean and Manhattan distance with SIMD kernels
//! - Concurrent searches alongside a single writer
//! - Lazy deletion with explicit rebuild
//! - Hybrid search combining a distance threshold and a row predicate
//! - Checksummed snapshots over pluggable storage

pub mod cli;
pub mod config;
pub mod error;
pub mod storage;
pub mod util;
pub mod vector;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
