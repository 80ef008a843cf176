//! Vector index construction and maintenance.
//!
//! - `config`: index parameters and DDL option parsing
//! - `hnsw`: the hierarchical proximity graph index

pub mod config;
pub mod hnsw;
