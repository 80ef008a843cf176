//! Core data structures for vector search.
//!
//! This module contains the vector value type and the distance metrics used
//! by the index, plus the scalar functions exposed to the query engine.

pub mod distance;
pub mod vector;
