//! Configuration types for vector indexes.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VectraError};
use crate::vector::core::distance::DistanceMetric;

pub const DEFAULT_M: usize = 16;
pub const DEFAULT_EF_CONSTRUCTION: usize = 200;
pub const DEFAULT_EF_SEARCH: usize = 50;
pub const DEFAULT_OVERFETCH_FACTOR: usize = 4;

/// Kinds of vector index that can be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    /// Hierarchical proximity graph.
    #[default]
    Hnsw,
}

impl IndexType {
    pub fn name(&self) -> &'static str {
        match self {
            IndexType::Hnsw => "hnsw",
        }
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IndexType {
    type Err = VectraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "hnsw" => Ok(IndexType::Hnsw),
            other => Err(VectraError::invalid_config(format!(
                "Unsupported index type: {other}"
            ))),
        }
    }
}

/// Configuration for HNSW index construction and search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HnswIndexConfig {
    /// Vector dimension. Immutable once the index exists.
    pub dimension: usize,
    /// Maximum neighbors per node on layers above 0 (layer 0 allows `2 * m`).
    pub m: usize,
    /// Size of the candidate list during construction.
    pub ef_construction: usize,
    /// Default size of the candidate list during search.
    pub ef_search: usize,
    /// Distance metric to use.
    pub distance_metric: DistanceMetric,
    /// Upper bound on storage slots, tombstones included.
    #[serde(default)]
    pub max_elements: Option<usize>,
    /// Worker threads exploring layer 0 for a single query.
    #[serde(default = "default_search_threads")]
    pub search_threads: usize,
    #[serde(default)]
    pub index_type: IndexType,
    /// Seed for layer assignment; `None` draws from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Multiplier on `k` used by hybrid search to absorb filter attrition.
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,
}

fn default_search_threads() -> usize {
    1
}

fn default_overfetch_factor() -> usize {
    DEFAULT_OVERFETCH_FACTOR
}

impl Default for HnswIndexConfig {
    fn default() -> Self {
        Self {
            dimension: 128,
            m: DEFAULT_M,
            ef_construction: DEFAULT_EF_CONSTRUCTION,
            ef_search: DEFAULT_EF_SEARCH,
            distance_metric: DistanceMetric::Cosine,
            max_elements: None,
            search_threads: default_search_threads(),
            index_type: IndexType::Hnsw,
            seed: None,
            overfetch_factor: DEFAULT_OVERFETCH_FACTOR,
        }
    }
}

impl HnswIndexConfig {
    /// Create a new HNSW configuration with the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Default::default()
        }
    }

    /// Set the M parameter (connections per node).
    pub fn with_m(mut self, m: usize) -> Self {
        self.m = m;
        self
    }

    /// Set the ef_construction parameter.
    pub fn with_ef_construction(mut self, ef_construction: usize) -> Self {
        self.ef_construction = ef_construction;
        self
    }

    /// Set the default ef used by searches.
    pub fn with_ef_search(mut self, ef_search: usize) -> Self {
        self.ef_search = ef_search;
        self
    }

    /// Set the distance metric.
    pub fn with_distance_metric(mut self, metric: DistanceMetric) -> Self {
        self.distance_metric = metric;
        self
    }

    pub fn with_max_elements(mut self, max_elements: usize) -> Self {
        self.max_elements = Some(max_elements);
        self
    }

    pub fn with_search_threads(mut self, search_threads: usize) -> Self {
        self.search_threads = search_threads;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_overfetch_factor(mut self, factor: usize) -> Self {
        self.overfetch_factor = factor;
        self
    }

    /// Neighbor-list capacity at `layer`.
    pub fn max_neighbors(&self, layer: usize) -> usize {
        if layer == 0 { self.m * 2 } else { self.m }
    }

    /// Candidate list size used while linking; never below `m`.
    pub fn construction_ef(&self) -> usize {
        self.ef_construction.max(self.m)
    }

    /// `1 / ln(M)`, the decay of the layer distribution.
    pub fn level_multiplier(&self) -> f64 {
        1.0 / (self.m as f64).ln()
    }

    /// Validate the configuration parameters.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(VectraError::invalid_config("dimension must be > 0"));
        }
        if self.m < 2 {
            return Err(VectraError::invalid_config("m must be >= 2"));
        }
        if self.ef_construction == 0 {
            return Err(VectraError::invalid_config("ef_construction must be > 0"));
        }
        if self.ef_search == 0 {
            return Err(VectraError::invalid_config("ef must be > 0"));
        }
        if self.search_threads == 0 {
            return Err(VectraError::invalid_config("search_threads must be > 0"));
        }
        if self.overfetch_factor == 0 {
            return Err(VectraError::invalid_config("overfetch_factor must be > 0"));
        }
        if self.max_elements == Some(0) {
            return Err(VectraError::invalid_config("max_elements must be > 0"));
        }
        Ok(())
    }

    /// Build a configuration from the option map handed over by index DDL.
    ///
    /// `dimension` is required; every other key falls back to its default.
    pub fn from_options(options: &HashMap<String, String>) -> Result<Self> {
        let mut config = HnswIndexConfig::default();
        let mut saw_dimension = false;

        for (key, value) in options {
            match key.trim().to_lowercase().as_str() {
                "dimension" => {
                    config.dimension = parse_option(key, value)?;
                    saw_dimension = true;
                }
                "m" => config.m = parse_option(key, value)?,
                "ef_construction" => config.ef_construction = parse_option(key, value)?,
                "ef" | "ef_search" => config.ef_search = parse_option(key, value)?,
                "distance_metric" | "metric" => {
                    config.distance_metric = DistanceMetric::parse_str(value)?
                }
                "max_elements" => config.max_elements = Some(parse_option(key, value)?),
                "num_threads" | "search_threads" => {
                    config.search_threads = parse_option(key, value)?
                }
                "index_type" => config.index_type = value.parse()?,
                "seed" => config.seed = Some(parse_option(key, value)?),
                "overfetch_factor" => config.overfetch_factor = parse_option(key, value)?,
                other => {
                    return Err(VectraError::invalid_config(format!(
                        "Unknown index option: {other}"
                    )));
                }
            }
        }

        if !saw_dimension {
            return Err(VectraError::invalid_config("option 'dimension' is required"));
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_option<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| {
        VectraError::invalid_config(format!("Invalid value '{value}' for option '{key}': {e}"))
    })
}
