//! HNSW (Hierarchical Navigable Small World) vector index implementation.
//!
//! [`HnswIndex`] is the shared handle callers hold. Reads (search, stats,
//! snapshot copies) run concurrently under the graph read lock; inserts,
//! deletes, rebuilds and restores are serialized by a single writer lock.
//! Inserts link a new node while readers keep searching: neighbor lists are
//! replaced under their own locks, so a search never observes a partially
//! written list.
//!
//! # Example
//!
//! ```
//! use vectra::vector::DistanceMetric;
//! use vectra::vector::index::config::HnswIndexConfig;
//! use vectra::vector::index::hnsw::HnswIndex;
//!
//! # fn main() -> vectra::error::Result<()> {
//! let config = HnswIndexConfig::new(3).with_distance_metric(DistanceMetric::Euclidean);
//! let index = HnswIndex::new(config)?;
//!
//! index.insert(1, &[0.0, 0.0, 0.0])?;
//! index.insert(2, &[1.0, 0.0, 0.0])?;
//! index.insert(3, &[5.0, 5.0, 5.0])?;
//!
//! let hits = index.search(&[0.0, 0.0, 0.0], 2, 10)?;
//! assert_eq!(hits[0].id, 1);
//! assert_eq!(hits[1].id, 2);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod graph;
pub mod searcher;
pub mod snapshot;


use std::fmt;
use std::time::Instant;

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VectraError};
use crate::storage::Storage;
use crate::vector::core::distance::DistanceMetric;
use crate::vector::core::vector::validate_input;
use crate::vector::index::config::HnswIndexConfig;
use crate::vector::search::VectorSearchResult;
use crate::vector::search::control::SearchControl;
use crate::vector::search::hybrid::{self, HybridSearchRequest, RowFilter};
use crate::vector::search::metrics::{SearchMetrics, SearchMetricsCollector};

use self::graph::{GraphStore, NodeRef};
use self::searcher::KnnParams;
use self::snapshot::GraphSnapshot;

/// Point-in-time figures about an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub live: usize,
    pub tombstoned: usize,
    pub slots: usize,
    pub dimension: usize,
    pub max_layer: usize,
    pub metric: DistanceMetric,
    /// Mean layer-0 neighbor count over live nodes.
    pub avg_degree_layer0: f64,
    pub memory_usage_bytes: usize,
    /// Searches served since the index was opened.
    pub search: SearchMetrics,
}

/// Outcome of [`HnswIndex::rebuild`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildStats {
    pub live: usize,
    pub reclaimed: usize,
}

/// Approximate nearest-neighbor index over fixed-dimension vectors.
pub struct HnswIndex {
    config: HnswIndexConfig,
    graph: RwLock<GraphStore>,
    /// Single-writer lock; also owns the level generator.
    writer: Mutex<StdRng>,
    /// Layer-0 workers, present when `search_threads > 1`.
    search_pool: Option<ThreadPool>,
    metrics: SearchMetricsCollector,
}

impl fmt::Debug for HnswIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let graph = self.graph.read();
        f.debug_struct("HnswIndex")
            .field("config", &self.config)
            .field("live", &graph.len())
            .field("slots", &graph.slot_count())
            .field("max_layer", &graph.max_layer())
            .finish()
    }
}

fn build_search_pool(threads: usize) -> Result<Option<ThreadPool>> {
    if threads <= 1 {
        return Ok(None);
    }
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("vectra-search-{i}"))
        .build()
        .map(Some)
        .map_err(|e| VectraError::invalid_config(format!("Failed to create thread pool: {e}")))
}

impl HnswIndex {
    /// Create an empty index. Fails with `InvalidConfiguration` on bad parameters.
    pub fn new(config: HnswIndexConfig) -> Result<Self> {
        config.validate()?;
        let store = GraphStore::new(config.dimension, config.m, config.max_elements);
        let index = Self::with_store(config, store)?;

        info!(
            "created HNSW index: dimension={}, m={}, ef_construction={}, metric={}",
            index.config.dimension,
            index.config.m,
            index.config.ef_construction,
            index.config.distance_metric
        );
        Ok(index)
    }

    /// Create an index with default parameters for `dimension`.
    pub fn with_dimension(dimension: usize) -> Result<Self> {
        Self::new(HnswIndexConfig::new(dimension))
    }

    fn with_store(config: HnswIndexConfig, store: GraphStore) -> Result<Self> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let search_pool = build_search_pool(config.search_threads)?;

        Ok(Self {
            config,
            graph: RwLock::new(store),
            writer: Mutex::new(rng),
            search_pool,
            metrics: SearchMetricsCollector::new(),
        })
    }

    pub fn config(&self) -> &HnswIndexConfig {
        &self.config
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    pub fn distance_metric(&self) -> DistanceMetric {
        self.config.distance_metric
    }

    /// Number of live vectors.
    pub fn len(&self) -> usize {
        self.graph.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.read().is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.graph.read().lookup(id).is_some()
    }

    /// Copy of the vector stored under a live `id`.
    pub fn get_vector(&self, id: u64) -> Option<Vec<f32>> {
        let graph = self.graph.read();
        graph.lookup(id).map(|node| graph.get_vector(node).to_vec())
    }

    /// Insert `vector` under `id`.
    ///
    /// Fails without effect on a wrong length (`DimensionMismatch`), a full
    /// index (`CapacityExceeded`), a live `id` (`DuplicateId`) or non-finite
    /// components (`InvalidVector`).
    pub fn insert(&self, id: u64, vector: &[f32]) -> Result<()> {
        let mut rng = self.writer.lock();
        self.insert_locked(&mut rng, id, vector)?;
        Ok(())
    }

    /// Insert under the next free id and return it.
    pub fn insert_auto(&self, vector: &[f32]) -> Result<u64> {
        let mut rng = self.writer.lock();
        let id = self.graph.read().next_id();
        self.insert_locked(&mut rng, id, vector)?;
        Ok(id)
    }

    fn insert_locked(&self, rng: &mut StdRng, id: u64, vector: &[f32]) -> Result<NodeRef> {
        let level = builder::draw_level(rng, self.config.level_multiplier());
        let node = self.graph.write().allocate_node(vector, id, level)?;

        let linked = {
            let graph = self.graph.read();
            builder::link_node(&graph, &self.config, node)
        };

        let mut graph = self.graph.write();
        if let Err(e) = linked {
            warn!("linking id {id} failed, rolling back: {e}");
            graph.tombstone(node)?;
            let graph = RwLockWriteGuard::downgrade(graph);
            builder::unlink_node(&graph, node);
            return Err(e);
        }
        let promoted = graph.promote_entry_point(node);
        drop(graph);

        debug!(
            "inserted id {id} at level {level}{}",
            if promoted { " as new entry point" } else { "" }
        );
        Ok(node)
    }

    /// Replace the vector stored under `id`.
    pub fn update(&self, id: u64, vector: &[f32]) -> Result<()> {
        let mut rng = self.writer.lock();
        validate_input(vector, self.config.dimension)?;

        let node = self
            .graph
            .read()
            .lookup(id)
            .ok_or(VectraError::UnknownId(id))?;

        // The replacement needs a fresh slot; refuse before touching the old one.
        if let Some(capacity) = self.config.max_elements
            && self.graph.read().slot_count() >= capacity
        {
            return Err(VectraError::CapacityExceeded { capacity });
        }

        self.delete_node(node)?;
        self.insert_locked(&mut rng, id, vector)?;
        debug!("updated id {id}");
        Ok(())
    }

    /// Delete `id`. Fails with `UnknownId` when absent or already deleted.
    pub fn delete(&self, id: u64) -> Result<()> {
        let _writer = self.writer.lock();
        let node = self
            .graph
            .read()
            .lookup(id)
            .ok_or(VectraError::UnknownId(id))?;

        self.delete_node(node)?;
        debug!("deleted id {id}");
        Ok(())
    }

    fn delete_node(&self, node: NodeRef) -> Result<()> {
        let mut graph = self.graph.write();
        graph.tombstone(node)?;
        let graph = RwLockWriteGuard::downgrade(graph);
        builder::unlink_node(&graph, node);
        Ok(())
    }

    /// k nearest live vectors to `query`, ascending by (distance, id).
    pub fn search(&self, query: &[f32], k: usize, ef: usize) -> Result<Vec<VectorSearchResult>> {
        self.search_with_control(query, k, ef, &SearchControl::none())
    }

    /// [`search`](Self::search) with the configured default ef.
    pub fn knn(&self, query: &[f32], k: usize) -> Result<Vec<VectorSearchResult>> {
        self.search(query, k, self.config.ef_search)
    }

    /// Search that stops with `Cancelled` once `control` says so.
    pub fn search_with_control(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
        control: &SearchControl,
    ) -> Result<Vec<VectorSearchResult>> {
        let start = Instant::now();
        let outcome = self.search_unrecorded(query, k, ef, control);
        self.metrics.record(start.elapsed(), &outcome);
        outcome
    }

    /// Search without touching the metrics; callers record the whole query.
    pub(crate) fn search_unrecorded(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
        control: &SearchControl,
    ) -> Result<Vec<VectorSearchResult>> {
        validate_input(query, self.config.dimension)?;

        let graph = self.graph.read();
        searcher::knn_search(
            &graph,
            self.config.distance_metric,
            query,
            &KnnParams {
                k,
                ef,
                search_threads: self.config.search_threads,
                pool: self.search_pool.as_ref(),
                control,
            },
        )
    }

    /// Run many queries in parallel, one result list per query in input order.
    pub fn batch_search(
        &self,
        queries: &[Vec<f32>],
        k: usize,
        ef: usize,
    ) -> Result<Vec<Vec<VectorSearchResult>>> {
        for query in queries {
            validate_input(query, self.config.dimension)?;
        }

        let control = SearchControl::none();
        let run = || {
            queries
                .par_iter()
                .map(|query| {
                    let start = Instant::now();
                    let graph = self.graph.read();
                    let outcome = searcher::knn_search(
                        &graph,
                        self.config.distance_metric,
                        query,
                        &KnnParams {
                            k,
                            ef,
                            search_threads: 1,
                            pool: None,
                            control: &control,
                        },
                    );
                    self.metrics.record(start.elapsed(), &outcome);
                    outcome
                })
                .collect::<Result<Vec<_>>>()
        };

        match &self.search_pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }

    /// Vector search filtered by distance threshold and row predicate.
    pub fn hybrid_search(
        &self,
        request: &HybridSearchRequest,
        filter: Option<&dyn RowFilter>,
    ) -> Result<Vec<VectorSearchResult>> {
        hybrid::execute(self, request, filter, &SearchControl::none())
    }

    pub fn hybrid_search_with_control(
        &self,
        request: &HybridSearchRequest,
        filter: Option<&dyn RowFilter>,
        control: &SearchControl,
    ) -> Result<Vec<VectorSearchResult>> {
        hybrid::execute(self, request, filter, control)
    }

    /// Consistent copy of the graph.
    ///
    /// Locks are held only while copying; encoding happens on the copy.
    pub fn snapshot(&self) -> GraphSnapshot {
        let _writer = self.writer.lock();
        let graph = self.graph.read();
        GraphSnapshot::capture(&self.config, &graph)
    }

    /// Snapshot into `storage` under `name`. Returns bytes written.
    pub fn write_snapshot(&self, storage: &dyn Storage, name: &str) -> Result<u64> {
        let snapshot = self.snapshot();
        snapshot::write_snapshot(storage, name, &snapshot)
    }

    /// Replace the graph with `snapshot`.
    ///
    /// The snapshot must match this index's dimension, metric and M. On any
    /// failure the current graph is left as it was.
    pub fn restore(&self, mut snapshot: GraphSnapshot) -> Result<()> {
        let theirs = &snapshot.config;
        if theirs.dimension != self.config.dimension {
            return Err(VectraError::dimension_mismatch(
                self.config.dimension,
                theirs.dimension,
            ));
        }
        if theirs.distance_metric != self.config.distance_metric || theirs.m != self.config.m {
            return Err(VectraError::invalid_config(format!(
                "snapshot built with metric={} m={}, index uses metric={} m={}",
                theirs.distance_metric, theirs.m, self.config.distance_metric, self.config.m
            )));
        }
        if let Some(capacity) = self.config.max_elements
            && snapshot.nodes.len() > capacity
        {
            return Err(VectraError::CapacityExceeded { capacity });
        }

        snapshot.config = self.config.clone();
        let store = snapshot.into_store()?;

        let _writer = self.writer.lock();
        let live = store.len();
        *self.graph.write() = store;
        info!("restored index from snapshot: {live} live nodes");
        Ok(())
    }

    /// Read `name` from `storage` and [`restore`](Self::restore) it.
    pub fn restore_from(&self, storage: &dyn Storage, name: &str) -> Result<()> {
        let snapshot = snapshot::read_snapshot(storage, name)?;
        self.restore(snapshot)
    }

    /// Build a new index from a snapshot, optionally overriding search threads.
    pub fn from_snapshot(snapshot: GraphSnapshot, search_threads: Option<usize>) -> Result<Self> {
        let mut config = snapshot.config.clone();
        if let Some(threads) = search_threads {
            config.search_threads = threads;
        }
        config.validate()?;

        let store = snapshot.into_store()?;
        let index = Self::with_store(config, store)?;
        info!(
            "loaded HNSW index from snapshot: {} live nodes",
            index.len()
        );
        Ok(index)
    }

    /// Open the snapshot stored under `name`.
    pub fn load(storage: &dyn Storage, name: &str, search_threads: Option<usize>) -> Result<Self> {
        let snapshot = snapshot::read_snapshot(storage, name)?;
        Self::from_snapshot(snapshot, search_threads)
    }

    /// Rebuild the graph from live nodes, reclaiming tombstoned slots.
    ///
    /// Searches keep running on the old graph until the new one is swapped in.
    pub fn rebuild(&self) -> Result<RebuildStats> {
        let mut rng = self.writer.lock();

        let (store, reclaimed) = {
            let graph = self.graph.read();
            let store = builder::rebuild_store(&graph, &self.config, &mut *rng)?;
            (store, graph.tombstone_count())
        };

        let live = store.len();
        *self.graph.write() = store;

        info!("rebuilt index: {live} live nodes, {reclaimed} slots reclaimed");
        Ok(RebuildStats { live, reclaimed })
    }

    /// Search counters and latency since the index was opened or last reset.
    pub fn search_metrics(&self) -> SearchMetrics {
        self.metrics.snapshot()
    }

    pub fn reset_search_metrics(&self) {
        self.metrics.reset();
    }

    pub(crate) fn metrics_collector(&self) -> &SearchMetricsCollector {
        &self.metrics
    }

    pub fn stats(&self) -> IndexStats {
        let graph = self.graph.read();

        let live_degree: usize = graph
            .nodes()
            .filter(|(_, node)| !node.is_deleted())
            .map(|(slot, _)| graph.with_neighbors(slot, 0, |ns| ns.len()))
            .sum();
        let avg_degree_layer0 = if graph.is_empty() {
            0.0
        } else {
            live_degree as f64 / graph.len() as f64
        };

        IndexStats {
            live: graph.len(),
            tombstoned: graph.tombstone_count(),
            slots: graph.slot_count(),
            dimension: self.config.dimension,
            max_layer: graph.max_layer(),
            metric: self.config.distance_metric,
            avg_degree_layer0,
            memory_usage_bytes: graph.memory_usage_bytes(),
            search: self.metrics.snapshot(),
        }
    }
}
