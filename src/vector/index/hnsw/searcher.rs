//! Graph traversal for HNSW: greedy descent, layer beam search, and k-NN.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use bit_vec::BitVec;
use log::debug;
use rayon::ThreadPool;
use rayon::prelude::*;

use crate::error::Result;
use crate::vector::core::distance::DistanceMetric;
use crate::vector::index::hnsw::graph::{GraphStore, NodeRef};
use crate::vector::search::VectorSearchResult;
use crate::vector::search::control::SearchControl;

/// Priority queue entry for HNSW search.
///
/// Ordered by distance, then by caller id, then by slot, so every traversal
/// and every result list has one deterministic order.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate {
    pub distance: f32,
    pub id: u64,
    pub node: NodeRef,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
            .then_with(|| self.node.cmp(&other.node))
    }
}

impl From<Candidate> for VectorSearchResult {
    fn from(candidate: Candidate) -> Self {
        VectorSearchResult {
            id: candidate.id,
            distance: candidate.distance,
        }
    }
}

/// Slots already reached during one traversal.
#[derive(Debug)]
pub(crate) struct VisitedSet {
    bits: BitVec,
}

impl VisitedSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            bits: BitVec::from_elem(capacity, false),
        }
    }

    pub fn clear(&mut self) {
        self.bits.clear();
    }

    /// Returns `true` if `node` had not been visited yet.
    #[inline]
    pub fn insert(&mut self, node: NodeRef) -> bool {
        let idx = node as usize;
        if idx >= self.bits.len() {
            self.bits.grow(idx + 1 - self.bits.len(), false);
        }
        if self.bits[idx] {
            false
        } else {
            self.bits.set(idx, true);
            true
        }
    }
}

/// One query's view of the graph.
pub(crate) struct LayerSearch<'a> {
    graph: &'a GraphStore,
    metric: DistanceMetric,
    query: &'a [f32],
    control: &'a SearchControl,
}

impl<'a> LayerSearch<'a> {
    pub fn new(
        graph: &'a GraphStore,
        metric: DistanceMetric,
        query: &'a [f32],
        control: &'a SearchControl,
    ) -> Self {
        Self {
            graph,
            metric,
            query,
            control,
        }
    }

    #[inline]
    pub fn candidate(&self, node: NodeRef) -> Candidate {
        Candidate {
            distance: self.metric.compute(self.query, self.graph.get_vector(node)),
            id: self.graph.node(node).id(),
            node,
        }
    }

    /// Nodes that may appear in results: live, and not the excluded slot.
    #[inline]
    fn eligible(&self, node: NodeRef, exclude: Option<NodeRef>) -> bool {
        exclude != Some(node) && self.graph.is_live(node)
    }

    /// Follow strictly-closer neighbors at `layer` until none is closer.
    pub fn greedy_closest(&self, entry: Candidate, layer: usize) -> Result<Candidate> {
        let mut best = entry;
        let mut scratch = Vec::new();

        loop {
            self.control.check()?;

            scratch.clear();
            self.graph
                .with_neighbors(best.node, layer, |ns| scratch.extend_from_slice(ns));

            let mut improved = false;
            for &neighbor in &scratch {
                let candidate = self.candidate(neighbor);
                if candidate < best {
                    best = candidate;
                    improved = true;
                }
            }

            if !improved {
                return Ok(best);
            }
        }
    }

    /// Beam search at one layer, returning up to `ef` eligible nodes in
    /// ascending order.
    ///
    /// Tombstoned nodes are traversed for connectivity but never returned.
    pub fn search_layer(
        &self,
        entry_points: &[Candidate],
        ef: usize,
        layer: usize,
        exclude: Option<NodeRef>,
        visited: &mut VisitedSet,
    ) -> Result<Vec<Candidate>> {
        let mut candidates: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        let mut results: BinaryHeap<Candidate> = BinaryHeap::with_capacity(ef + 1);

        for &entry in entry_points {
            if !visited.insert(entry.node) {
                continue;
            }
            candidates.push(Reverse(entry));
            if self.eligible(entry.node, exclude) {
                results.push(entry);
                if results.len() > ef {
                    results.pop();
                }
            }
        }

        let mut scratch = Vec::new();
        while let Some(Reverse(current)) = candidates.pop() {
            self.control.check()?;

            if results.len() >= ef && results.peek().is_some_and(|worst| current > *worst) {
                break;
            }

            // Copy out so the list lock is not held across distance work.
            scratch.clear();
            self.graph
                .with_neighbors(current.node, layer, |ns| scratch.extend_from_slice(ns));

            for &neighbor in &scratch {
                if !visited.insert(neighbor) {
                    continue;
                }

                let candidate = self.candidate(neighbor);
                let admit =
                    results.len() < ef || results.peek().is_some_and(|worst| candidate < *worst);
                if !admit {
                    continue;
                }

                candidates.push(Reverse(candidate));
                if self.eligible(neighbor, exclude) {
                    results.push(candidate);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        Ok(results.into_sorted_vec())
    }

    /// Scan every live node. Used when traversal cannot reach enough nodes.
    fn exhaustive(&self, k: usize) -> Result<Vec<Candidate>> {
        let mut results: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k + 1);

        for (node, entry) in self.graph.nodes() {
            if entry.is_deleted() {
                continue;
            }
            if node % 256 == 0 {
                self.control.check()?;
            }
            results.push(self.candidate(node));
            if results.len() > k {
                results.pop();
            }
        }

        Ok(results.into_sorted_vec())
    }
}

/// Parameters of one k-NN query.
pub(crate) struct KnnParams<'a> {
    pub k: usize,
    pub ef: usize,
    pub search_threads: usize,
    pub pool: Option<&'a ThreadPool>,
    pub control: &'a SearchControl,
}

/// k nearest live nodes to `query`, ascending by (distance, id).
pub(crate) fn knn_search(
    graph: &GraphStore,
    metric: DistanceMetric,
    query: &[f32],
    params: &KnnParams<'_>,
) -> Result<Vec<VectorSearchResult>> {
    params.control.check()?;

    if params.k == 0 || graph.is_empty() {
        return Ok(Vec::new());
    }
    let Some(entry) = graph.entry_point() else {
        return Ok(Vec::new());
    };

    let search = LayerSearch::new(graph, metric, query, params.control);

    let mut entry = search.candidate(entry);
    for layer in (1..=graph.max_layer()).rev() {
        entry = search.greedy_closest(entry, layer)?;
    }

    let ef = params.ef.max(params.k);
    let mut found = match params.pool {
        Some(pool) if params.search_threads > 1 => {
            search_layer0_parallel(&search, entry, ef, params.search_threads, pool)?
        }
        _ => {
            let mut visited = VisitedSet::new(graph.slot_count());
            search.search_layer(&[entry], ef, 0, None, &mut visited)?
        }
    };

    let wanted = params.k.min(graph.len());
    if found.len() < wanted {
        debug!(
            "graph traversal reached {} of {} wanted nodes, scanning exhaustively",
            found.len(),
            wanted
        );
        found = search.exhaustive(params.k)?;
    }

    found.truncate(params.k);
    Ok(found.into_iter().map(VectorSearchResult::from).collect())
}

/// Split layer-0 exploration across workers.
///
/// The entry node and its layer-0 neighbors are dealt round-robin to the
/// workers as seeds; each worker runs its own beam search and the partial
/// result lists are merged and deduplicated before ranking.
fn search_layer0_parallel(
    search: &LayerSearch<'_>,
    entry: Candidate,
    ef: usize,
    threads: usize,
    pool: &ThreadPool,
) -> Result<Vec<Candidate>> {
    let mut seeds: Vec<Candidate> = search
        .graph
        .neighbors(entry.node, 0)
        .into_iter()
        .map(|n| search.candidate(n))
        .collect();
    seeds.push(entry);
    seeds.sort();
    seeds.dedup_by_key(|c| c.node);

    let workers = threads.min(seeds.len()).max(1);
    let mut partitions: Vec<Vec<Candidate>> = vec![Vec::new(); workers];
    for (i, seed) in seeds.into_iter().enumerate() {
        partitions[i % workers].push(seed);
    }

    let slots = search.graph.slot_count();
    let partials: Vec<Vec<Candidate>> = pool.install(|| {
        partitions
            .par_iter()
            .map(|seeds| {
                let mut visited = VisitedSet::new(slots);
                search.search_layer(seeds, ef, 0, None, &mut visited)
            })
            .collect::<Result<Vec<_>>>()
    })?;

    let mut merged: Vec<Candidate> = partials.into_iter().flatten().collect();
    merged.sort();
    merged.dedup_by_key(|c| c.node);
    merged.truncate(ef);
    Ok(merged)
}
