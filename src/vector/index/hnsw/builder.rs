//! Graph construction for HNSW: layer assignment, neighbor selection and
//! link maintenance.

use log::debug;
use rand::Rng;

use crate::error::Result;
use crate::vector::core::distance::DistanceMetric;
use crate::vector::index::config::HnswIndexConfig;
use crate::vector::index::hnsw::graph::{GraphStore, NodeRef};
use crate::vector::index::hnsw::searcher::{Candidate, LayerSearch, VisitedSet};
use crate::vector::search::control::SearchControl;

/// Hard ceiling on drawn levels.
pub const MAX_LEVEL: usize = 32;

/// Draw a level from the geometric distribution `floor(-ln(U) * mult)`.
pub(crate) fn draw_level<R: Rng>(rng: &mut R, level_multiplier: f64) -> usize {
    // 1 - [0, 1) keeps the argument of ln in (0, 1].
    let uniform: f64 = 1.0 - rng.random::<f64>();
    let level = (-uniform.ln() * level_multiplier).floor();
    (level as usize).min(MAX_LEVEL)
}

/// Pick up to `max` diverse neighbors from `candidates` (ascending by distance
/// to the new node).
///
/// A candidate is dropped when some already-accepted neighbor is closer to it
/// than the new node is. Dropped candidates are not used to backfill.
pub(crate) fn select_neighbors_heuristic(
    graph: &GraphStore,
    metric: DistanceMetric,
    candidates: &[Candidate],
    max: usize,
) -> Vec<Candidate> {
    let mut selected: Vec<Candidate> = Vec::with_capacity(max);

    for candidate in candidates {
        if selected.len() >= max {
            break;
        }
        let vector = graph.get_vector(candidate.node);
        let dominated = selected.iter().any(|accepted| {
            metric.compute(vector, graph.get_vector(accepted.node)) < candidate.distance
        });
        if !dominated {
            selected.push(*candidate);
        }
    }

    selected
}

/// Connect an allocated node into the graph.
///
/// Runs with the store shared; every list write goes through its own lock.
/// The node's own lists are written before any backlink points at it.
pub(crate) fn link_node(graph: &GraphStore, config: &HnswIndexConfig, node: NodeRef) -> Result<()> {
    let Some(entry) = graph.entry_point() else {
        return Ok(());
    };
    if entry == node {
        return Ok(());
    }

    let metric = config.distance_metric;
    let control = SearchControl::none();
    let query = graph.get_vector(node);
    let search = LayerSearch::new(graph, metric, query, &control);

    let level = graph.node(node).level();
    let top = graph.max_layer();

    let mut entry = search.candidate(entry);
    for layer in (level + 1..=top).rev() {
        entry = search.greedy_closest(entry, layer)?;
    }

    let mut entry_points = vec![entry];
    let mut visited = VisitedSet::new(graph.slot_count());
    for layer in (0..=level.min(top)).rev() {
        visited.clear();
        let candidates = search.search_layer(
            &entry_points,
            config.construction_ef(),
            layer,
            Some(node),
            &mut visited,
        )?;

        let selected =
            select_neighbors_heuristic(graph, metric, &candidates, graph.capacity(layer));
        graph.set_neighbors(node, layer, selected.iter().map(|c| c.node).collect());

        for neighbor in &selected {
            add_backlink(graph, metric, neighbor.node, node, neighbor.distance, layer);
        }

        if !candidates.is_empty() {
            entry_points = candidates;
        }
    }

    Ok(())
}

/// Point `neighbor` back at `new_node` at `layer`.
///
/// A full list gives up a tombstoned link first; otherwise its farthest link
/// is replaced only when `new_node` is strictly closer.
fn add_backlink(
    graph: &GraphStore,
    metric: DistanceMetric,
    neighbor: NodeRef,
    new_node: NodeRef,
    distance: f32,
    layer: usize,
) {
    let capacity = graph.capacity(layer);
    let base = graph.get_vector(neighbor);

    graph.update_neighbors(neighbor, layer, |list| {
        if list.contains(&new_node) {
            return;
        }
        if list.len() < capacity {
            list.push(new_node);
            return;
        }
        if let Some(pos) = list.iter().position(|&n| !graph.is_live(n)) {
            list[pos] = new_node;
            return;
        }

        let farthest = list
            .iter()
            .enumerate()
            .map(|(pos, &n)| (pos, metric.compute(base, graph.get_vector(n))))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((pos, far)) = farthest
            && distance < far
        {
            list[pos] = new_node;
        }
    });
}

/// Remove every link from the deleted node's neighbors back to it.
pub(crate) fn unlink_node(graph: &GraphStore, node: NodeRef) {
    let level = graph.node(node).level();
    for layer in 0..=level {
        for neighbor in graph.neighbors(node, layer) {
            graph.update_neighbors(neighbor, layer, |list| list.retain(|&n| n != node));
        }
    }
}

/// Allocate, link and promote in one go on an exclusively held store.
pub(crate) fn insert_exclusive<R: Rng>(
    graph: &mut GraphStore,
    config: &HnswIndexConfig,
    rng: &mut R,
    id: u64,
    vector: &[f32],
) -> Result<NodeRef> {
    let level = draw_level(rng, config.level_multiplier());
    let node = graph.allocate_node(vector, id, level)?;
    if let Err(e) = link_node(graph, config, node) {
        graph.tombstone(node)?;
        return Err(e);
    }
    graph.promote_entry_point(node);
    Ok(node)
}

/// Build a fresh store holding only the live nodes of `graph`.
///
/// Nodes are re-inserted in slot order with freshly drawn levels, so the
/// result carries no tombstones.
pub(crate) fn rebuild_store<R: Rng>(
    graph: &GraphStore,
    config: &HnswIndexConfig,
    rng: &mut R,
) -> Result<GraphStore> {
    let mut store = GraphStore::new(graph.dimension(), config.m, config.max_elements);

    for (_, node) in graph.nodes() {
        if node.is_deleted() {
            continue;
        }
        insert_exclusive(&mut store, config, rng, node.id(), node.vector())?;
    }
    store.set_next_id(graph.next_id());

    debug!(
        "rebuilt graph: {} live nodes, {} tombstones dropped",
        store.len(),
        graph.tombstone_count()
    );
    Ok(store)
}
