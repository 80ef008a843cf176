//! Proximity graph storage for the HNSW index.
//!
//! Nodes live in an arena addressed by [`NodeRef`] slot numbers. Neighbor
//! lists hold slot numbers, never pointers, so the cyclic adjacency has no
//! ownership cycles. Each (node, layer) neighbor list sits behind its own
//! lock: a writer replaces a list wholesale, so a concurrent reader sees
//! either the old list or the new one and never a partially written one.

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::error::{Result, VectraError};
use crate::vector::core::vector::validate_input;

/// Stable arena slot of a node. Slots are only reassigned by a rebuild.
pub type NodeRef = u32;

/// A node in the HNSW graph representing one inserted vector.
#[derive(Debug)]
pub struct Node {
    /// Caller-visible identifier (row id).
    id: u64,
    vector: Box<[f32]>,
    /// Highest layer this node is present in.
    level: usize,
    /// `layers[l]` is the neighbor list at layer `l`.
    layers: Vec<RwLock<Vec<NodeRef>>>,
    deleted: bool,
}

impl Node {
    fn new(id: u64, vector: Box<[f32]>, level: usize) -> Self {
        let layers = (0..=level).map(|_| RwLock::new(Vec::new())).collect();
        Self {
            id,
            vector,
            level,
            layers,
            deleted: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn vector(&self) -> &[f32] {
        &self.vector
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

/// Arena of nodes plus the entry point and current top layer.
#[derive(Debug)]
pub struct GraphStore {
    dimension: usize,
    m: usize,
    max_elements: Option<usize>,
    nodes: Vec<Node>,
    /// Live nodes only; tombstoned ids are dropped from the map.
    id_to_slot: AHashMap<u64, NodeRef>,
    entry_point: Option<NodeRef>,
    max_layer: usize,
    live_count: usize,
    next_id: u64,
}

impl GraphStore {
    pub fn new(dimension: usize, m: usize, max_elements: Option<usize>) -> Self {
        Self {
            dimension,
            m,
            max_elements,
            nodes: Vec::new(),
            id_to_slot: AHashMap::new(),
            entry_point: None,
            max_layer: 0,
            live_count: 0,
            next_id: 0,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Neighbor-list capacity at `layer`.
    pub fn capacity(&self, layer: usize) -> usize {
        if layer == 0 { self.m * 2 } else { self.m }
    }

    /// Number of live (non-tombstoned) nodes.
    pub fn len(&self) -> usize {
        self.live_count
    }

    pub fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    /// Number of arena slots, tombstones included.
    pub fn slot_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn tombstone_count(&self) -> usize {
        self.nodes.len() - self.live_count
    }

    pub fn entry_point(&self) -> Option<NodeRef> {
        self.entry_point
    }

    pub fn max_layer(&self) -> usize {
        self.max_layer
    }

    /// Next id handed out by auto-assignment.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub(crate) fn set_next_id(&mut self, next_id: u64) {
        self.next_id = self.next_id.max(next_id);
    }

    pub fn node(&self, node: NodeRef) -> &Node {
        &self.nodes[node as usize]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeRef, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(slot, node)| (slot as NodeRef, node))
    }

    /// Slot of the live node holding `id`.
    pub fn lookup(&self, id: u64) -> Option<NodeRef> {
        self.id_to_slot.get(&id).copied()
    }

    /// Append a node with empty neighbor lists.
    ///
    /// Rejects the call without touching the store when the vector has the
    /// wrong length, the id is held by a live node, or the arena is full.
    pub fn allocate_node(&mut self, vector: &[f32], id: u64, level: usize) -> Result<NodeRef> {
        validate_input(vector, self.dimension)?;

        if self.id_to_slot.contains_key(&id) {
            return Err(VectraError::DuplicateId(id));
        }

        if let Some(capacity) = self.max_elements
            && self.nodes.len() >= capacity
        {
            return Err(VectraError::CapacityExceeded { capacity });
        }
        if self.nodes.len() >= NodeRef::MAX as usize {
            return Err(VectraError::CapacityExceeded {
                capacity: NodeRef::MAX as usize,
            });
        }

        let slot = self.nodes.len() as NodeRef;
        self.nodes
            .push(Node::new(id, vector.to_vec().into_boxed_slice(), level));
        self.id_to_slot.insert(id, slot);
        self.live_count += 1;
        self.next_id = self.next_id.max(id.saturating_add(1));

        Ok(slot)
    }

    pub fn get_vector(&self, node: NodeRef) -> &[f32] {
        &self.nodes[node as usize].vector
    }

    /// Copy of the neighbor list of `node` at `layer` (empty above its level).
    pub fn neighbors(&self, node: NodeRef, layer: usize) -> Vec<NodeRef> {
        self.nodes[node as usize]
            .layers
            .get(layer)
            .map(|list| list.read().clone())
            .unwrap_or_default()
    }

    /// Run `f` over the neighbor list while holding its read lock.
    pub fn with_neighbors<R>(&self, node: NodeRef, layer: usize, f: impl FnOnce(&[NodeRef]) -> R) -> R {
        match self.nodes[node as usize].layers.get(layer) {
            Some(list) => f(&list.read()),
            None => f(&[]),
        }
    }

    /// Replace the neighbor list of `node` at `layer`.
    ///
    /// Lists longer than the layer capacity are cut to capacity; callers pass
    /// lists ordered by preference so the tail is the part to drop.
    pub fn set_neighbors(&self, node: NodeRef, layer: usize, mut neighbors: Vec<NodeRef>) {
        let Some(list) = self.nodes[node as usize].layers.get(layer) else {
            return;
        };
        debug_assert!(
            neighbors
                .iter()
                .all(|&n| self.nodes[n as usize].level >= layer),
            "neighbor missing from layer {layer}"
        );
        neighbors.truncate(self.capacity(layer));
        *list.write() = neighbors;
    }

    /// Mutate a neighbor list in place under its write lock.
    pub(crate) fn update_neighbors<R>(
        &self,
        node: NodeRef,
        layer: usize,
        f: impl FnOnce(&mut Vec<NodeRef>) -> R,
    ) -> Option<R> {
        let list = self.nodes[node as usize].layers.get(layer)?;
        let mut guard = list.write();
        let result = f(&mut guard);
        debug_assert!(guard.len() <= self.capacity(layer));
        Some(result)
    }

    /// Mark `node` deleted. Its slot and lists stay until the next rebuild.
    pub fn tombstone(&mut self, node: NodeRef) -> Result<()> {
        let entry = &mut self.nodes[node as usize];
        if entry.deleted {
            return Err(VectraError::UnknownId(entry.id));
        }
        entry.deleted = true;
        let id = entry.id;
        self.id_to_slot.remove(&id);
        self.live_count -= 1;

        if self.entry_point == Some(node) {
            self.reelect_entry_point();
        }
        Ok(())
    }

    pub fn is_live(&self, node: NodeRef) -> bool {
        self.nodes
            .get(node as usize)
            .map(|n| !n.deleted)
            .unwrap_or(false)
    }

    /// Promote `node` to entry point if it reaches above the current top layer.
    pub fn promote_entry_point(&mut self, node: NodeRef) -> bool {
        let level = self.nodes[node as usize].level;
        if self.entry_point.is_none() || level > self.max_layer {
            self.entry_point = Some(node);
            self.max_layer = level;
            true
        } else {
            false
        }
    }

    /// Pick the live node with the highest level, earliest slot on ties.
    fn reelect_entry_point(&mut self) {
        let mut best: Option<(NodeRef, usize)> = None;
        for (slot, node) in self.nodes.iter().enumerate() {
            if node.deleted {
                continue;
            }
            if best.is_none_or(|(_, level)| node.level > level) {
                best = Some((slot as NodeRef, node.level));
            }
        }

        self.entry_point = best.map(|(slot, _)| slot);
        self.max_layer = best.map(|(_, level)| level).unwrap_or(0);
    }

    /// Reassemble a store from persisted parts. Structure is checked by the caller.
    pub(crate) fn from_parts(
        dimension: usize,
        m: usize,
        max_elements: Option<usize>,
        parts: Vec<(u64, Vec<f32>, Vec<Vec<NodeRef>>, bool)>,
        entry_point: Option<NodeRef>,
        max_layer: usize,
        next_id: u64,
    ) -> Self {
        let mut store = GraphStore::new(dimension, m, max_elements);
        for (slot, (id, vector, layers, deleted)) in parts.into_iter().enumerate() {
            let level = layers.len().saturating_sub(1);
            let mut node = Node::new(id, vector.into_boxed_slice(), level);
            for (layer, list) in layers.into_iter().enumerate() {
                node.layers[layer] = RwLock::new(list);
            }
            node.deleted = deleted;
            if !deleted {
                store.id_to_slot.insert(id, slot as NodeRef);
                store.live_count += 1;
            }
            store.nodes.push(node);
        }
        store.entry_point = entry_point;
        store.max_layer = max_layer;
        store.next_id = next_id;
        store
    }

    /// Rough in-memory footprint in bytes.
    pub fn memory_usage_bytes(&self) -> usize {
        let vectors = self.nodes.len() * self.dimension * std::mem::size_of::<f32>();
        let links: usize = self
            .nodes
            .iter()
            .flat_map(|n| n.layers.iter())
            .map(|list| list.read().len() * std::mem::size_of::<NodeRef>())
            .sum();
        let overhead = self.nodes.len() * std::mem::size_of::<Node>()
            + self.id_to_slot.len() * (std::mem::size_of::<u64>() + std::mem::size_of::<NodeRef>());
        vectors + links + overhead
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_lookup() {
        let mut store = GraphStore::new(2, 4, None);
        let a = store.allocate_node(&[1.0, 0.0], 10, 0).unwrap();
        let b = store.allocate_node(&[0.0, 1.0], 3, 2).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.lookup(10), Some(a));
        assert_eq!(store.lookup(3), Some(b));
        assert_eq!(store.get_vector(b), &[0.0, 1.0]);
        assert_eq!(store.node(b).level(), 2);
        assert_eq!(store.next_id(), 11);
    }

    #[test]
    fn test_allocate_rejects_bad_input() {
        let mut store = GraphStore::new(3, 4, Some(1));
        assert!(matches!(
            store.allocate_node(&[1.0, 2.0], 1, 0),
            Err(VectraError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
        assert_eq!(store.slot_count(), 0);

        store.allocate_node(&[1.0, 2.0, 3.0], 1, 0).unwrap();
        assert!(matches!(
            store.allocate_node(&[1.0, 2.0, 3.0], 1, 0),
            Err(VectraError::DuplicateId(1))
        ));
        assert!(matches!(
            store.allocate_node(&[1.0, 2.0, 3.0], 2, 0),
            Err(VectraError::CapacityExceeded { capacity: 1 })
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_neighbor_lists_respect_capacity() {
        let mut store = GraphStore::new(1, 2, None);
        let slots: Vec<NodeRef> = (0..6)
            .map(|i| store.allocate_node(&[i as f32], i, 1).unwrap())
            .collect();

        store.set_neighbors(slots[0], 1, slots[1..].to_vec());
        assert_eq!(store.neighbors(slots[0], 1).len(), 2);

        store.set_neighbors(slots[0], 0, slots[1..].to_vec());
        assert_eq!(store.neighbors(slots[0], 0).len(), 4);

        // Above the node's level there is no list.
        assert!(store.neighbors(slots[0], 5).is_empty());
    }

    #[test]
    fn test_tombstone_reelects_entry_point() {
        let mut store = GraphStore::new(1, 4, None);
        let low = store.allocate_node(&[0.0], 1, 0).unwrap();
        store.promote_entry_point(low);
        let high = store.allocate_node(&[1.0], 2, 3).unwrap();
        assert!(store.promote_entry_point(high));
        let mid = store.allocate_node(&[2.0], 3, 1).unwrap();
        assert!(!store.promote_entry_point(mid));

        assert_eq!(store.entry_point(), Some(high));
        assert_eq!(store.max_layer(), 3);

        store.tombstone(high).unwrap();
        assert!(!store.is_live(high));
        assert_eq!(store.entry_point(), Some(mid));
        assert_eq!(store.max_layer(), 1);
        assert_eq!(store.lookup(2), None);
        assert_eq!(store.tombstone_count(), 1);

        assert!(matches!(store.tombstone(high), Err(VectraError::UnknownId(2))));
    }

    #[test]
    fn test_tombstoned_id_can_be_reused() {
        let mut store = GraphStore::new(1, 4, None);
        let first = store.allocate_node(&[0.0], 7, 0).unwrap();
        store.tombstone(first).unwrap();

        let second = store.allocate_node(&[1.0], 7, 0).unwrap();
        assert_ne!(first, second);
        assert_eq!(store.lookup(7), Some(second));
        assert_eq!(store.len(), 1);
        assert_eq!(store.slot_count(), 2);
    }
}
