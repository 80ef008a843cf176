//! Point-in-time snapshots of an HNSW graph.
//!
//! Layout: magic `VHNS`, format version (u32 LE), payload length (u64 LE),
//! CRC32 of the payload (u32 LE), then the bincode-encoded [`GraphSnapshot`].

use std::collections::HashSet;
use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VectraError};
use crate::storage::Storage;
use crate::vector::index::config::HnswIndexConfig;
use crate::vector::index::hnsw::graph::{GraphStore, NodeRef};

pub const SNAPSHOT_MAGIC: &[u8; 4] = b"VHNS";
pub const SNAPSHOT_VERSION: u32 = 1;
pub const SNAPSHOT_EXTENSION: &str = "hnsw";
const HEADER_LEN: usize = 4 + 4 + 8 + 4;

/// One arena slot as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub id: u64,
    pub deleted: bool,
    pub vector: Vec<f32>,
    /// `layers[l]` holds the neighbor slots at layer `l`.
    pub layers: Vec<Vec<NodeRef>>,
}

/// Everything needed to reproduce a graph and its search behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub config: HnswIndexConfig,
    pub nodes: Vec<SnapshotNode>,
    pub entry_point: Option<NodeRef>,
    pub max_layer: usize,
    pub next_id: u64,
}

impl GraphSnapshot {
    /// Copy the graph. The caller holds the locks that keep it consistent.
    pub(crate) fn capture(config: &HnswIndexConfig, graph: &GraphStore) -> Self {
        let nodes = graph
            .nodes()
            .map(|(slot, node)| SnapshotNode {
                id: node.id(),
                deleted: node.is_deleted(),
                vector: node.vector().to_vec(),
                layers: (0..=node.level())
                    .map(|layer| graph.neighbors(slot, layer))
                    .collect(),
            })
            .collect();

        GraphSnapshot {
            config: config.clone(),
            nodes,
            entry_point: graph.entry_point(),
            max_layer: graph.max_layer(),
            next_id: graph.next_id(),
        }
    }

    pub fn live_count(&self) -> usize {
        self.nodes.iter().filter(|n| !n.deleted).count()
    }

    /// Structural checks run before a snapshot may replace a live graph.
    pub fn validate(&self) -> Result<()> {
        self.config
            .validate()
            .map_err(|e| VectraError::corrupted(format!("snapshot config: {e}")))?;

        let dimension = self.config.dimension;
        let slots = self.nodes.len();
        let mut live_ids = HashSet::with_capacity(slots);

        for (slot, node) in self.nodes.iter().enumerate() {
            if node.vector.len() != dimension {
                return Err(VectraError::corrupted(format!(
                    "node {slot} has dimension {}, expected {dimension}",
                    node.vector.len()
                )));
            }
            if node.layers.is_empty() {
                return Err(VectraError::corrupted(format!("node {slot} has no layers")));
            }
            if !node.deleted && !live_ids.insert(node.id) {
                return Err(VectraError::corrupted(format!(
                    "id {} is live in more than one slot",
                    node.id
                )));
            }

            for (layer, neighbors) in node.layers.iter().enumerate() {
                let capacity = self.config.max_neighbors(layer);
                if neighbors.len() > capacity {
                    return Err(VectraError::corrupted(format!(
                        "node {slot} has {} neighbors at layer {layer}, capacity is {capacity}",
                        neighbors.len()
                    )));
                }
                for &neighbor in neighbors {
                    let target = self.nodes.get(neighbor as usize).ok_or_else(|| {
                        VectraError::corrupted(format!(
                            "node {slot} links to missing slot {neighbor}"
                        ))
                    })?;
                    if target.layers.len() <= layer {
                        return Err(VectraError::corrupted(format!(
                            "node {slot} links to slot {neighbor} above its level at layer {layer}"
                        )));
                    }
                }
            }
        }

        if let Some(max_elements) = self.config.max_elements
            && slots > max_elements
        {
            return Err(VectraError::corrupted(format!(
                "{slots} slots exceed max_elements {max_elements}"
            )));
        }

        match self.entry_point {
            Some(entry) => {
                let node = self.nodes.get(entry as usize).ok_or_else(|| {
                    VectraError::corrupted(format!("entry point {entry} is out of range"))
                })?;
                if node.deleted {
                    return Err(VectraError::corrupted("entry point is tombstoned"));
                }
                if node.layers.len() != self.max_layer + 1 {
                    return Err(VectraError::corrupted(format!(
                        "entry point level {} does not match max layer {}",
                        node.layers.len() - 1,
                        self.max_layer
                    )));
                }
                if self.nodes.iter().any(|n| !n.deleted && n.layers.len() > node.layers.len()) {
                    return Err(VectraError::corrupted(
                        "a live node reaches above the entry point",
                    ));
                }
            }
            None => {
                if !live_ids.is_empty() {
                    return Err(VectraError::corrupted("live nodes but no entry point"));
                }
            }
        }

        Ok(())
    }

    /// Validate and turn into a graph store.
    pub(crate) fn into_store(self) -> Result<GraphStore> {
        self.validate()?;

        let parts = self
            .nodes
            .into_iter()
            .map(|n| (n.id, n.vector, n.layers, n.deleted))
            .collect();

        Ok(GraphStore::from_parts(
            self.config.dimension,
            self.config.m,
            self.config.max_elements,
            parts,
            self.entry_point,
            self.max_layer,
            self.next_id,
        ))
    }

    /// Encode with header and checksum.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.write_all(SNAPSHOT_MAGIC)?;
        bytes.write_u32::<LittleEndian>(SNAPSHOT_VERSION)?;
        bytes.write_u64::<LittleEndian>(payload.len() as u64)?;
        bytes.write_u32::<LittleEndian>(crc32fast::hash(&payload))?;
        bytes.extend_from_slice(&payload);

        Ok(bytes)
    }

    /// Decode and verify header, length and checksum.
    ///
    /// Structural validation happens separately in [`GraphSnapshot::validate`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(VectraError::corrupted(format!(
                "snapshot is {} bytes, header needs {HEADER_LEN}",
                bytes.len()
            )));
        }

        let mut header = Cursor::new(&bytes[..HEADER_LEN]);
        let mut magic = [0u8; 4];
        header.read_exact(&mut magic)?;
        if &magic != SNAPSHOT_MAGIC {
            return Err(VectraError::corrupted("bad snapshot magic"));
        }

        let version = header.read_u32::<LittleEndian>()?;
        if version != SNAPSHOT_VERSION {
            return Err(VectraError::corrupted(format!(
                "unsupported snapshot version {version}"
            )));
        }

        let payload_len = header.read_u64::<LittleEndian>()?;
        let checksum = header.read_u32::<LittleEndian>()?;

        let payload = &bytes[HEADER_LEN..];
        if payload.len() as u64 != payload_len {
            return Err(VectraError::corrupted(format!(
                "payload is {} bytes, header says {payload_len}",
                payload.len()
            )));
        }
        if crc32fast::hash(payload) != checksum {
            return Err(VectraError::corrupted("snapshot checksum mismatch"));
        }

        bincode::deserialize(payload)
            .map_err(|e| VectraError::corrupted(format!("undecodable snapshot payload: {e}")))
    }
}

/// Storage file name for a snapshot called `name`.
pub fn snapshot_file_name(name: &str) -> String {
    format!("{name}.{SNAPSHOT_EXTENSION}")
}

/// Write `snapshot` under `name`, replacing any previous one atomically.
///
/// Bytes go to a temporary file first and are renamed into place once fully
/// written, so a crash never leaves a half-written snapshot under `name`.
pub fn write_snapshot(storage: &dyn Storage, name: &str, snapshot: &GraphSnapshot) -> Result<u64> {
    let bytes = snapshot.to_bytes()?;
    let final_name = snapshot_file_name(name);
    let temp_name = format!("{final_name}.tmp");

    let written = (|| -> Result<()> {
        let mut output = storage.create_output(&temp_name)?;
        output.write_all(&bytes)?;
        output.close()?;
        storage.rename_file(&temp_name, &final_name)?;
        storage.sync()
    })();

    if let Err(e) = written {
        let _ = storage.delete_file(&temp_name);
        return Err(e);
    }

    info!(
        "wrote snapshot {final_name}: {} nodes, {} bytes",
        snapshot.nodes.len(),
        bytes.len()
    );
    Ok(bytes.len() as u64)
}

/// Read and checksum-verify the snapshot stored under `name`.
pub fn read_snapshot(storage: &dyn Storage, name: &str) -> Result<GraphSnapshot> {
    let file_name = snapshot_file_name(name);
    let mut input = storage.open_input(&file_name)?;
    let mut bytes = Vec::with_capacity(input.size()? as usize);
    input.read_to_end(&mut bytes)?;

    let snapshot = GraphSnapshot::from_bytes(&bytes)?;
    debug!("read snapshot {file_name}: {} nodes", snapshot.nodes.len());
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;
    use crate::vector::core::distance::DistanceMetric;

    fn small_snapshot() -> GraphSnapshot {
        let config = HnswIndexConfig::new(2)
            .with_m(2)
            .with_ef_construction(4)
            .with_distance_metric(DistanceMetric::Euclidean);
        GraphSnapshot {
            config,
            nodes: vec![
                SnapshotNode {
                    id: 1,
                    deleted: false,
                    vector: vec![0.0, 0.0],
                    layers: vec![vec![1], vec![]],
                },
                SnapshotNode {
                    id: 2,
                    deleted: false,
                    vector: vec![1.0, 0.0],
                    layers: vec![vec![0]],
                },
            ],
            entry_point: Some(0),
            max_layer: 1,
            next_id: 3,
        }
    }

    #[test]
    fn test_bytes_round_trip() {
        let snapshot = small_snapshot();
        let bytes = snapshot.to_bytes().unwrap();
        assert_eq!(&bytes[..4], SNAPSHOT_MAGIC);

        let decoded = GraphSnapshot::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, snapshot);
        assert!(decoded.validate().is_ok());
    }

    #[test]
    fn test_detects_flipped_byte() {
        let mut bytes = small_snapshot().to_bytes().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        assert!(matches!(
            GraphSnapshot::from_bytes(&bytes),
            Err(VectraError::Corrupted(_))
        ));
    }

    #[test]
    fn test_detects_truncation() {
        let bytes = small_snapshot().to_bytes().unwrap();
        assert!(matches!(
            GraphSnapshot::from_bytes(&bytes[..bytes.len() - 3]),
            Err(VectraError::Corrupted(_))
        ));
        assert!(matches!(
            GraphSnapshot::from_bytes(&bytes[..10]),
            Err(VectraError::Corrupted(_))
        ));
    }

    #[test]
    fn test_validate_rejects_dangling_link() {
        let mut snapshot = small_snapshot();
        snapshot.nodes[1].layers[0] = vec![7];
        assert!(matches!(
            snapshot.validate(),
            Err(VectraError::Corrupted(_))
        ));
    }

    #[test]
    fn test_validate_rejects_link_above_level() {
        let mut snapshot = small_snapshot();
        // Node 1 only has layer 0.
        snapshot.nodes[0].layers[1] = vec![1];
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_entry_point() {
        let mut snapshot = small_snapshot();
        snapshot.nodes[0].deleted = true;
        assert!(snapshot.validate().is_err());

        let mut snapshot = small_snapshot();
        snapshot.entry_point = None;
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_write_and_read_through_storage() {
        let storage = MemoryStorage::new_default();
        let snapshot = small_snapshot();

        let written = write_snapshot(&storage, "graph", &snapshot).unwrap();
        assert!(storage.file_exists("graph.hnsw"));
        assert!(!storage.file_exists("graph.hnsw.tmp"));
        assert_eq!(storage.file_size("graph.hnsw").unwrap(), written);

        let restored = read_snapshot(&storage, "graph").unwrap();
        assert_eq!(restored, snapshot);
        assert_eq!(restored.live_count(), 2);
    }
}
