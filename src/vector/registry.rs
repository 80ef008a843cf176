//! Catalogue of vector indexes keyed by `(table, column)`.
//!
//! Index DDL creates and drops entries here; the storage layer looks indexes
//! up by the column they cover.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::info;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VectraError};
use crate::storage::Storage;
use crate::vector::index::config::HnswIndexConfig;
use crate::vector::index::hnsw::{HnswIndex, IndexStats};

/// Identifies the column an index covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexKey {
    pub table: String,
    pub column: String,
}

impl IndexKey {
    pub fn new(table: &str, column: &str) -> Result<Self> {
        for (what, name) in [("table", table), ("column", column)] {
            // '.' separates table from column in snapshot names.
            if name.is_empty() || name.contains([':', '.', '/', '\\']) {
                return Err(VectraError::invalid_config(format!(
                    "Invalid {what} name: '{name}'"
                )));
            }
        }
        Ok(Self {
            table: table.to_string(),
            column: column.to_string(),
        })
    }

    /// Storage name used for this index's snapshot.
    pub fn snapshot_name(&self) -> String {
        format!("{}.{}", self.table, self.column)
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table, self.column)
    }
}

/// Thread-safe map from [`IndexKey`] to a shared index handle.
#[derive(Debug, Default)]
pub struct VectorIndexRegistry {
    indexes: RwLock<HashMap<IndexKey, Arc<HnswIndex>>>,
}

impl VectorIndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index. Fails if one already covers the column.
    pub fn create_index(
        &self,
        table: &str,
        column: &str,
        config: HnswIndexConfig,
    ) -> Result<Arc<HnswIndex>> {
        let key = IndexKey::new(table, column)?;
        let mut indexes = self.indexes.write();
        if indexes.contains_key(&key) {
            return Err(VectraError::invalid_operation(format!(
                "Index already exists on {key}"
            )));
        }

        let index = Arc::new(HnswIndex::new(config)?);
        indexes.insert(key.clone(), Arc::clone(&index));
        info!("registered vector index on {key}");
        Ok(index)
    }

    /// Create an index from a DDL option map.
    pub fn create_index_with_options(
        &self,
        table: &str,
        column: &str,
        options: &HashMap<String, String>,
    ) -> Result<Arc<HnswIndex>> {
        let config = HnswIndexConfig::from_options(options)?;
        self.create_index(table, column, config)
    }

    pub fn get(&self, table: &str, column: &str) -> Option<Arc<HnswIndex>> {
        let key = IndexKey::new(table, column).ok()?;
        self.indexes.read().get(&key).cloned()
    }

    /// Drop one index. Handles already given out stay usable.
    pub fn drop_index(&self, table: &str, column: &str) -> Result<()> {
        let key = IndexKey::new(table, column)?;
        self.indexes
            .write()
            .remove(&key)
            .ok_or_else(|| VectraError::invalid_operation(format!("No index on {key}")))?;
        info!("dropped vector index on {key}");
        Ok(())
    }

    /// Drop every index on `table`, returning how many were removed.
    pub fn drop_table(&self, table: &str) -> usize {
        let mut indexes = self.indexes.write();
        let before = indexes.len();
        indexes.retain(|key, _| key.table != table);
        let dropped = before - indexes.len();
        if dropped > 0 {
            info!("dropped {dropped} vector indexes on table {table}");
        }
        dropped
    }

    /// Registered keys in sorted order.
    pub fn list(&self) -> Vec<IndexKey> {
        let mut keys: Vec<IndexKey> = self.indexes.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.indexes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.read().is_empty()
    }

    pub fn index_stats(&self, table: &str, column: &str) -> Result<IndexStats> {
        self.get(table, column)
            .map(|index| index.stats())
            .ok_or_else(|| VectraError::invalid_operation(format!("No index on {table}:{column}")))
    }

    /// Snapshot every index into `storage`. Returns how many were written.
    pub fn snapshot_all(&self, storage: &dyn Storage) -> Result<usize> {
        // Clone the handles so snapshots do not block DDL.
        let entries: Vec<(IndexKey, Arc<HnswIndex>)> = self
            .indexes
            .read()
            .iter()
            .map(|(key, index)| (key.clone(), Arc::clone(index)))
            .collect();

        for (key, index) in &entries {
            index.write_snapshot(storage, &key.snapshot_name())?;
        }
        Ok(entries.len())
    }

    /// Register an index loaded from its snapshot in `storage`.
    pub fn load_index(
        &self,
        storage: &dyn Storage,
        table: &str,
        column: &str,
    ) -> Result<Arc<HnswIndex>> {
        let key = IndexKey::new(table, column)?;
        let index = Arc::new(HnswIndex::load(storage, &key.snapshot_name(), None)?);

        let mut indexes = self.indexes.write();
        if indexes.contains_key(&key) {
            return Err(VectraError::invalid_operation(format!(
                "Index already exists on {key}"
            )));
        }
        indexes.insert(key, Arc::clone(&index));
        Ok(index)
    }
}
