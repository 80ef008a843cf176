//! Storage abstraction for index snapshots.
//!
//! Snapshots are written through the [`Storage`] trait so the same code path
//! serves on-disk directories and in-memory buffers. Backends are picked with
//! [`StorageConfig`] and built by [`StorageFactory`].
//!
//! # Example
//!
//! ```
//! use std::io::{Read, Write};
//!
//! use vectra::storage::memory::MemoryStorageConfig;
//! use vectra::storage::{StorageConfig, StorageFactory};
//!
//! # fn main() -> vectra::error::Result<()> {
//! let storage = StorageFactory::create(StorageConfig::Memory(MemoryStorageConfig::default()))?;
//!
//! let mut output = storage.create_output("graph.hnsw")?;
//! output.write_all(b"payload")?;
//! output.close()?;
//!
//! let mut input = storage.open_input("graph.hnsw")?;
//! let mut buffer = Vec::new();
//! input.read_to_end(&mut buffer)?;
//! assert_eq!(buffer, b"payload");
//! # Ok(())
//! # }
//! ```

use std::io::{Read, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod file;
pub mod memory;

use file::{FileStorage, FileStorageConfig};
use memory::{MemoryStorage, MemoryStorageConfig};

/// A named-blob store that snapshots are read from and written to.
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Open an existing file for reading.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Create a file for writing, truncating any previous content.
    ///
    /// Data becomes visible to readers once the output is closed.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    fn file_exists(&self, name: &str) -> bool;

    fn delete_file(&self, name: &str) -> Result<()>;

    /// Names of all files, sorted.
    fn list_files(&self) -> Result<Vec<String>>;

    fn file_size(&self, name: &str) -> Result<u64>;

    /// Rename a file, replacing `new_name` if it exists.
    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()>;

    /// Sync all pending writes to the backing medium.
    fn sync(&self) -> Result<()>;
}

/// A readable file handle.
pub trait StorageInput: Read + Send + std::fmt::Debug {
    /// Total size of the file in bytes.
    fn size(&self) -> Result<u64>;
}

/// A writable file handle.
pub trait StorageOutput: Write + Send + std::fmt::Debug {
    /// Flush buffered bytes and sync them to the backing medium.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Bytes written so far.
    fn position(&self) -> u64;

    /// Finish the file. Further writes fail.
    fn close(&mut self) -> Result<()>;
}

/// Backend selection for [`StorageFactory`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    Memory(MemoryStorageConfig),
    File(FileStorageConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory(MemoryStorageConfig::default())
    }
}

/// Builds storage backends from configuration.
pub struct StorageFactory;

impl StorageFactory {
    pub fn create(config: StorageConfig) -> Result<Arc<dyn Storage>> {
        match config {
            StorageConfig::Memory(config) => Ok(Arc::new(MemoryStorage::new(config))),
            StorageConfig::File(config) => Ok(Arc::new(FileStorage::new(config)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_memory() {
        let storage = StorageFactory::create(StorageConfig::default()).unwrap();
        let mut output = storage.create_output("a.bin").unwrap();
        output.write_all(b"abc").unwrap();
        output.close().unwrap();

        assert!(storage.file_exists("a.bin"));
        assert_eq!(storage.file_size("a.bin").unwrap(), 3);
    }

    #[test]
    fn test_factory_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = StorageConfig::File(FileStorageConfig::new(temp_dir.path()));
        let storage = StorageFactory::create(config).unwrap();

        let mut output = storage.create_output("b.bin").unwrap();
        output.write_all(b"abcd").unwrap();
        output.close().unwrap();

        assert_eq!(storage.list_files().unwrap(), vec!["b.bin".to_string()]);
    }

    #[test]
    fn test_storage_config_from_json() {
        let config: StorageConfig =
            serde_json::from_str(r#"{"type":"file","directory":"/tmp/vectra"}"#).unwrap();
        match config {
            StorageConfig::File(file) => {
                assert_eq!(file.directory, std::path::PathBuf::from("/tmp/vectra"));
                assert!(file.sync_writes);
            }
            StorageConfig::Memory(_) => panic!("expected file storage"),
        }
    }
}
