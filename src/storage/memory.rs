//! In-memory storage implementation for tests and ephemeral indexes.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VectraError};
use crate::storage::{Storage, StorageInput, StorageOutput};

type FileMap = Arc<Mutex<HashMap<String, Box<[u8]>>>>;

/// Configuration for [`MemoryStorage`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStorageConfig {
    /// Initial number of file slots to reserve.
    #[serde(default)]
    pub initial_capacity: usize,
}

/// Files held as boxed byte slices behind a shared map.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    files: FileMap,
}

impl MemoryStorage {
    pub fn new(config: MemoryStorageConfig) -> Self {
        MemoryStorage {
            files: Arc::new(Mutex::new(HashMap::with_capacity(config.initial_capacity))),
        }
    }

    pub fn new_default() -> Self {
        Self::new(MemoryStorageConfig::default())
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().len()
    }

    /// Overwrite a stored file in place. Test helper for corruption cases.
    pub fn put(&self, name: &str, data: Vec<u8>) {
        self.files
            .lock()
            .insert(name.to_string(), data.into_boxed_slice());
    }

    /// Copy of a stored file.
    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock().get(name).map(|data| data.to_vec())
    }
}

fn not_found(name: &str) -> VectraError {
    VectraError::storage(format!("File not found: {name}"))
}

impl Storage for MemoryStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let files = self.files.lock();
        let data = files.get(name).ok_or_else(|| not_found(name))?;
        Ok(Box::new(MemoryInput::new(data.to_vec())))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        Ok(Box::new(MemoryOutput::new(
            name.to_string(),
            Arc::clone(&self.files),
        )))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.files.lock().contains_key(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.files.lock().remove(name);
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.files.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        let files = self.files.lock();
        let data = files.get(name).ok_or_else(|| not_found(name))?;
        Ok(data.len() as u64)
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        let mut files = self.files.lock();
        let data = files.remove(old_name).ok_or_else(|| not_found(old_name))?;
        files.insert(new_name.to_string(), data);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

/// Reader over a copy of a stored file.
#[derive(Debug)]
pub struct MemoryInput {
    cursor: Cursor<Vec<u8>>,
    size: u64,
}

impl MemoryInput {
    fn new(data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        MemoryInput {
            cursor: Cursor::new(data),
            size,
        }
    }
}

impl Read for MemoryInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl StorageInput for MemoryInput {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }
}

/// Buffers writes and publishes the file on close.
#[derive(Debug)]
pub struct MemoryOutput {
    name: String,
    buffer: Vec<u8>,
    files: FileMap,
    closed: bool,
}

impl MemoryOutput {
    fn new(name: String, files: FileMap) -> Self {
        MemoryOutput {
            name,
            buffer: Vec::new(),
            files,
            closed: false,
        }
    }
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.closed {
            return Err(std::io::Error::other("Output is closed"));
        }
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl StorageOutput for MemoryOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn position(&self) -> u64 {
        self.buffer.len() as u64
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            let data = std::mem::take(&mut self.buffer).into_boxed_slice();
            self.files.lock().insert(self.name.clone(), data);
            self.closed = true;
        }
        Ok(())
    }
}
