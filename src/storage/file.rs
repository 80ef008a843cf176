//! File-based storage implementation.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VectraError};
use crate::storage::{Storage, StorageInput, StorageOutput};

const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Configuration for [`FileStorage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStorageConfig {
    /// Root directory; created if missing.
    pub directory: PathBuf,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// fsync file contents when an output is closed.
    #[serde(default = "default_sync_writes")]
    pub sync_writes: bool,
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_sync_writes() -> bool {
    true
}

impl FileStorageConfig {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        FileStorageConfig {
            directory: directory.as_ref().to_path_buf(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            sync_writes: true,
        }
    }
}

/// Files under one directory.
#[derive(Debug)]
pub struct FileStorage {
    directory: PathBuf,
    config: FileStorageConfig,
}

impl FileStorage {
    pub fn new(config: FileStorageConfig) -> Result<Self> {
        let directory = config.directory.clone();

        if !directory.exists() {
            std::fs::create_dir_all(&directory)
                .map_err(|e| VectraError::storage(format!("Failed to create directory: {e}")))?;
        }

        if !directory.is_dir() {
            return Err(VectraError::storage(format!(
                "Path is not a directory: {}",
                directory.display()
            )));
        }

        Ok(FileStorage { directory, config })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }
}

fn map_io(name: &str, e: std::io::Error) -> VectraError {
    if e.kind() == std::io::ErrorKind::NotFound {
        VectraError::storage(format!("File not found: {name}"))
    } else {
        VectraError::Io(e)
    }
}

impl Storage for FileStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let file = File::open(self.file_path(name)).map_err(|e| map_io(name, e))?;
        Ok(Box::new(FileInput::new(file, self.config.buffer_size)?))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.file_path(name))?;

        Ok(Box::new(FileOutput::new(
            file,
            self.config.buffer_size,
            self.config.sync_writes,
        )))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.file_path(name).exists()
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        match std::fs::remove_file(self.file_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.directory)? {
            let entry = entry?;
            if entry.file_type()?.is_file()
                && let Some(name) = entry.file_name().to_str()
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        let metadata = std::fs::metadata(self.file_path(name)).map_err(|e| map_io(name, e))?;
        Ok(metadata.len())
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        std::fs::rename(self.file_path(old_name), self.file_path(new_name))
            .map_err(|e| map_io(old_name, e))
    }

    fn sync(&self) -> Result<()> {
        // Persist directory entries created by renames.
        // Some platforms cannot open a directory; only a failed fsync is an error.
        if let Ok(dir) = File::open(&self.directory) {
            dir.sync_all()
                .map_err(|e| VectraError::storage(format!("Failed to sync directory: {e}")))?;
        }
        Ok(())
    }
}

/// Buffered reader over a file.
#[derive(Debug)]
pub struct FileInput {
    reader: BufReader<File>,
    size: u64,
}

impl FileInput {
    fn new(file: File, buffer_size: usize) -> Result<Self> {
        let size = file
            .metadata()
            .map_err(|e| VectraError::storage(format!("Failed to get file metadata: {e}")))?
            .len();

        Ok(FileInput {
            reader: BufReader::with_capacity(buffer_size, file),
            size,
        })
    }
}

impl Read for FileInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl StorageInput for FileInput {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }
}

/// Buffered writer over a file.
#[derive(Debug)]
pub struct FileOutput {
    writer: BufWriter<File>,
    sync_writes: bool,
    position: u64,
    closed: bool,
}

impl FileOutput {
    fn new(file: File, buffer_size: usize, sync_writes: bool) -> Self {
        FileOutput {
            writer: BufWriter::with_capacity(buffer_size, file),
            sync_writes,
            position: 0,
            closed: false,
        }
    }
}

impl Write for FileOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.closed {
            return Err(std::io::Error::other("Output is closed"));
        }
        let written = self.writer.write(buf)?;
        self.position += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl StorageOutput for FileOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| VectraError::storage(format!("Failed to flush: {e}")))?;

        self.writer
            .get_ref()
            .sync_all()
            .map_err(|e| VectraError::storage(format!("Failed to sync: {e}")))?;

        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if self.sync_writes {
            self.flush_and_sync()?;
        } else {
            self.writer.flush()?;
        }
        self.closed = true;
        Ok(())
    }
}
