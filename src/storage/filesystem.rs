use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::format::{self, StoreFormat};
use super::traits::StateStore;
use super::PersistedStore;
use crate::error::StorageError;

/// JSON state file on the local filesystem
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

impl StateStore for FileStore {
    fn load(&self) -> Result<PersistedStore, StorageError> {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            // Only a missing file is replaced; any other error keeps the history
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!("State file not found, creating new one at {:?}", self.path);
                let store = PersistedStore::default();
                self.save(&store)?;
                return Ok(store);
            }
            Err(e) => return Err(self.io_error(e)),
        };
        let (store, format) = format::decode(&content).map_err(|source| StorageError::Parse {
            path: self.path.clone(),
            source,
        })?;

        if format == StoreFormat::Legacy {
            tracing::info!(
                "Loaded legacy state file {:?}; it will be rewritten in the current format on next save",
                self.path
            );
        }
        tracing::debug!("Loaded state for {} branch(es)", store.branches.len());

        Ok(store)
    }

    fn save(&self, store: &PersistedStore) -> Result<(), StorageError> {
        let dir = self.parent_dir();
        fs::create_dir_all(&dir).map_err(|e| self.io_error(e))?;

        let bytes = format::encode(store).map_err(StorageError::Serialize)?;

        // 1. Write to temp file in the same directory
        let mut temp = NamedTempFile::new_in(&dir).map_err(|e| self.io_error(e))?;
        temp.write_all(&bytes).map_err(|e| self.io_error(e))?;
        temp.write_all(b"\n").map_err(|e| self.io_error(e))?;
        temp.as_file().sync_all().map_err(|e| self.io_error(e))?;

        // 2. Atomic rename over the target
        temp.persist(&self.path).map_err(|e| self.io_error(e.error))?;

        Ok(())
    }
}
