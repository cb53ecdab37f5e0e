use super::PersistedStore;
use crate::error::StorageError;

/// Durable home of the branch state
pub trait StateStore: Send + Sync {
    /// Read the persisted state, upgrading legacy shapes in memory.
    /// Creates and writes the default state if none exists.
    fn load(&self) -> Result<PersistedStore, StorageError>;

    /// Atomically replace the persisted state.
    /// Implementation should ensure atomicity (temp file + rename or equivalent).
    fn save(&self, store: &PersistedStore) -> Result<(), StorageError>;
}
