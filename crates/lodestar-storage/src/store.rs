//! The store contract and an in-memory implementation.

use std::collections::HashMap;

use parking_lot::Mutex;

use lodestar_core::Position;

/// Errors from position storage.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem error preparing the store location.
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    /// redb database error.
    #[error("store open error: {0}")]
    Open(#[from] redb::DatabaseError),

    /// redb table error.
    #[error("store table error: {0}")]
    Table(#[from] redb::TableError),

    /// redb storage error.
    #[error("store storage error: {0}")]
    Storage(#[from] redb::StorageError),

    /// redb commit error.
    #[error("store commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// redb transaction error.
    #[error("store transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),

    /// Position JSON encode/decode failure.
    #[error("position serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Per-stream position persistence.
///
/// `load` distinguishes "no position saved yet" (`Ok(None)`) from real
/// failures; a missing key is the normal first-run case, never an error.
/// `save` atomically replaces the prior value for its key, and saves for
/// different keys must not interfere.
pub trait PositionStore: Send + Sync {
    /// Loads the persisted position for a stream key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on storage or decode failure. A missing key
    /// is `Ok(None)`.
    fn load(&self, key: &str) -> Result<Option<Position>, StoreError>;

    /// Persists a stream's position, replacing any prior value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on storage or encode failure.
    fn save(&self, key: &str, position: &Position) -> Result<(), StoreError>;
}

/// Position store held entirely in memory.
///
/// Backs persistence-disabled runs and tests; contents vanish with the
/// process.
#[derive(Debug, Default)]
pub struct MemoryPositionStore {
    positions: Mutex<HashMap<String, Position>>,
}

impl MemoryPositionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PositionStore for MemoryPositionStore {
    fn load(&self, key: &str) -> Result<Option<Position>, StoreError> {
        Ok(self.positions.lock().get(key).cloned())
    }

    fn save(&self, key: &str, position: &Position) -> Result<(), StoreError> {
        self.positions.lock().insert(key.to_string(), position.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    #[test]
    fn test_memory_absent_is_none() {
        let store = MemoryPositionStore::new();
        assert!(store.load("contacts").unwrap().is_none());
    }

    #[test]
    fn test_memory_save_load_roundtrip() {
        let store = MemoryPositionStore::new();
        let position = Position::starting_at(
            "2024-01-01T00:00:01Z".parse::<DateTime<Utc>>().unwrap(),
        );
        store.save("contacts", &position).unwrap();
        assert_eq!(store.load("contacts").unwrap(), Some(position));
    }

    #[test]
    fn test_memory_keys_are_independent() {
        let store = MemoryPositionStore::new();
        let position = Position::starting_at(
            "2024-01-01T00:00:01Z".parse::<DateTime<Utc>>().unwrap(),
        );
        store.save("contacts", &position).unwrap();
        assert!(store.load("accounts").unwrap().is_none());
    }
}
