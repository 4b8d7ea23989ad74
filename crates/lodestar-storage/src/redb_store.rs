//! Embedded on-disk store backed by redb.
//!
//! One table maps stream keys to the JSON encoding of their position.
//! Every save runs in its own write transaction, so a save is atomic per
//! key and saves for different keys cannot interleave partial state.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use lodestar_core::Position;

use crate::store::{PositionStore, StoreError};

const POSITIONS: TableDefinition<'static, &str, &[u8]> = TableDefinition::new("positions");

/// File name of the database inside the configured persistence directory.
const DB_FILE: &str = "positions.redb";

/// Position store on an embedded redb database.
#[derive(Debug)]
pub struct RedbPositionStore {
    db: Arc<Database>,
}

impl RedbPositionStore {
    /// Opens (or creates) the store under the given directory.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the directory cannot be created or the
    /// database cannot be opened.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir.as_ref())?;
        let db = Database::create(dir.as_ref().join(DB_FILE))?;
        // Eagerly create the table so first-run loads see "absent" rather
        // than a missing table.
        let txn = db.begin_write().map_err(box_txn_error)?;
        {
            let _ = txn.open_table(POSITIONS)?;
        }
        txn.commit()?;
        Ok(Self { db: Arc::new(db) })
    }
}

impl PositionStore for RedbPositionStore {
    fn load(&self, key: &str) -> Result<Option<Position>, StoreError> {
        let txn = self.db.begin_read().map_err(box_txn_error)?;
        let table = txn.open_table(POSITIONS)?;
        match table.get(key)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    fn save(&self, key: &str, position: &Position) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec(position)?;
        let txn = self.db.begin_write().map_err(box_txn_error)?;
        {
            let mut table = txn.open_table(POSITIONS)?;
            table.insert(key, encoded.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }
}

fn box_txn_error(e: redb::TransactionError) -> StoreError {
    StoreError::Transaction(Box::new(e))
}
