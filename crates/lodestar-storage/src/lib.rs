//! # Lodestar Storage
//!
//! Durable per-stream positions. The poller loads positions at startup and
//! saves after every committed batch; any store with atomic per-key
//! get/put satisfies the [`PositionStore`] contract.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

/// The store contract and an in-memory implementation.
pub mod store;

/// Embedded on-disk store backed by redb.
pub mod redb_store;

pub use redb_store::RedbPositionStore;
pub use store::{MemoryPositionStore, PositionStore, StoreError};
