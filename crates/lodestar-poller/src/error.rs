//! Error types for construction and startup.

use lodestar_core::gate::DependencyError;
use lodestar_storage::StoreError;

/// Fatal errors from poller construction.
///
/// Once constructed, the poller never exits on stream-level failures;
/// those are logged and retried on subsequent ticks.
#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    /// A configuration value is unusable.
    #[error("invalid poller configuration: {0}")]
    InvalidConfig(String),

    /// The dependency graph names unknown streams or contains a cycle.
    #[error(transparent)]
    Dependency(#[from] DependencyError),

    /// The position store failed to open or a persisted position failed
    /// to load.
    #[error(transparent)]
    Store(#[from] StoreError),
}
