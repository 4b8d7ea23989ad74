//! The poller facade and tick scheduler.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use lodestar_core::gate::validate_dependencies;
use lodestar_core::{DependencyGate, Position, RecordSource, StreamSpec};
use lodestar_storage::{PositionStore, RedbPositionStore};

use crate::config::PollerConfig;
use crate::error::PollerError;
use crate::runner::{poll_stream, RunnerContext, StreamState};

/// One configured stream and its runner-owned state.
struct StreamEntry {
    spec: StreamSpec,
    state: Arc<Mutex<StreamState>>,
}

/// Owns the streams, their positions, the dependency gate, and the tick
/// loop.
///
/// Construction validates the configuration and the dependency graph,
/// opens the position store when persistence is enabled, and loads each
/// stream's starting position (override > persisted > from the
/// beginning). After construction nothing is fatal: stream-level errors
/// are logged and retried on later ticks.
pub struct Poller {
    entries: Vec<StreamEntry>,
    ctx: Arc<RunnerContext>,
    config: PollerConfig,
    shutdown: Arc<Notify>,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("config", &self.config)
            .field("stream_count", &self.entries.len())
            .finish()
    }
}

impl Poller {
    /// Builds a poller from stream definitions, a record source, and
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PollerError::InvalidConfig`] for an empty stream set,
    /// blank or duplicate keys, or a zero poll interval;
    /// [`PollerError::Dependency`] for unknown dependency keys or cycles
    /// (unless `skip_dependency_check`); [`PollerError::Store`] when the
    /// position store cannot be opened or a persisted position fails to
    /// load.
    pub fn new(
        streams: Vec<StreamSpec>,
        source: Arc<dyn RecordSource>,
        config: PollerConfig,
    ) -> Result<Self, PollerError> {
        let store: Option<Arc<dyn PositionStore>> = if config.persistence_enabled {
            Some(Arc::new(RedbPositionStore::open(&config.persistence_path)?))
        } else {
            None
        };
        Self::build(streams, source, store, config)
    }

    /// Like [`new`](Self::new), but with a caller-supplied position store.
    ///
    /// Any store with atomic per-key get/put works; `persistence_enabled`
    /// and `persistence_path` are ignored.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new), except the store is taken as given.
    pub fn with_store(
        streams: Vec<StreamSpec>,
        source: Arc<dyn RecordSource>,
        store: Arc<dyn PositionStore>,
        config: PollerConfig,
    ) -> Result<Self, PollerError> {
        Self::build(streams, source, Some(store), config)
    }

    fn build(
        streams: Vec<StreamSpec>,
        source: Arc<dyn RecordSource>,
        store: Option<Arc<dyn PositionStore>>,
        config: PollerConfig,
    ) -> Result<Self, PollerError> {
        if streams.is_empty() {
            return Err(PollerError::InvalidConfig(
                "at least one stream is required".into(),
            ));
        }
        if config.poll_interval.is_zero() {
            return Err(PollerError::InvalidConfig(
                "poll_interval must be non-zero".into(),
            ));
        }
        let mut keys = HashSet::new();
        for spec in &streams {
            if spec.key.is_empty() {
                return Err(PollerError::InvalidConfig(
                    "stream keys must be non-empty".into(),
                ));
            }
            if !keys.insert(spec.key.clone()) {
                return Err(PollerError::InvalidConfig(format!(
                    "duplicate stream key '{}'",
                    spec.key
                )));
            }
        }
        if !config.skip_dependency_check {
            validate_dependencies(&streams)?;
        }

        let mut entries = Vec::with_capacity(streams.len());
        for spec in streams {
            let position = load_position(&spec.key, store.as_deref(), &config)?;
            info!(
                stream = %spec.key,
                watermark = ?position.last_modified_at,
                "loaded starting position"
            );
            entries.push(StreamEntry {
                spec,
                state: Arc::new(Mutex::new(StreamState { position })),
            });
        }

        let gate = Arc::new(DependencyGate::new(
            entries.iter().map(|entry| entry.spec.key.clone()),
        ));
        let ctx = Arc::new(RunnerContext {
            source,
            store,
            gate,
            correction: config.last_modified_correction,
            skip_dependency_check: config.skip_dependency_check,
        });

        Ok(Self {
            entries,
            ctx,
            config,
            shutdown: Arc::new(Notify::new()),
        })
    }

    /// Runs the tick loop until [`stop`](Self::stop) is called.
    ///
    /// The first tick fires one interval after this call. Ticks are
    /// coalesced: a tick never waits for workers spawned by an earlier
    /// one, and a stream still mid-poll simply skips the new tick.
    pub async fn run(&self) {
        info!(
            streams = self.entries.len(),
            interval_ms = self.config.poll_interval.as_millis(),
            persistence = self.config.persistence_enabled,
            "poller started"
        );
        let mut ticker = interval_at(
            Instant::now() + self.config.poll_interval,
            self.config.poll_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                () = self.shutdown.notified() => {
                    info!("poller stopped");
                    return;
                }

                _ = ticker.tick() => {
                    // Fire and forget; the per-stream lock decides whether
                    // each worker actually runs.
                    drop(self.spawn_workers());
                }
            }
        }
    }

    /// Stops the tick loop. In-flight workers complete naturally.
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }

    /// Fans out one worker per stream and waits for all of them.
    ///
    /// Equivalent to a single tick, but synchronous with the caller; used
    /// by embedders and tests that want deterministic passes.
    pub async fn poll_once(&self) {
        for handle in self.spawn_workers() {
            if let Err(e) = handle.await {
                warn!(error = %e, "stream worker panicked");
            }
        }
    }

    /// A stream's current position, or `None` for an unknown key.
    ///
    /// Waits for an in-flight poll of that stream to finish.
    pub async fn position(&self, key: &str) -> Option<Position> {
        let entry = self.entries.iter().find(|entry| entry.spec.key == key)?;
        Some(entry.state.lock().await.position.clone())
    }

    /// Whether a stream's latest response reported the final page.
    #[must_use]
    pub fn is_caught_up(&self, key: &str) -> bool {
        self.ctx.gate.is_caught_up(key)
    }

    fn spawn_workers(&self) -> Vec<JoinHandle<()>> {
        self.entries
            .iter()
            .map(|entry| {
                tokio::spawn(poll_stream(
                    Arc::clone(&self.ctx),
                    entry.spec.clone(),
                    Arc::clone(&entry.state),
                ))
            })
            .collect()
    }
}

/// Starting position for one stream: override > persisted > zero.
fn load_position(
    key: &str,
    store: Option<&dyn PositionStore>,
    config: &PollerConfig,
) -> Result<Position, PollerError> {
    if let Some(watermark) = config.startup_position_overrides.get(key) {
        return Ok(Position::starting_at(*watermark));
    }
    if let Some(store) = store {
        return Ok(store.load(key)?.unwrap_or_default());
    }
    Ok(Position::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::{DateTime, Utc};

    use crate::testing::MockRecordSource;

    fn noop_stream(key: &str, deps: &[&str]) -> StreamSpec {
        StreamSpec::new(key, || "select Id from Contact".to_string(), |_: &[u8]| true)
            .depends_on(deps.iter().copied())
    }

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn mock() -> Arc<MockRecordSource> {
        Arc::new(MockRecordSource::new())
    }

    #[test]
    fn test_rejects_empty_stream_set() {
        let err = Poller::new(vec![], mock(), PollerConfig::default()).unwrap_err();
        assert!(matches!(err, PollerError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_blank_key() {
        let err = Poller::new(vec![noop_stream("", &[])], mock(), PollerConfig::default())
            .unwrap_err();
        assert!(matches!(err, PollerError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_duplicate_keys() {
        let streams = vec![noop_stream("a", &[]), noop_stream("a", &[])];
        let err = Poller::new(streams, mock(), PollerConfig::default()).unwrap_err();
        assert!(matches!(err, PollerError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_zero_interval() {
        let config = PollerConfig {
            poll_interval: Duration::ZERO,
            ..PollerConfig::default()
        };
        let err = Poller::new(vec![noop_stream("a", &[])], mock(), config).unwrap_err();
        assert!(matches!(err, PollerError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_unknown_dependency() {
        let err = Poller::new(
            vec![noop_stream("a", &["ghost"])],
            mock(),
            PollerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PollerError::Dependency(_)));
    }

    #[test]
    fn test_rejects_dependency_cycle() {
        let streams = vec![noop_stream("a", &["b"]), noop_stream("b", &["a"])];
        let err = Poller::new(streams, mock(), PollerConfig::default()).unwrap_err();
        assert!(matches!(err, PollerError::Dependency(_)));
    }

    #[test]
    fn test_skip_flag_bypasses_dependency_validation() {
        let config = PollerConfig {
            skip_dependency_check: true,
            ..PollerConfig::default()
        };
        let streams = vec![noop_stream("a", &["b"]), noop_stream("b", &["a"])];
        assert!(Poller::new(streams, mock(), config).is_ok());
    }

    #[tokio::test]
    async fn test_override_sets_starting_position() {
        let config = PollerConfig {
            startup_position_overrides: [("a".to_string(), ts("2024-03-01T00:00:00Z"))]
                .into_iter()
                .collect(),
            ..PollerConfig::default()
        };
        let poller = Poller::new(vec![noop_stream("a", &[])], mock(), config).unwrap();
        let position = poller.position("a").await.unwrap();
        assert_eq!(position.last_modified_at, Some(ts("2024-03-01T00:00:00Z")));
    }

    #[tokio::test]
    async fn test_position_unknown_key_is_none() {
        let poller =
            Poller::new(vec![noop_stream("a", &[])], mock(), PollerConfig::default()).unwrap();
        assert!(poller.position("ghost").await.is_none());
    }
}
