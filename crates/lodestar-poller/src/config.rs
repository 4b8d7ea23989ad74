//! Poller configuration.
//!
//! An explicit construction-time object: everything the poller needs is
//! passed in, nothing is read from process-global state.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::PollerError;

/// Configuration for a [`crate::Poller`].
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Tick period; every tick fans out one worker per stream.
    pub poll_interval: Duration,

    /// Whether positions survive restarts. When false, positions live in
    /// memory only and every start polls from the configured overrides or
    /// the beginning.
    pub persistence_enabled: bool,

    /// Directory holding the embedded position database.
    pub persistence_path: PathBuf,

    /// Consistency-window pullback applied to every poll query's
    /// `LastModifiedDate` bound. Widen it if the org shows records
    /// becoming visible late.
    pub last_modified_correction: Duration,

    /// Disables dependency validation at startup and the per-iteration
    /// gate check.
    pub skip_dependency_check: bool,

    /// Per-stream starting watermarks that override persisted positions
    /// at startup.
    pub startup_position_overrides: HashMap<String, DateTime<Utc>>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            persistence_enabled: false,
            persistence_path: PathBuf::from("."),
            last_modified_correction: Duration::from_secs(300),
            skip_dependency_check: false,
            startup_position_overrides: HashMap::new(),
        }
    }
}

/// Parses `key=timestamp,key=timestamp` into a startup-override map.
///
/// Timestamps are RFC-3339. An empty input yields an empty map.
///
/// # Errors
///
/// Returns [`PollerError::InvalidConfig`] for entries without exactly one
/// `=` or with an unparseable timestamp.
pub fn parse_position_overrides(
    raw: &str,
) -> Result<HashMap<String, DateTime<Utc>>, PollerError> {
    let mut overrides = HashMap::new();
    if raw.is_empty() {
        return Ok(overrides);
    }
    for entry in raw.split(',') {
        let mut parts = entry.splitn(2, '=');
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            return Err(PollerError::InvalidConfig(format!(
                "position override {entry:?} is not key=timestamp"
            )));
        };
        let timestamp = value.parse::<DateTime<Utc>>().map_err(|e| {
            PollerError::InvalidConfig(format!(
                "position override for {key:?} has a bad timestamp {value:?}: {e}"
            ))
        })?;
        overrides.insert(key.to_string(), timestamp);
    }
    Ok(overrides)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PollerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert!(!config.persistence_enabled);
        assert_eq!(config.persistence_path, PathBuf::from("."));
        assert_eq!(config.last_modified_correction, Duration::from_secs(300));
        assert!(!config.skip_dependency_check);
        assert!(config.startup_position_overrides.is_empty());
    }

    #[test]
    fn test_parse_overrides_empty() {
        assert!(parse_position_overrides("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_overrides_multiple_entries() {
        let overrides = parse_position_overrides(
            "contacts=2024-01-01T00:00:00Z,accounts=2024-06-01T12:30:00Z",
        )
        .unwrap();
        assert_eq!(overrides.len(), 2);
        assert_eq!(
            overrides["contacts"],
            "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert_eq!(
            overrides["accounts"],
            "2024-06-01T12:30:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn test_parse_overrides_missing_separator() {
        assert!(parse_position_overrides("contacts").is_err());
    }

    #[test]
    fn test_parse_overrides_bad_timestamp() {
        assert!(parse_position_overrides("contacts=yesterday").is_err());
    }
}
