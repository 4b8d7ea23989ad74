//! SOQL poll-query composition.
//!
//! Each poll re-issues the stream's base query with an injected lower bound
//! on `LastModifiedDate` and a composite `(LastModifiedDate, Id)` ordering.
//! The bound is pulled back by a configured correction so every cycle
//! re-scans the store's eventual-consistency window; records already
//! delivered inside that window are removed by the dedup filter.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};

use crate::position::Position;

/// Builds the SOQL to send for one poll iteration.
///
/// The injected clause uses `and` when the base query already contains a
/// `where` (case-insensitive), `where` otherwise. The bound is
/// `min(position watermark, now - correction)`; a from-the-beginning
/// position bounds at the Unix epoch.
///
/// The timestamp renders as RFC-3339 UTC with a `Z` suffix. A `+00:00`
/// offset must never reach the wire un-encoded: SOQL reads `+` as a space
/// and then rejects the mangled datetime.
#[must_use]
pub fn poll_query(
    base: &str,
    position: &Position,
    correction: Duration,
    now: DateTime<Utc>,
) -> String {
    let base = base.trim();
    let operator = if base.to_lowercase().contains("where") {
        "and"
    } else {
        "where"
    };
    let bound = position.watermark_or_epoch().min(corrected_now(now, correction));
    format!(
        "{base} {operator} LastModifiedDate >= {} order by LastModifiedDate, Id",
        bound.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// `now - correction`, clamped to the epoch when the correction is
/// unrepresentably large.
fn corrected_now(now: DateTime<Utc>, correction: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(correction)
        .ok()
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIVE_MINUTES: Duration = Duration::from_secs(300);

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_injects_where_clause() {
        let query = poll_query(
            "select fields(all) from Property__c",
            &Position::default(),
            FIVE_MINUTES,
            ts("2024-01-01T12:00:00Z"),
        );
        assert_eq!(
            query,
            "select fields(all) from Property__c where LastModifiedDate >= \
             1970-01-01T00:00:00Z order by LastModifiedDate, Id"
        );
    }

    #[test]
    fn test_appends_and_when_where_present() {
        let query = poll_query(
            "select Id from Contact WHERE IsDeleted = false",
            &Position::default(),
            FIVE_MINUTES,
            ts("2024-01-01T12:00:00Z"),
        );
        assert!(query.contains("IsDeleted = false and LastModifiedDate >="));
    }

    #[test]
    fn test_trims_base_query() {
        let query = poll_query(
            "  select Id from Contact  ",
            &Position::default(),
            FIVE_MINUTES,
            ts("2024-01-01T12:00:00Z"),
        );
        assert!(query.starts_with("select Id from Contact where"));
    }

    #[test]
    fn test_bound_is_watermark_when_older_than_correction_window() {
        let position = Position::starting_at(ts("2024-01-01T11:00:00Z"));
        let query = poll_query(
            "select Id from Contact",
            &position,
            FIVE_MINUTES,
            ts("2024-01-01T12:00:00Z"),
        );
        assert!(query.contains("LastModifiedDate >= 2024-01-01T11:00:00Z"));
    }

    #[test]
    fn test_bound_pulled_back_for_recent_watermark() {
        // Watermark 30s ago sits inside the 5m consistency window; the
        // bound retreats to now - correction.
        let position = Position::starting_at(ts("2024-01-01T11:59:30Z"));
        let query = poll_query(
            "select Id from Contact",
            &position,
            FIVE_MINUTES,
            ts("2024-01-01T12:00:00Z"),
        );
        assert!(query.contains("LastModifiedDate >= 2024-01-01T11:55:00Z"));
    }

    #[test]
    fn test_bound_renders_with_z_suffix() {
        let query = poll_query(
            "select Id from Contact",
            &Position::starting_at(ts("2024-01-01T00:00:00Z")),
            FIVE_MINUTES,
            ts("2024-01-01T12:00:00Z"),
        );
        assert!(!query.contains('+'));
        assert!(query.contains("Z order by LastModifiedDate, Id"));
    }

    #[test]
    fn test_zero_correction_keeps_watermark() {
        let position = Position::starting_at(ts("2024-01-01T11:59:59Z"));
        let query = poll_query(
            "select Id from Contact",
            &position,
            Duration::ZERO,
            ts("2024-01-01T12:00:00Z"),
        );
        assert!(query.contains("LastModifiedDate >= 2024-01-01T11:59:59Z"));
    }

    #[test]
    fn test_oversized_correction_clamps_to_epoch() {
        let position = Position::starting_at(ts("2024-01-01T12:00:00Z"));
        let query = poll_query(
            "select Id from Contact",
            &position,
            Duration::from_secs(u64::MAX),
            ts("2024-01-01T12:00:00Z"),
        );
        assert!(query.contains("LastModifiedDate >= 1970-01-01T00:00:00Z"));
    }
}
