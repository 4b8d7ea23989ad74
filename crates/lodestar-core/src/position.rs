//! Per-stream poll position.
//!
//! A [`Position`] is the durable watermark for one stream: the timestamp of
//! the most recently delivered record, the ids delivered at that exact
//! timestamp (the tie window), and the server's pagination handle for an
//! in-flight query walk.
//!
//! The struct serializes to self-describing JSON. Fields absent from an
//! older persisted value fall back to their defaults, so positions written
//! by earlier versions load cleanly.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable watermark for a single stream.
///
/// Invariant: every record delivered at exactly `last_modified_at` has its
/// id in `seen_ids`, mapped to the timestamp it was delivered at. Entries
/// below the watermark are unreachable by the next `>=` query and may be
/// purged; [`crate::engine::advanced`] does so on every commit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Position {
    /// Timestamp of the most recently delivered record. `None` means the
    /// stream polls from the beginning.
    #[serde(rename = "lastModifiedDate")]
    pub last_modified_at: Option<DateTime<Utc>>,

    /// Ids delivered at the watermark timestamp, mapped to the modification
    /// timestamp they carried when delivered. Kept to suppress redelivery
    /// inside a timestamp tie; a record reappearing with a newer timestamp
    /// is delivered again.
    #[serde(rename = "previousRecordIds")]
    pub seen_ids: HashMap<String, DateTime<Utc>>,

    /// Server-issued handle for the next page of the current response.
    /// Advisory: the server may revoke it at any time, in which case the
    /// walk restarts from a fresh query.
    #[serde(rename = "nextUrl")]
    pub continuation_url: Option<String>,
}

impl Position {
    /// Position starting at the given watermark with an empty tie window.
    #[must_use]
    pub fn starting_at(watermark: DateTime<Utc>) -> Self {
        Self {
            last_modified_at: Some(watermark),
            ..Self::default()
        }
    }

    /// The watermark, or the Unix epoch for a from-the-beginning position.
    #[must_use]
    pub fn watermark_or_epoch(&self) -> DateTime<Utc> {
        self.last_modified_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// The continuation handle, if one is set and non-empty.
    ///
    /// Older persisted positions encode "no continuation" as an empty
    /// string; both spellings read back as `None`.
    #[must_use]
    pub fn continuation(&self) -> Option<&str> {
        self.continuation_url.as_deref().filter(|url| !url.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_default_is_from_the_beginning() {
        let pos = Position::default();
        assert!(pos.last_modified_at.is_none());
        assert!(pos.seen_ids.is_empty());
        assert!(pos.continuation().is_none());
        assert_eq!(pos.watermark_or_epoch(), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut pos = Position::starting_at(ts("2024-01-01T00:00:01Z"));
        pos.seen_ids
            .insert("001A".into(), ts("2024-01-01T00:00:01Z"));
        pos.continuation_url = Some("/services/data/v54.0/query/01g-2000".into());

        let json = serde_json::to_string(&pos).unwrap();
        let restored: Position = serde_json::from_str(&json).unwrap();
        assert_eq!(pos, restored);
    }

    #[test]
    fn test_persisted_field_names() {
        let pos = Position::starting_at(ts("2024-01-01T00:00:01Z"));
        let json = serde_json::to_value(&pos).unwrap();
        assert!(json.get("lastModifiedDate").is_some());
        assert!(json.get("previousRecordIds").is_some());
        assert!(json.get("nextUrl").is_some());
    }

    #[test]
    fn test_missing_fields_default() {
        let restored: Position =
            serde_json::from_str(r#"{"lastModifiedDate":"2024-01-01T00:00:01Z"}"#).unwrap();
        assert_eq!(restored.last_modified_at, Some(ts("2024-01-01T00:00:01Z")));
        assert!(restored.seen_ids.is_empty());
        assert!(restored.continuation_url.is_none());
    }

    #[test]
    fn test_empty_continuation_reads_as_none() {
        let restored: Position = serde_json::from_str(r#"{"nextUrl":""}"#).unwrap();
        assert!(restored.continuation().is_none());
    }
}
