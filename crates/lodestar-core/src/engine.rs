//! Pure functions that filter pages and advance positions.
//!
//! The record store is eventually consistent, so every poll re-scans a
//! window behind the watermark and pages overlap with what earlier polls
//! already delivered. [`fresh_records`] removes the overlap;
//! [`advanced`] computes the position to commit after a delivered page.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::position::Position;
use crate::source::{QueryPage, SourceRecord};

/// Upper bound on the id→timestamp tie map carried in a position.
///
/// A tie window wider than this (more records sharing one
/// `LastModifiedDate` than the cap) loses dedup entries; the affected
/// records may be delivered again, which the at-least-once contract
/// permits. The store's millisecond resolution keeps real ties far below
/// this.
pub const SEEN_IDS_CAP: usize = 65_536;

/// Returns the records of `page_records` not yet delivered at their current
/// modification timestamp.
///
/// A record is dropped iff its id is in the position's tie map with the
/// exact timestamp it now carries. An id seen earlier but reappearing with
/// a newer timestamp was re-updated and is retained for redelivery.
#[must_use]
pub fn fresh_records<'a>(
    page_records: &'a [SourceRecord],
    position: &Position,
) -> Vec<&'a SourceRecord> {
    page_records
        .iter()
        .filter(|record| {
            position
                .seen_ids
                .get(&record.id)
                .is_none_or(|seen_at| *seen_at != record.last_modified_at)
        })
        .collect()
}

/// Computes the position to commit after delivering `page`.
///
/// The new watermark is the last record's timestamp (pages are ordered by
/// `(LastModifiedDate, Id)`). The tie map is carried over only when the
/// watermark did not move, then updated from every record of the page —
/// the unfiltered page, so the map covers records observed but not
/// delivered this round. Entries strictly below the new watermark are
/// unreachable by the next `>=` query and are purged.
///
/// Returns the position unchanged when the page has no records; callers
/// only commit after a non-empty delivery.
#[must_use]
pub fn advanced(position: &Position, page: &QueryPage) -> Position {
    let Some(last) = page.records.last() else {
        return position.clone();
    };
    let watermark = last.last_modified_at;

    let mut seen_ids: HashMap<String, DateTime<Utc>> =
        if position.last_modified_at == Some(watermark) {
            position.seen_ids.clone()
        } else {
            HashMap::new()
        };
    for record in &page.records {
        seen_ids.insert(record.id.clone(), record.last_modified_at);
    }
    seen_ids.retain(|_, seen_at| *seen_at >= watermark);

    if seen_ids.len() > SEEN_IDS_CAP {
        let excess = seen_ids.len() - SEEN_IDS_CAP;
        let victims: Vec<String> = seen_ids.keys().take(excess).cloned().collect();
        for id in &victims {
            seen_ids.remove(id);
        }
        tracing::warn!(
            dropped = excess,
            watermark = %watermark,
            "timestamp tie exceeded the dedup cap; dropped entries may be redelivered"
        );
    }

    Position {
        last_modified_at: Some(watermark),
        seen_ids,
        continuation_url: page.next_url.clone().filter(|url| !url.is_empty()),
    }
}
