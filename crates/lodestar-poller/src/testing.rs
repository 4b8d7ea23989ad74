//! Test support: a scripted record source and a recording handler.
//!
//! [`MockRecordSource`] answers `execute`/`fetch_next` from queued
//! replies, routed by a substring of the query (or the exact continuation
//! URL) so several streams can share one source deterministically. When
//! no queued reply matches, it answers with an empty final page, which is
//! what a caught-up stream sees in production.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use lodestar_core::source::{QueryPage, RecordSource, SourceError, SourceRecord};
use lodestar_core::DeliveryHandler;

/// Builds a record with the given `Id` and wire-format `LastModifiedDate`
/// (`2024-01-01T00:00:01.000+0000`).
///
/// # Panics
///
/// Panics when the timestamp is not in wire format.
#[must_use]
pub fn record(id: &str, last_modified: &str) -> SourceRecord {
    SourceRecord::from_value(json!({"Id": id, "LastModifiedDate": last_modified}))
        .expect("test record timestamp must be in wire format")
}

/// Builds a page from `(id, last_modified)` pairs.
#[must_use]
pub fn page(records: &[(&str, &str)], done: bool, next_url: Option<&str>) -> QueryPage {
    QueryPage {
        records: records.iter().map(|(id, at)| record(id, at)).collect(),
        done,
        next_url: next_url.map(String::from),
    }
}

/// A scripted [`RecordSource`].
#[derive(Default)]
pub struct MockRecordSource {
    execute_replies: Mutex<VecDeque<(String, Result<QueryPage, SourceError>)>>,
    fetch_replies: Mutex<VecDeque<(String, Result<QueryPage, SourceError>)>>,
    executed: Mutex<Vec<String>>,
    fetched: Mutex<Vec<String>>,
    reauth_calls: AtomicUsize,
}

impl MockRecordSource {
    /// Creates a source with no queued replies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a reply for the next `execute` call.
    pub fn queue_execute(&self, reply: Result<QueryPage, SourceError>) {
        self.queue_execute_for("", reply);
    }

    /// Queues a reply for the next `execute` whose query contains
    /// `needle`.
    pub fn queue_execute_for(&self, needle: &str, reply: Result<QueryPage, SourceError>) {
        self.execute_replies
            .lock()
            .push_back((needle.to_string(), reply));
    }

    /// Queues a reply for the next `fetch_next` of exactly `next_url`.
    pub fn queue_fetch_for(&self, next_url: &str, reply: Result<QueryPage, SourceError>) {
        self.fetch_replies
            .lock()
            .push_back((next_url.to_string(), reply));
    }

    /// Every query string passed to `execute`, in order.
    #[must_use]
    pub fn executed_queries(&self) -> Vec<String> {
        self.executed.lock().clone()
    }

    /// Every continuation URL passed to `fetch_next`, in order.
    #[must_use]
    pub fn fetched_urls(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }

    /// How many times `reauthenticate` ran.
    #[must_use]
    pub fn reauth_count(&self) -> usize {
        self.reauth_calls.load(Ordering::SeqCst)
    }

    fn pop_matching(
        queue: &Mutex<VecDeque<(String, Result<QueryPage, SourceError>)>>,
        haystack: &str,
    ) -> Option<Result<QueryPage, SourceError>> {
        let mut queue = queue.lock();
        let index = queue
            .iter()
            .position(|(needle, _)| haystack.contains(needle.as_str()))?;
        queue.remove(index).map(|(_, reply)| reply)
    }
}

#[async_trait]
impl RecordSource for MockRecordSource {
    async fn execute(&self, soql: &str) -> Result<QueryPage, SourceError> {
        self.executed.lock().push(soql.to_string());
        Self::pop_matching(&self.execute_replies, soql).unwrap_or_else(|| {
            Ok(QueryPage {
                records: Vec::new(),
                done: true,
                next_url: None,
            })
        })
    }

    async fn fetch_next(&self, next_url: &str) -> Result<QueryPage, SourceError> {
        self.fetched.lock().push(next_url.to_string());
        Self::pop_matching(&self.fetch_replies, next_url).unwrap_or_else(|| {
            Ok(QueryPage {
                records: Vec::new(),
                done: true,
                next_url: None,
            })
        })
    }

    async fn reauthenticate(&self) {
        self.reauth_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// A [`DeliveryHandler`] that records every batch it receives.
///
/// Commit decisions come from a queue; when the queue is empty the
/// handler commits.
#[derive(Default)]
pub struct RecordingHandler {
    batches: Mutex<Vec<Value>>,
    commit_replies: Mutex<VecDeque<bool>>,
}

impl RecordingHandler {
    /// Creates a handler that commits every batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a commit decision for an upcoming batch.
    pub fn queue_commit(&self, commit: bool) {
        self.commit_replies.lock().push_back(commit);
    }

    /// The delivered batches, each parsed back into a JSON array.
    #[must_use]
    pub fn batches(&self) -> Vec<Value> {
        self.batches.lock().clone()
    }

    /// The `Id` fields of every delivered record, in delivery order.
    #[must_use]
    pub fn delivered_ids(&self) -> Vec<String> {
        self.batches
            .lock()
            .iter()
            .flat_map(|batch| batch.as_array().cloned().unwrap_or_default())
            .filter_map(|record| record.get("Id").and_then(Value::as_str).map(String::from))
            .collect()
    }
}

#[async_trait]
impl DeliveryHandler for RecordingHandler {
    async fn deliver(&self, records: &[u8]) -> bool {
        let parsed: Value = serde_json::from_slice(records)
            .expect("delivered batches must be valid JSON arrays");
        self.batches.lock().push(parsed);
        self.commit_replies.lock().pop_front().unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_reply_is_empty_final_page() {
        let source = MockRecordSource::new();
        let page = source.execute("select Id from Contact").await.unwrap();
        assert!(page.records.is_empty());
        assert!(page.done);
    }

    #[tokio::test]
    async fn test_replies_route_by_needle() {
        let source = MockRecordSource::new();
        source.queue_execute_for(
            "from ObjectB",
            Ok(page(&[("B1", "2024-01-01T00:00:00.000+0000")], true, None)),
        );
        source.queue_execute_for(
            "from ObjectA",
            Ok(page(&[("A1", "2024-01-01T00:00:00.000+0000")], true, None)),
        );

        let got = source.execute("select Id from ObjectA where ...").await.unwrap();
        assert_eq!(got.records[0].id, "A1");
        let got = source.execute("select Id from ObjectB where ...").await.unwrap();
        assert_eq!(got.records[0].id, "B1");
    }

    #[tokio::test]
    async fn test_recording_handler_roundtrip() {
        let handler = RecordingHandler::new();
        handler.queue_commit(false);
        assert!(!handler.deliver(br#"[{"Id":"001A"}]"#).await);
        assert!(handler.deliver(br#"[{"Id":"001B"}]"#).await);
        assert_eq!(handler.delivered_ids(), vec!["001A", "001B"]);
    }
}
