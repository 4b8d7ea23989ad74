//! Record pages and the source abstraction.
//!
//! [`RecordSource`] is the engine's only view of the remote record store:
//! execute a query, fetch the continuation of a previous response, refresh
//! credentials. The engine never sees HTTP; it sees [`QueryPage`]s and the
//! [`SourceError`] taxonomy it needs to drive recovery.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Timestamp layout used by the record store, e.g.
/// `2024-01-01T00:00:01.000+0000`.
pub const RECORD_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

/// Errors raised by a record source.
///
/// The engine reacts to the first two variants specifically: an expired
/// session triggers a single-flight reauthentication, a revoked
/// continuation clears the pagination handle and restarts the walk from a
/// fresh query. Everything else ends the stream's tick and is retried on
/// the next one.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The access token was rejected; reauthentication is required.
    #[error("session expired")]
    SessionExpired,

    /// The server revoked the pagination handle.
    #[error("continuation no longer valid: {0}")]
    InvalidContinuation(String),

    /// Connect failure, timeout, or an unclassified server error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body was not the expected JSON shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// A record is missing `Id` or carries an unparseable
    /// `LastModifiedDate`.
    #[error("malformed record: {0}")]
    BadRecord(String),
}

/// One record as returned by the record store.
///
/// The body stays opaque to the engine; only `Id` and `LastModifiedDate`
/// are parsed out, for deduplication and watermark advancement.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    /// The record's `Id` field.
    pub id: String,
    /// The record's parsed `LastModifiedDate`.
    pub last_modified_at: DateTime<Utc>,
    /// The full record as received.
    pub body: Value,
}

impl SourceRecord {
    /// Wraps a raw record, extracting `Id` and `LastModifiedDate`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::BadRecord`] if either field is missing or the
    /// timestamp does not match [`RECORD_TIMESTAMP_FORMAT`].
    pub fn from_value(body: Value) -> Result<Self, SourceError> {
        let id = body
            .get("Id")
            .and_then(Value::as_str)
            .ok_or_else(|| SourceError::BadRecord("record has no Id field".into()))?
            .to_string();
        let raw_ts = body
            .get("LastModifiedDate")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                SourceError::BadRecord(format!("record {id} has no LastModifiedDate field"))
            })?;
        let last_modified_at = parse_record_timestamp(raw_ts).map_err(|e| {
            SourceError::BadRecord(format!("record {id}: bad LastModifiedDate {raw_ts:?}: {e}"))
        })?;
        Ok(Self {
            id,
            last_modified_at,
            body,
        })
    }
}

/// Parses a record-store timestamp (`2024-01-01T00:00:01.000+0000`).
///
/// # Errors
///
/// Returns the underlying parse error when the value does not match
/// [`RECORD_TIMESTAMP_FORMAT`].
pub fn parse_record_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_str(raw, RECORD_TIMESTAMP_FORMAT).map(|dt| dt.with_timezone(&Utc))
}

/// One page of a query response.
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    /// Records in `(LastModifiedDate, Id)` order.
    pub records: Vec<SourceRecord>,
    /// Whether this is the final page of the response.
    pub done: bool,
    /// Handle for the next page, when the server has more.
    pub next_url: Option<String>,
}

/// A remote record store that can execute queries and page through results.
///
/// Implementations own transport, authentication, and error classification.
/// `reauthenticate` must be single-flight: one caller refreshes while
/// concurrent callers return immediately and rely on the next poll.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Executes a query string and returns the first page.
    async fn execute(&self, soql: &str) -> Result<QueryPage, SourceError>;

    /// Fetches the continuation of a previous response.
    async fn fetch_next(&self, next_url: &str) -> Result<QueryPage, SourceError>;

    /// Refreshes credentials after a [`SourceError::SessionExpired`].
    async fn reauthenticate(&self);
}
