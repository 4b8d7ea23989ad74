//! Per-stream poll passes.
//!
//! One pass drives a single stream through every page available right
//! now: dependency check, fetch (continuation or fresh query), dedup,
//! delivery, commit, repeat until the stream is caught up or an error
//! ends the tick. Errors never escape a pass; they are logged with the
//! stream key and the next tick retries.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use lodestar_core::source::SourceError;
use lodestar_core::{engine, soql, DependencyGate, Position, RecordSource, StreamSpec};
use lodestar_storage::PositionStore;

/// Shared collaborators handed to every stream worker.
pub(crate) struct RunnerContext {
    /// The remote record store.
    pub source: Arc<dyn RecordSource>,
    /// Durable position storage; `None` when persistence is disabled.
    pub store: Option<Arc<dyn PositionStore>>,
    /// Caught-up flags for dependency ordering.
    pub gate: Arc<DependencyGate>,
    /// Consistency-window pullback for poll queries.
    pub correction: Duration,
    /// Skip the per-iteration dependency gate check.
    pub skip_dependency_check: bool,
}

/// Mutable per-stream state, exclusively owned by at most one worker.
///
/// A tick claims the stream with `try_lock`; holding the guard for the
/// whole pass makes overlapping polls of one stream impossible.
#[derive(Debug, Default)]
pub(crate) struct StreamState {
    /// The stream's current position.
    pub position: Position,
}

/// One tick's worth of work for one stream.
///
/// Returns immediately when a previous pass still holds the stream.
pub(crate) async fn poll_stream(
    ctx: Arc<RunnerContext>,
    spec: StreamSpec,
    state: Arc<Mutex<StreamState>>,
) {
    let Ok(mut state) = state.try_lock() else {
        info!(stream = %spec.key, "skipping poll, previous poll still in progress");
        return;
    };
    drain_stream(&ctx, &spec, &mut state).await;
}

/// Drains all currently available pages for one stream.
async fn drain_stream(ctx: &RunnerContext, spec: &StreamSpec, state: &mut StreamState) {
    loop {
        if !ctx.skip_dependency_check && !ctx.gate.all_caught_up(&spec.depends_on) {
            info!(stream = %spec.key, "skipping poll, dependencies are not caught up");
            return;
        }

        let page = if let Some(url) = state.position.continuation().map(String::from) {
            match ctx.source.fetch_next(&url).await {
                Ok(page) => page,
                Err(SourceError::InvalidContinuation(_)) => {
                    info!(stream = %spec.key, "continuation revoked, restarting from a fresh query");
                    state.position.continuation_url = None;
                    continue;
                }
                Err(e) => {
                    warn!(stream = %spec.key, error = %e, "error fetching next records");
                    return;
                }
            }
        } else {
            let soql =
                soql::poll_query(&(spec.query)(), &state.position, ctx.correction, Utc::now());
            debug!(stream = %spec.key, query = %soql, "querying");
            match ctx.source.execute(&soql).await {
                Ok(page) => page,
                Err(SourceError::SessionExpired) => {
                    warn!(stream = %spec.key, "query failed due to session expiration");
                    ctx.source.reauthenticate().await;
                    continue;
                }
                Err(e) => {
                    warn!(stream = %spec.key, error = %e, "error executing query");
                    return;
                }
            }
        };

        if page.records.is_empty() {
            ctx.gate.set_caught_up(&spec.key, page.done);
            return;
        }

        let fresh = engine::fresh_records(&page.records, &state.position);
        if fresh.is_empty() {
            if page.done {
                ctx.gate.set_caught_up(&spec.key, true);
                return;
            }
            // Every record was delivered in an earlier poll; step the walk
            // past this page and keep going.
            let Some(next_url) = page.next_url.clone() else {
                warn!(stream = %spec.key, "non-final page carried no continuation, ending pass");
                return;
            };
            state.position.continuation_url = Some(next_url);
            continue;
        }

        let bodies: Vec<&serde_json::Value> = fresh.iter().map(|record| &record.body).collect();
        let batch = match serde_json::to_vec(&bodies) {
            Ok(batch) => batch,
            Err(e) => {
                warn!(stream = %spec.key, error = %e, "error serializing batch");
                return;
            }
        };

        debug!(
            stream = %spec.key,
            queried = page.records.len(),
            fresh = fresh.len(),
            "delivering batch"
        );
        if !spec.handler.deliver(&batch).await {
            debug!(stream = %spec.key, "handler declined the batch, retrying next poll");
            return;
        }

        // Advance from the unfiltered page so the tie map covers every
        // record observed, delivered or not.
        state.position = engine::advanced(&state.position, &page);
        if let Some(store) = &ctx.store {
            if let Err(e) = store.save(&spec.key, &state.position) {
                // The in-memory position stays advanced; a later
                // successful save reconciles.
                warn!(stream = %spec.key, error = %e, "error saving position");
            }
        }
        debug!(
            stream = %spec.key,
            watermark = ?state.position.last_modified_at,
            "position updated"
        );
        ctx.gate.set_caught_up(&spec.key, page.done);
    }
}
