//! # Lodestar Core
//!
//! The polling engine behind Lodestar's change-data-capture loop: per-stream
//! positions, record deduplication across timestamp ties, SOQL query
//! composition with a consistency-window pullback, and the dependency gate
//! that orders stream progress.
//!
//! Everything in this crate is transport-free. The [`source::RecordSource`]
//! trait is the seam to the actual record store; `lodestar-salesforce`
//! implements it over the REST API.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

/// Record pages and the source abstraction.
pub mod source;

/// Per-stream poll positions.
pub mod position;

/// Pure functions that filter pages and advance positions.
pub mod engine;

/// SOQL poll-query composition.
pub mod soql;

/// Caught-up tracking and dependency ordering between streams.
pub mod gate;

/// Stream definitions: query producer, delivery handler, dependencies.
pub mod stream;

pub use gate::DependencyGate;
pub use position::Position;
pub use source::{QueryPage, RecordSource, SourceError, SourceRecord};
pub use stream::{DeliveryHandler, StreamSpec};
