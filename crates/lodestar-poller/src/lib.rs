//! # Lodestar Poller
//!
//! The facade that turns the engine in `lodestar-core` into a running
//! service: a tick scheduler fanning out one worker per stream, per-stream
//! runners that drain all available pages, startup position loading with
//! override > persisted > zero precedence, and dependency-graph validation.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use lodestar_core::StreamSpec;
//! use lodestar_poller::{Poller, PollerConfig};
//! use lodestar_salesforce::{SalesforceConfig, SalesforceSource};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let source = Arc::new(
//!     SalesforceSource::connect(SalesforceConfig::new(
//!         "mydomain.my.salesforce.com",
//!         "client-id",
//!         "client-secret",
//!         "user@example.com",
//!         "hunter2",
//!     ))
//!     .await?,
//! );
//! let streams = vec![StreamSpec::new(
//!     "property__c",
//!     || "select fields(all) from Property__c".to_string(),
//!     |batch: &[u8]| {
//!         println!("{}", String::from_utf8_lossy(batch));
//!         true
//!     },
//! )];
//! let poller = Poller::new(streams, source, PollerConfig::default())?;
//! poller.run().await;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

/// Poller configuration.
pub mod config;

/// Error types for construction and startup.
pub mod error;

/// The poller facade and tick scheduler.
pub mod poller;

/// Per-stream poll passes.
mod runner;

/// Test support: a scripted record source and a recording handler.
pub mod testing;

pub use config::{parse_position_overrides, PollerConfig};
pub use error::PollerError;
pub use poller::Poller;
