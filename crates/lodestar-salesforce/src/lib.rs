//! # Lodestar Salesforce
//!
//! The Salesforce implementation of the engine's record-source seam:
//! OAuth2 password-grant authentication, SOQL execution over the REST
//! query endpoint, pagination through `nextRecordsUrl`, and single-flight
//! re-authentication on session expiry.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

/// Connection and credential configuration.
pub mod config;

/// The REST client implementing [`lodestar_core::RecordSource`].
pub mod client;

pub use client::{ClientError, SalesforceSource};
pub use config::SalesforceConfig;
