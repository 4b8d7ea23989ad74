//! Polls a Salesforce org and prints every delivered batch to stdout.
//!
//! Configuration comes from `LP_`-prefixed environment variables:
//!
//! ```bash
//! LP_DOMAIN=mydomain.my.salesforce.com \
//! LP_CLIENT_ID=... LP_CLIENT_SECRET=... \
//! LP_USERNAME=... LP_PASSWORD=... \
//! LP_QUERY='select fields(all) from Property__c' \
//! cargo run -p lodestar-watch
//! ```
//!
//! Optional: `LP_STREAM_KEY`, `LP_API_VERSION`, `LP_POLL_INTERVAL_SECS`,
//! `LP_PERSISTENCE_PATH` (enables persistence),
//! `LP_STARTUP_POSITION_OVERRIDES` (`key=rfc3339,...`), and `RUST_LOG`.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use lodestar_core::StreamSpec;
use lodestar_poller::{parse_position_overrides, Poller, PollerConfig};
use lodestar_salesforce::{SalesforceConfig, SalesforceSource};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let salesforce = SalesforceConfig::new(
        required("LP_DOMAIN")?,
        required("LP_CLIENT_ID")?,
        required("LP_CLIENT_SECRET")?,
        required("LP_USERNAME")?,
        required("LP_PASSWORD")?,
    );
    let salesforce = match std::env::var("LP_API_VERSION") {
        Ok(version) => SalesforceConfig {
            api_version: version,
            ..salesforce
        },
        Err(_) => salesforce,
    };

    let mut config = PollerConfig::default();
    if let Ok(secs) = std::env::var("LP_POLL_INTERVAL_SECS") {
        config.poll_interval = Duration::from_secs(secs.parse()?);
    }
    if let Ok(path) = std::env::var("LP_PERSISTENCE_PATH") {
        config.persistence_enabled = true;
        config.persistence_path = path.into();
    }
    if let Ok(overrides) = std::env::var("LP_STARTUP_POSITION_OVERRIDES") {
        config.startup_position_overrides = parse_position_overrides(&overrides)?;
    }

    let key = std::env::var("LP_STREAM_KEY").unwrap_or_else(|_| "watch".to_string());
    let base_query = std::env::var("LP_QUERY")
        .unwrap_or_else(|_| "select fields(all) from Property__c".to_string());

    let source = Arc::new(SalesforceSource::connect(salesforce).await?);
    let streams = vec![StreamSpec::new(
        key,
        move || base_query.clone(),
        |batch: &[u8]| {
            println!("{}", String::from_utf8_lossy(batch));
            true
        },
    )];

    let poller = Arc::new(Poller::new(streams, source, config)?);
    let interrupt = {
        let poller = Arc::clone(&poller);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, stopping");
                poller.stop();
            }
        })
    };
    poller.run().await;
    interrupt.abort();
    Ok(())
}

fn required(name: &str) -> Result<String, String> {
    std::env::var(name).map_err(|_| format!("{name} must be set"))
}
