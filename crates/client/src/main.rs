//! Item replication simulator binary.
//!
//! Loads an item catalog, starts a session with one authoritative store
//! worker and a set of observer replicas, runs a scripted scenario and
//! reports whether every observer converged on its authority.
//!
//! # Examples
//!
//! ```bash
//! ITEMS_CATALOG=crates/items/content/data ITEMS_OBSERVERS=3 cargo run -p item-client
//! ```

use std::path::PathBuf;

use anyhow::Result;
use item_client::{logging, scenario};
use item_runtime::{RuntimeConfig, Session};

/// Catalog bundled with the content crate, used when `ITEMS_CATALOG` is unset.
const BUNDLED_CATALOG: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../items/content/data");

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let mut config = RuntimeConfig::from_env();
    let log_dir = std::env::var("ITEMS_LOG_DIR").ok().map(PathBuf::from);
    let _guard = logging::setup_logging(log_dir.as_deref())?;

    let catalog = config
        .catalog_path
        .get_or_insert_with(|| PathBuf::from(BUNDLED_CATALOG))
        .clone();

    tracing::info!("Starting item simulator");
    tracing::info!("Catalog: {}", catalog.display());
    tracing::info!(
        "Stores: {}, observers: {}, session: {}",
        config.stores,
        config.observers,
        config.session
    );

    let mut session = Session::start(config).await?;
    let report = scenario::run(&mut session).await;
    session.shutdown().await?;

    let report = report?;
    println!("{report}");
    scenario::ensure_converged(&report)?;

    tracing::info!("Simulator finished");
    Ok(())
}
