//! Dashboard aggregation service entrypoint.
//! Loads config, starts one poller per source and serves the read API.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use situational_awareness::{
    app, logging, AggregationStore, DashboardConfig, HttpFetcher, Normalizer, PollerManager,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    logging::init_tracing();

    let config = DashboardConfig::load_default().context("loading dashboard config")?;
    let store = Arc::new(AggregationStore::new(config.store_settings()));
    let fetcher = Arc::new(HttpFetcher::new(config.request_timeout())?);
    let pollers = PollerManager::new(
        store.clone(),
        fetcher,
        Normalizer::new(config.alias_table()),
    );
    pollers.start_all(&config).await;

    let router = app(store)?;
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, api = %config.api_base_url, "dashboard aggregation listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    pollers.stop_all().await;
    info!("pollers stopped, exiting");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl-c handler failed; shutting down");
    }
}
