// src/metrics.rs
use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the process-wide Prometheus recorder. Later calls reuse it.
    pub fn init() -> Result<Self> {
        let handle = HANDLE
            .get_or_try_init(|| {
                // Default buckets; the histogram renders as a summary.
                let handle = PrometheusBuilder::new()
                    .install_recorder()
                    .context("installing prometheus recorder")?;
                describe();
                Ok::<_, anyhow::Error>(handle)
            })?
            .clone();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe() {
    describe_counter!(
        "dashboard_poll_success_total",
        "Upstream polls that returned a usable document"
    );
    describe_counter!(
        "dashboard_poll_failure_total",
        "Upstream polls that failed, by error kind"
    );
    describe_counter!(
        "dashboard_poll_superseded_total",
        "Poll completions discarded because a newer one already landed"
    );
    describe_gauge!(
        "dashboard_source_consecutive_failures",
        "Current failure streak per source"
    );
    describe_gauge!("dashboard_live", "1 when the signals feed is live");
    describe_gauge!("dashboard_alerts_retained", "Alerts held in the retention window");
    describe_histogram!("dashboard_poll_duration_ms", "Upstream poll latency in milliseconds");
}
