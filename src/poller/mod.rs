// src/poller/mod.rs
//! # Source Poller
//! One supervised, cancellable timer per source, owned by [`PollerManager`].
//!
//! Every tick spawns one fetch; a fetch still in flight when the next tick
//! fires keeps running. Results go through the store's ticket check, so
//! only the newest completion per source lands. Failures never pause the
//! timer and there is no backoff.

pub mod fetch;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::{counter, histogram};
use parking_lot::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

pub use fetch::{HttpFetcher, SourceFetcher};

use crate::config::DashboardConfig;
use crate::normalize::Normalizer;
use crate::source::SourceId;
use crate::store::{AggregationStore, Completion, PollTicket};

#[derive(Clone)]
struct PollContext {
    store: Arc<AggregationStore>,
    fetcher: Arc<dyn SourceFetcher>,
    normalizer: Arc<Normalizer>,
}

pub struct PollerManager {
    ctx: PollContext,
    handles: Mutex<HashMap<SourceId, JoinHandle<()>>>,
}

impl PollerManager {
    pub fn new(
        store: Arc<AggregationStore>,
        fetcher: Arc<dyn SourceFetcher>,
        normalizer: Normalizer,
    ) -> Self {
        Self {
            ctx: PollContext {
                store,
                fetcher,
                normalizer: Arc::new(normalizer),
            },
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<AggregationStore> {
        &self.ctx.store
    }

    /// Begin polling `source`. Replaces a running poller for the same source.
    /// The first fetch fires immediately. Must run inside a Tokio runtime.
    pub async fn start(&self, source: SourceId, endpoint: impl Into<String>, interval: Duration) {
        self.stop(source).await;

        let endpoint = endpoint.into();
        let interval = interval.max(Duration::from_millis(1));
        info!(source = %source, endpoint = %endpoint, interval_ms = interval.as_millis() as u64, "poller started");

        let handle = tokio::spawn(run_poller(self.ctx.clone(), source, endpoint, interval));
        self.handles.lock().insert(source, handle);
    }

    /// Start every source with its configured endpoint and interval.
    pub async fn start_all(&self, config: &DashboardConfig) {
        for id in SourceId::ALL {
            self.start(id, config.endpoint(id), config.poll_interval(id))
                .await;
        }
    }

    /// Cancel the timer and in-flight fetches of `source`. Once this returns,
    /// nothing issued by that poller can write to the store.
    pub async fn stop(&self, source: SourceId) -> bool {
        let handle = self.handles.lock().remove(&source);
        let Some(handle) = handle else {
            return false;
        };
        handle.abort();
        // Wait for the loop to unwind so it cannot issue another ticket.
        let _ = handle.await;
        self.ctx.store.retire(source);
        info!(source = %source, "poller stopped");
        true
    }

    pub async fn stop_all(&self) {
        for id in SourceId::ALL {
            self.stop(id).await;
        }
    }

    pub fn is_running(&self, source: SourceId) -> bool {
        self.handles
            .lock()
            .get(&source)
            .is_some_and(|h| !h.is_finished())
    }

    pub fn running(&self) -> Vec<SourceId> {
        SourceId::ALL
            .into_iter()
            .filter(|id| self.is_running(*id))
            .collect()
    }
}

impl Drop for PollerManager {
    fn drop(&mut self) {
        for (source, handle) in self.handles.get_mut().drain() {
            handle.abort();
            self.ctx.store.retire(source);
        }
    }
}

async fn run_poller(ctx: PollContext, source: SourceId, endpoint: String, interval: Duration) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // Dropping the set on cancellation aborts every in-flight fetch.
    let mut in_flight = JoinSet::new();

    loop {
        ticker.tick().await;
        while in_flight.try_join_next().is_some() {}

        let ticket = ctx.store.issue_ticket(source);
        let ctx = ctx.clone();
        let endpoint = endpoint.clone();
        in_flight.spawn(async move { poll_once(&ctx, ticket, &endpoint).await });
    }
}

async fn poll_once(ctx: &PollContext, ticket: PollTicket, endpoint: &str) {
    let source = ticket.source;
    let started = Instant::now();

    let result = ctx
        .fetcher
        .fetch(endpoint)
        .await
        .map(|raw| ctx.normalizer.normalize(source, &raw));

    histogram!("dashboard_poll_duration_ms", "source" => source.as_str())
        .record(started.elapsed().as_secs_f64() * 1000.0);

    match &result {
        Ok(_) => {
            counter!("dashboard_poll_success_total", "source" => source.as_str()).increment(1);
        }
        Err(e) => {
            warn!(source = %source, kind = e.kind().as_str(), error = %e, "poll failed");
            counter!(
                "dashboard_poll_failure_total",
                "source" => source.as_str(),
                "kind" => e.kind().as_str()
            )
            .increment(1);
        }
    }

    match ctx.store.complete(ticket, result, Utc::now()) {
        Completion::Applied => trace!(source = %source, ticket = ticket.number, "poll applied"),
        Completion::Superseded => {
            counter!("dashboard_poll_superseded_total", "source" => source.as_str()).increment(1);
        }
        Completion::Retired => debug!(source = %source, ticket = ticket.number, "poll finished after stop"),
    }
}
