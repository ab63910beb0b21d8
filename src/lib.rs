// src/lib.rs
//! Live aggregation layer for the situational awareness dashboard.
//!
//! Pollers fetch four upstream feeds, the normalizer maps each document onto
//! one canonical shape, and the store keeps per-source state plus a single
//! consistent [`store::AggregateView`] that projections and the HTTP API read.

pub mod alerts;
pub mod api;
pub mod config;
pub mod derived;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod normalize;
pub mod payload;
pub mod poller;
pub mod projection;
pub mod source;
pub mod store;

use std::sync::Arc;

use axum::Router;

pub use crate::api::{router, AppState};
pub use crate::config::DashboardConfig;
pub use crate::error::{PollError, PollErrorKind};
pub use crate::normalize::{normalize, Normalizer};
pub use crate::payload::CanonicalPayload;
pub use crate::poller::{HttpFetcher, PollerManager, SourceFetcher};
pub use crate::projection::{project, Surface, SurfaceView};
pub use crate::source::SourceId;
pub use crate::store::{AggregateView, AggregationStore, SourceState, SourceStatus};

/// Full HTTP app: read API plus `/metrics`.
pub fn app(store: Arc<AggregationStore>) -> anyhow::Result<Router> {
    let metrics = metrics::Metrics::init()?;
    Ok(api::router(AppState::new(store)).merge(metrics.router()))
}
