// src/api.rs
//! Read-only HTTP surface over the aggregation store.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::alerts::CanonicalAlert;
use crate::projection::{project, project_all, Surface, SurfaceView, UnknownSurface};
use crate::source::SourceId;
use crate::store::{AggregateView, AggregationStore, SourceState};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<AggregationStore>,
}

impl AppState {
    pub fn new(store: Arc<AggregationStore>) -> Self {
        Self { store }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/view", get(get_view))
        .route("/api/view/{surface}", get(get_surface))
        .route("/api/surfaces", get(get_surfaces))
        .route("/api/sources", get(get_sources))
        .route("/api/alerts", get(get_alerts))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

pub enum ApiError {
    UnknownSurface(UnknownSurface),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::UnknownSurface(e) => (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": e.to_string(),
                    "surfaces": Surface::ALL.map(Surface::as_str),
                })),
            )
                .into_response(),
        }
    }
}

async fn get_view(State(state): State<AppState>) -> Json<AggregateView> {
    Json(state.store.view().as_ref().clone())
}

async fn get_surface(
    State(state): State<AppState>,
    Path(surface): Path<String>,
) -> Result<Json<SurfaceView>, ApiError> {
    let surface: Surface = surface.parse().map_err(ApiError::UnknownSurface)?;
    Ok(Json(project(&state.store.view(), surface)))
}

async fn get_surfaces(State(state): State<AppState>) -> Json<Vec<SurfaceView>> {
    Json(project_all(&state.store.view()))
}

async fn get_sources(State(state): State<AppState>) -> Json<BTreeMap<SourceId, SourceState>> {
    Json(state.store.view().sources.clone())
}

async fn get_alerts(State(state): State<AppState>) -> Json<Vec<CanonicalAlert>> {
    Json(state.store.retained_alerts())
}
