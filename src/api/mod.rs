pub mod statistics_api;

use axum::{
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::object_store::ObjectStore;
use crate::stats::StatsRepository;

/// Application state for the web API
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<StatsRepository>,
    pub store: Arc<dyn ObjectStore>,
}

/// Create the main API router
pub fn create_api_router(state: AppState) -> Router {
    Router::new()
        // Health check endpoint
        .route("/api/health", get(health_check))
        // Aggregation processes
        .route("/api/statistics", post(statistics_api::submit_process))
        .route(
            "/api/statistics/data/process/:request_id",
            get(statistics_api::get_process_status),
        )
        // Reference data for the UI
        .route(
            "/api/statistics/data/metrics_regions",
            get(statistics_api::get_metrics_regions),
        )
        .route(
            "/api/statistics/data/okpd2_segments",
            get(statistics_api::get_classifier_segments),
        )
        .route(
            "/api/statistics/data/okpd2_children/:parent_id",
            get(statistics_api::get_classifier_children),
        )
        // Segments
        .route(
            "/api/statistics/create/segment",
            post(statistics_api::create_segment),
        )
        .route(
            "/api/statistics/data/segment/:segment_id",
            get(statistics_api::get_segment_data),
        )
        .route(
            "/api/statistics/data/segment/:segment_id/paths",
            get(statistics_api::get_segment_paths),
        )
        // Artifact downloads behind signed share links
        .route("/files/:token", get(statistics_api::download_artifact))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Health check endpoint
async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "statpipe-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
