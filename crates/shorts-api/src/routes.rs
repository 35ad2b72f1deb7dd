//! API routes.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    authenticate, delete_job, download, get_job, health, job_events, process, upload, upload_file,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let stage_routes = Router::new()
        .route("/download", post(download))
        .route("/process", post(process))
        .route("/authenticate", post(authenticate))
        .route("/upload", post(upload))
        .route("/upload_file", post(upload_file));

    let job_routes = Router::new()
        .route("/jobs/:job_id", get(get_job).delete(delete_job))
        .route("/jobs/:job_id/events", get(job_events));

    let api_routes = Router::new()
        .route("/health", get(health))
        .merge(stage_routes)
        .merge(job_routes)
        .route_layer(middleware::from_fn(metrics_middleware));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    let max_body_size = state.config.max_body_size;

    Router::new()
        .nest("/api", api_routes)
        .merge(metrics_routes)
        // Multipart bodies are capped by both the extractor and the transport
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(RequestBodyLimitLayer::new(max_body_size))
        .layer(middleware::from_fn(request_logging))
        .layer(middleware::from_fn(request_id))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
