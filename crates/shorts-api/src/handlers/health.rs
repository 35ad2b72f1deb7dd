//! Health check handler.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub version: String,
    pub active_jobs: usize,
    pub timestamp: String,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Shorts API is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_jobs: state.pipeline.runner().active_jobs(),
        timestamp: Utc::now().to_rfc3339(),
    })
}
