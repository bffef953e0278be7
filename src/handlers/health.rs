//! Health check handler

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    model_version: String,
    cache_backend: &'static str,
    audit_degraded: bool,
    timestamp: i64,
}

pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        model_version: state.scorer.model_version().to_string(),
        cache_backend: state.cache.backend(),
        audit_degraded: state.audit.is_degraded(),
        timestamp: chrono::Utc::now().timestamp(),
    })
}
