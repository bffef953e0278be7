//! Insights handlers
//!
//! Served without authentication so the dashboard can read them directly.

use axum::{extract::State, Json};

use crate::models::{DeviceBreakdown, InsightsSnapshot};
use crate::{AppResult, AppState};

/// GET /fraud-insights
pub async fn summary(State(state): State<AppState>) -> AppResult<Json<InsightsSnapshot>> {
    let snapshot = state.insights.snapshot().await?;
    Ok(Json(snapshot))
}

/// GET /fraud-insights/devices
pub async fn devices(State(state): State<AppState>) -> AppResult<Json<DeviceBreakdown>> {
    let breakdown = state.insights.device_breakdown().await?;
    Ok(Json(breakdown))
}
