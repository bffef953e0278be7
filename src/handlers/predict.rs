//! Prediction handler

use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    Json,
};

use crate::auth::Subject;
use crate::middleware::audit::AuditDetail;
use crate::models::{CacheEntry, PredictRequest, PredictResponse, PredictionResult};
use crate::{AppError, AppResult, AppState};

/// POST /predict
///
/// Shape check, then cache lookup, then scoring and cache store on a miss.
pub async fn predict(
    State(state): State<AppState>,
    subject: Subject,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(request) = payload.map_err(|e| AppError::MalformedRequest(e.body_text()))?;
    let features = request.features;

    // Before any cache or model interaction
    state.scorer.check_shape(&features)?;

    let fingerprint = features.fingerprint();

    let result = match state.cache.lookup(&fingerprint).await {
        Some(entry) => PredictionResult::from_cache(&entry),
        None => {
            let (label, probability) = state.scorer.predict(&features).await?;
            let entry = CacheEntry::new(fingerprint, label, Some(probability), state.cache.ttl());
            state.cache.store(&entry).await;
            PredictionResult::from_model(label, probability)
        }
    };

    tracing::debug!(
        subject = %subject.0,
        label = ?result.label,
        source = result.source.as_str(),
        "Prediction served"
    );

    let detail = format!("source={}", result.source.as_str());
    let mut response = Json(PredictResponse::from(result)).into_response();
    response.extensions_mut().insert(AuditDetail(detail));
    Ok(response)
}
