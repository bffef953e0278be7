//! Error handling

use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
    Json,
};
use serde_json::json;

use crate::auth::AuthError;
use crate::insights::DatasetError;
use crate::scoring::ScoringError;

pub type AppResult<T> = Result<T, AppError>;

/// Stable machine-readable failure code, attached to every error response
/// so the audit middleware can record it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureCode(pub &'static str);

#[derive(Debug)]
pub enum AppError {
    // Auth errors
    Auth(AuthError),
    Unauthorized,

    // Scoring errors
    Scoring(ScoringError),

    // Insights errors
    Dataset(DatasetError),

    // Request errors
    MalformedRequest(String),
    NotFound,

    // Generic errors
    InternalError(String),
}

impl AppError {
    /// Stable code reported in the body and the audit trail
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Auth(AuthError::MissingCredentials) => "missing_credentials",
            AppError::Auth(AuthError::InvalidCredentials) => "invalid_credentials",
            AppError::Auth(AuthError::TokenExpired) => "token_expired",
            AppError::Auth(AuthError::TokenInvalid) => "token_invalid",
            AppError::Unauthorized => "unauthenticated",
            AppError::Scoring(ScoringError::FeatureShapeMismatch { .. }) => "feature_shape_mismatch",
            AppError::Scoring(ScoringError::InvalidFeatureValue { .. }) => "invalid_feature_value",
            AppError::Scoring(ScoringError::ModelUnavailable(_)) => "scoring_failed",
            AppError::Dataset(DatasetError::Unavailable(_)) => "dataset_unavailable",
            AppError::Dataset(DatasetError::Schema(_)) => "dataset_schema_error",
            AppError::MalformedRequest(_) => "malformed_request",
            AppError::NotFound => "not_found",
            AppError::InternalError(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, error_message) = match &self {
            AppError::Auth(AuthError::MissingCredentials) => {
                (StatusCode::UNAUTHORIZED, "Authentication required".to_string())
            }
            AppError::Auth(AuthError::InvalidCredentials) => {
                (StatusCode::UNAUTHORIZED, "Invalid username or password".to_string())
            }
            AppError::Auth(AuthError::TokenExpired) => {
                (StatusCode::UNAUTHORIZED, "Token has expired".to_string())
            }
            AppError::Auth(AuthError::TokenInvalid) => {
                (StatusCode::UNAUTHORIZED, "Invalid token".to_string())
            }
            AppError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "Authentication required".to_string())
            }
            AppError::Scoring(err @ ScoringError::FeatureShapeMismatch { .. }) => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            AppError::Scoring(err @ ScoringError::InvalidFeatureValue { .. }) => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            AppError::Scoring(ScoringError::ModelUnavailable(msg)) => {
                tracing::error!("Scoring failure: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Scoring failed".to_string())
            }
            AppError::Dataset(err) => {
                tracing::warn!("Insights request failed: {}", err);
                // File paths and OS errors stay in the log
                let message = match err {
                    DatasetError::Unavailable(_) => "Dataset unavailable".to_string(),
                    DatasetError::Schema(_) => err.to_string(),
                };
                (StatusCode::BAD_REQUEST, message)
            }
            AppError::MalformedRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": error_message,
            },
            "status": status.as_u16()
        }));

        let mut response = (status, body).into_response();
        response.extensions_mut().insert(FailureCode(code));
        response
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<ScoringError> for AppError {
    fn from(err: ScoringError) -> Self {
        AppError::Scoring(err)
    }
}

impl From<DatasetError> for AppError {
    fn from(err: DatasetError) -> Self {
        AppError::Dataset(err)
    }
}
