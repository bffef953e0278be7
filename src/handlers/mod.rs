//! HTTP handlers

pub mod auth;
pub mod health;
pub mod insights;
pub mod predict;

use crate::AppError;

/// Fallback for unknown routes
pub async fn not_found() -> AppError {
    AppError::NotFound
}
