//! Fraud Scoring Service
//!
//! Authenticated fraud-scoring API over a trained classifier, with
//! fingerprint-keyed result caching, per-request auditing and dataset insights.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   FRAUD SCORING SERVICE                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  audit middleware (every request, exactly once)              │
//! │  ┌────────────┐  ┌──────────────────────┐  ┌──────────────┐  │
//! │  │ /login     │  │ /predict (bearer)    │  │ /fraud-      │  │
//! │  │ Credential │  │ shape → cache → model│  │  insights    │  │
//! │  │ Verifier   │  │ → cache store        │  │ (CSV, fresh) │  │
//! │  └────────────┘  └──────────┬───────────┘  └──────────────┘  │
//! │                             ▼                                │
//! │                 ┌───────────────────────┐                    │
//! │                 │ Redis / memory store  │                    │
//! │                 └───────────────────────┘                    │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod audit;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod insights;
pub mod middleware;
pub mod models;
pub mod scoring;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
    middleware as axum_middleware,
};
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};

pub use error::{AppError, AppResult};

use crate::audit::AuditLogger;
use crate::auth::CredentialVerifier;
use crate::cache::{CacheStore, MemoryStore, PredictionCache, RedisStore};
use crate::config::Config;
use crate::insights::InsightsAggregator;
use crate::scoring::{LogisticModel, ScoringAdapter};

/// Shared application state
///
/// Built once at startup; every component is read-only afterwards.
#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<CredentialVerifier>,
    pub cache: Arc<PredictionCache>,
    pub scorer: Arc<ScoringAdapter>,
    pub audit: Arc<AuditLogger>,
    pub insights: Arc<InsightsAggregator>,
}

impl AppState {
    /// Construct every component from configuration
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let verifier = CredentialVerifier::new(
            &config.credentials,
            &config.jwt_secret,
            chrono::Duration::minutes(config.jwt_expiration_minutes as i64),
            argon2::Params::default(),
        )
        .map_err(|e| anyhow::anyhow!("failed to hash API credentials: {}", e))?;

        let store: Arc<dyn CacheStore> = match &config.redis_url {
            Some(url) => {
                tracing::info!("Prediction cache: redis");
                Arc::new(RedisStore::new(url).context("invalid Redis URL")?)
            }
            None => {
                tracing::info!("Prediction cache: in-process memory (REDIS_URL not set)");
                Arc::new(MemoryStore::new())
            }
        };

        let model = LogisticModel::load(&config.model_path)
            .with_context(|| format!("failed to load model from {}", config.model_path.display()))?;

        Ok(Self {
            verifier: Arc::new(verifier),
            cache: Arc::new(PredictionCache::new(store, config.cache_ttl, config.cache_timeout)),
            scorer: Arc::new(ScoringAdapter::new(Arc::new(model))),
            audit: Arc::new(AuditLogger::new(config.audit_log_path.clone())),
            insights: Arc::new(InsightsAggregator::new(
                config.dataset_path.clone(),
                config.dataset_timeout,
            )),
        })
    }
}

/// Create the main router with all routes
pub fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health::check))
        .route("/login", post(handlers::auth::login))
        .route("/fraud-insights", get(handlers::insights::summary))
        .route("/fraud-insights/devices", get(handlers::insights::devices));

    // Scoring routes (bearer token)
    let scoring_routes = Router::new()
        .route("/predict", post(handlers::predict::predict))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_bearer,
        ));

    // Combine all routes
    Router::new()
        .merge(public_routes)
        .merge(scoring_routes)
        .fallback(handlers::not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::audit::audit_requests,
        ))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
