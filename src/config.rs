//! Configuration module

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
///
/// Every value is read once at startup; nothing is mutated afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Redis connection URL. `None` selects the in-process cache store.
    pub redis_url: Option<String>,

    /// Lifetime of a cached prediction
    pub cache_ttl: Duration,

    /// Upper bound on a single cache round trip
    pub cache_timeout: Duration,

    /// Path to the serialized classifier artifact
    pub model_path: PathBuf,

    /// Path to the processed dataset used for insights
    pub dataset_path: PathBuf,

    /// Upper bound on a single dataset read
    pub dataset_timeout: Duration,

    /// JWT secret key
    pub jwt_secret: String,

    /// JWT lifetime in minutes
    pub jwt_expiration_minutes: u64,

    /// Static API credentials as (username, secret-or-argon2-hash)
    pub credentials: Vec<(String, String)>,

    /// Audit log destination (JSON Lines). `None` keeps audit in memory and tracing only.
    pub audit_log_path: Option<PathBuf>,

    /// Verbose logging
    pub debug: bool,

    /// Environment (development, production)
    pub environment: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),

            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5000),

            redis_url: redis_url_from_env(),

            cache_ttl: Duration::from_secs(
                env::var("CACHE_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),

            cache_timeout: Duration::from_millis(
                env::var("CACHE_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(250),
            ),

            model_path: env::var("MODEL_PATH")
                .unwrap_or_else(|_| "models/fraud_detection_model.json".to_string())
                .into(),

            dataset_path: env::var("DATASET_PATH")
                .unwrap_or_else(|_| "data/processed_fraud_data.csv".to_string())
                .into(),

            dataset_timeout: Duration::from_secs(
                env::var("DATASET_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),

            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "fraud-scoring-dev-secret-change-in-production".to_string()),

            jwt_expiration_minutes: env::var("JWT_EXPIRATION_MINUTES")
                .ok()
                .and_then(|m| m.parse().ok())
                .unwrap_or(60),

            credentials: parse_credentials(
                &env::var("API_CREDENTIALS").unwrap_or_else(|_| "admin:admin".to_string()),
            ),

            audit_log_path: env::var("AUDIT_LOG_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),

            debug: env::var("DEBUG")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),

            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
        }
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Socket address string to bind
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `REDIS_URL` wins; otherwise `CACHE_HOST`/`CACHE_PORT` build one.
fn redis_url_from_env() -> Option<String> {
    if let Ok(url) = env::var("REDIS_URL") {
        if !url.trim().is_empty() {
            return Some(url);
        }
    }

    let host = env::var("CACHE_HOST").ok().filter(|h| !h.trim().is_empty())?;
    let port = env::var("CACHE_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(6379);

    Some(format!("redis://{}:{}/", host, port))
}

/// Parse `user:secret,user2:secret2`. Secrets may contain `:`.
pub fn parse_credentials(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (user, secret) = pair.trim().split_once(':')?;
            let user = user.trim();
            if user.is_empty() || secret.is_empty() {
                return None;
            }
            Some((user.to_string(), secret.to_string()))
        })
        .collect()
}
