//! Prediction cache
//!
//! The cache is a latency optimization only. Every failure mode (timeout,
//! unreachable store, undecodable payload) degrades to a miss or a skipped
//! write and is never surfaced to the caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::models::{CacheEntry, Fingerprint};

const KEY_PREFIX: &str = "fraud:prediction";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("cache store unreachable: {0}")]
    Unreachable(String),
    #[error("cache payload could not be decoded: {0}")]
    Codec(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Unreachable(err.to_string())
    }
}

/// Key-value backing store with per-key expiry
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short name for health output and logs
    fn backend(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
}

// ============================================================================
// REDIS STORE
// ============================================================================

/// Redis-backed store. The connection is established lazily on first use
/// and retried on later calls if that fails, so an outage at startup does
/// not keep the service down.
pub struct RedisStore {
    client: Client,
    conn: OnceCell<ConnectionManager>,
}

impl RedisStore {
    pub fn new(redis_url: &str) -> Result<Self, CacheError> {
        let client = Client::open(redis_url)?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let conn = ConnectionManager::new(self.client.clone()).await?;
                info!("Connected to Redis cache");
                Ok::<_, CacheError>(conn)
            })
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let millis = ttl.as_millis().clamp(1, u64::MAX as u128) as u64;
        conn.pset_ex::<_, _, ()>(key, value, millis).await?;
        Ok(())
    }
}

// ============================================================================
// MEMORY STORE
// ============================================================================

/// In-process store used when no Redis URL is configured.
///
/// Expired entries are skipped on read and swept on every write, so the map
/// never holds more than the keys written within one TTL.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.read();
        Ok(entries
            .get(key)
            .filter(|(_, expires_at)| Instant::now() < *expires_at)
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.insert(key.to_string(), (value, now + ttl));
        Ok(())
    }
}

// ============================================================================
// PREDICTION CACHE
// ============================================================================

/// Fingerprint-keyed prediction memo over a `CacheStore`
pub struct PredictionCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    timeout: Duration,
}

impl PredictionCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration, timeout: Duration) -> Self {
        Self { store, ttl, timeout }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Cached prediction for `fingerprint`, or `None` on miss, expiry or any failure
    pub async fn lookup(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        match self.try_lookup(fingerprint).await {
            Ok(Some(entry)) => {
                debug!(fingerprint = %fingerprint, "Prediction cache hit");
                Some(entry)
            }
            Ok(None) => {
                debug!(fingerprint = %fingerprint, "Prediction cache miss");
                None
            }
            Err(e) => {
                warn!(fingerprint = %fingerprint, "Cache lookup degraded to miss: {}", e);
                None
            }
        }
    }

    /// Memoize `entry`. Failures are logged and dropped.
    pub async fn store(&self, entry: &CacheEntry) {
        if let Err(e) = self.try_store(entry).await {
            warn!(fingerprint = %entry.fingerprint, "Cache store skipped: {}", e);
        }
    }

    async fn try_lookup(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>, CacheError> {
        let key = cache_key(fingerprint);
        let raw = tokio::time::timeout(self.timeout, self.store.get(&key))
            .await
            .map_err(|_| CacheError::Timeout(self.timeout))??;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let entry: CacheEntry =
            serde_json::from_str(&raw).map_err(|e| CacheError::Codec(e.to_string()))?;

        if entry.fingerprint != *fingerprint || entry.is_expired_at(Utc::now()) {
            return Ok(None);
        }

        Ok(Some(entry))
    }

    async fn try_store(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let key = cache_key(&entry.fingerprint);
        let value = serde_json::to_string(entry).map_err(|e| CacheError::Codec(e.to_string()))?;

        tokio::time::timeout(self.timeout, self.store.set(&key, value, self.ttl))
            .await
            .map_err(|_| CacheError::Timeout(self.timeout))?
    }
}

fn cache_key(fingerprint: &Fingerprint) -> String {
    format!("{}:{}", KEY_PREFIX, fingerprint)
}
