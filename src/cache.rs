//! Response cache with graceful degradation.
//!
//! Construction probes the configured Redis URL; when the URL is missing or
//! the probe fails the store degrades to a process-local map and the
//! gateway keeps serving. Degraded mode enforces no TTL and survives until
//! restart. Every cache failure after construction is absorbed, logged and
//! treated as a miss; the cache never alters a request outcome.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::CacheError;

/// How long the startup connection probe may take.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

enum Backend {
    Redis(redis::aio::ConnectionManager),
    /// Degraded mode. Unbounded, no TTL, cleared on restart.
    Memory(Mutex<HashMap<String, serde_json::Value>>),
}

/// Shared response cache.
pub struct CacheStore {
    backend: Backend,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStore {
    /// Connect to the external backend, or degrade to the in-process map.
    pub async fn connect(url: Option<&str>) -> Self {
        let backend = match url {
            Some(url) => match Self::probe_redis(url).await {
                Ok(manager) => {
                    info!("response cache connected to external backend");
                    Backend::Redis(manager)
                }
                Err(e) => {
                    warn!(error = %e, "cache backend unreachable, degrading to in-process map");
                    Backend::Memory(Mutex::new(HashMap::new()))
                }
            },
            None => {
                info!("no cache backend configured, using in-process map");
                Backend::Memory(Mutex::new(HashMap::new()))
            }
        };

        Self {
            backend,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    async fn probe_redis(url: &str) -> Result<redis::aio::ConnectionManager, CacheError> {
        let client = redis::Client::open(url).map_err(|e| CacheError::Backend(e.to_string()))?;
        let manager = tokio::time::timeout(PROBE_TIMEOUT, client.get_connection_manager())
            .await
            .map_err(|_| CacheError::Backend("connection probe timed out".to_string()))?
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(manager)
    }

    /// Whether the external backend is in use (false in degraded mode).
    pub fn external_available(&self) -> bool {
        matches!(self.backend, Backend::Redis(_))
    }

    /// Look up a cached response. Backend failures count as a miss.
    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let found = match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                match redis::cmd("GET")
                    .arg(key)
                    .query_async::<Option<String>>(&mut conn)
                    .await
                {
                    Ok(Some(raw)) => match serde_json::from_str(&raw) {
                        Ok(value) => Some(value),
                        Err(e) => {
                            warn!(error = %e, "cached entry is not valid JSON, ignoring");
                            None
                        }
                    },
                    Ok(None) => None,
                    Err(e) => {
                        warn!(error = %e, "cache read failed, treating as miss");
                        None
                    }
                }
            }
            Backend::Memory(map) => match map.lock() {
                Ok(map) => map.get(key).cloned(),
                Err(poisoned) => poisoned.into_inner().get(key).cloned(),
            },
        };

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key, "cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Store a response under `key` for `ttl`. Failures are absorbed.
    /// Degraded mode ignores the TTL.
    pub async fn set(&self, key: &str, value: &serde_json::Value, ttl: Duration) {
        match &self.backend {
            Backend::Redis(manager) => {
                let raw = match serde_json::to_string(value) {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(error = %e, "failed to serialize cache entry, skipping write");
                        return;
                    }
                };
                let mut conn = manager.clone();
                let result = redis::cmd("SET")
                    .arg(key)
                    .arg(raw)
                    .arg("EX")
                    .arg(ttl.as_secs())
                    .query_async::<()>(&mut conn)
                    .await;
                if let Err(e) = result {
                    warn!(error = %e, "cache write failed, continuing without it");
                }
            }
            Backend::Memory(map) => {
                let mut map = match map.lock() {
                    Ok(map) => map,
                    Err(poisoned) => poisoned.into_inner(),
                };
                map.insert(key.to_string(), value.clone());
            }
        }
    }

    /// Hit/miss counters since startup.
    pub fn counters(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

/// Derive the cache key for a route and its normalized parameters.
///
/// serde_json maps are BTree-backed, so serializing the same logical
/// parameters always yields the same bytes regardless of insertion order.
pub fn cache_key(route: &str, params: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(route.as_bytes());
    hasher.update(b"|");
    hasher.update(params.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}
