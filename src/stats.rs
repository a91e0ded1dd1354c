//! Aggregate gateway counters, served by `/stats`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// Lock-free counters shared across all request paths.
pub struct GatewayStats {
    started: Instant,
    total_requests: AtomicU64,
    chat_requests: AtomicU64,
    image_requests: AtomicU64,
    transcribe_requests: AtomicU64,
    search_requests: AtomicU64,
    provider_errors: AtomicU64,
    rate_limited: AtomicU64,
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub total_requests: u64,
    pub chat_requests: u64,
    pub image_requests: u64,
    pub transcribe_requests: u64,
    pub search_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub provider_errors: u64,
    pub rate_limited: u64,
}

impl GatewayStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            total_requests: AtomicU64::new(0),
            chat_requests: AtomicU64::new(0),
            image_requests: AtomicU64::new(0),
            transcribe_requests: AtomicU64::new(0),
            search_requests: AtomicU64::new(0),
            provider_errors: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
        }
    }

    pub fn record_chat(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.chat_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_image(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.image_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transcribe(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.transcribe_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_search(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.search_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_provider_error(&self) {
        self.provider_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot the counters. Cache hit/miss totals live in the cache store
    /// and are passed in by the caller.
    pub fn snapshot(&self, cache_hits: u64, cache_misses: u64) -> StatsSnapshot {
        StatsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            chat_requests: self.chat_requests.load(Ordering::Relaxed),
            image_requests: self.image_requests.load(Ordering::Relaxed),
            transcribe_requests: self.transcribe_requests.load(Ordering::Relaxed),
            search_requests: self.search_requests.load(Ordering::Relaxed),
            cache_hits,
            cache_misses,
            provider_errors: self.provider_errors.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
        }
    }
}

impl Default for GatewayStats {
    fn default() -> Self {
        Self::new()
    }
}
