//! Fixed-window rate limiting, per route and per client address.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::config::RateLimitConfig;
use crate::error::RouteError;

/// Fixed-window counter for a single client.
///
/// Tracks the number of requests in the current window. Resets when the
/// window expires.
struct FixedWindow {
    /// Requests remaining in the current window.
    remaining: AtomicU64,
    /// Epoch second when the current window started.
    window_start: AtomicU64,
    /// Maximum requests per window.
    max_requests: u64,
    /// Window duration in seconds.
    window_secs: u64,
}

impl FixedWindow {
    fn new(max_requests: u64, window_secs: u64, now: u64) -> Self {
        Self {
            remaining: AtomicU64::new(max_requests),
            window_start: AtomicU64::new(now),
            max_requests,
            window_secs,
        }
    }

    /// Try to consume one request at epoch second `now`.
    ///
    /// Note: there is a benign TOCTOU race between checking `window_start`
    /// and resetting it; two concurrent threads may both see an expired
    /// window and reset it, granting a few extra requests at the window
    /// boundary. Approximate enforcement is sufficient here and avoids a
    /// Mutex on the hot path.
    fn check_at(&self, now: u64) -> bool {
        let window = self.window_start.load(Ordering::Relaxed);
        if now.saturating_sub(window) >= self.window_secs {
            // Window expired, reset
            self.window_start.store(now, Ordering::Relaxed);
            self.remaining
                .store(self.max_requests.saturating_sub(1), Ordering::Relaxed);
            return self.max_requests > 0;
        }

        loop {
            let current = self.remaining.load(Ordering::Relaxed);
            if current == 0 {
                return false;
            }
            if self
                .remaining
                .compare_exchange_weak(current, current - 1, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }
}

fn epoch_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Per-client-address limiter for one route.
///
/// Prevents one client from exhausting the budget for everyone.
pub struct RouteLimiter {
    route: &'static str,
    windows: RwLock<HashMap<IpAddr, FixedWindow>>,
    max_requests: u64,
    window_secs: u64,
}

impl RouteLimiter {
    pub fn new(route: &'static str, max_requests: u64, window_secs: u64) -> Self {
        Self {
            route,
            windows: RwLock::new(HashMap::new()),
            max_requests,
            window_secs,
        }
    }

    /// Admit or reject one request from `client`.
    pub fn check(&self, client: IpAddr) -> Result<(), RouteError> {
        self.check_at(client, epoch_now())
    }

    fn check_at(&self, client: IpAddr, now: u64) -> Result<(), RouteError> {
        // Fast path: existing window under the read lock. On lock
        // poisoning, admit rather than take the server down.
        {
            let map = match self.windows.read() {
                Ok(m) => m,
                Err(e) => e.into_inner(),
            };
            if let Some(window) = map.get(&client) {
                return if window.check_at(now) {
                    Ok(())
                } else {
                    Err(RouteError::RateLimited { route: self.route })
                };
            }
        }
        // Slow path: create the window under the write lock. Piggyback a
        // sweep of long-idle clients so the map does not grow without
        // bound as addresses come and go.
        let mut map = match self.windows.write() {
            Ok(m) => m,
            Err(e) => e.into_inner(),
        };
        let stale_after = self.window_secs.saturating_mul(2);
        map.retain(|_, w| {
            now.saturating_sub(w.window_start.load(Ordering::Relaxed)) < stale_after
        });
        let window = map
            .entry(client)
            .or_insert_with(|| FixedWindow::new(self.max_requests, self.window_secs, now));
        if window.check_at(now) {
            Ok(())
        } else {
            Err(RouteError::RateLimited { route: self.route })
        }
    }
}

/// The gateway's rate limiters, one per throttled route.
pub struct GatewayLimiters {
    pub chat: RouteLimiter,
    pub search: RouteLimiter,
    pub stats: RouteLimiter,
}

impl GatewayLimiters {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            chat: RouteLimiter::new("chat", config.chat_per_minute, 60),
            search: RouteLimiter::new("search", config.search_per_minute, 60),
            stats: RouteLimiter::new("stats", config.stats_per_minute, 60),
        }
    }
}
