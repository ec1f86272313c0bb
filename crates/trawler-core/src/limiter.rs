//! Per-origin request rate limiting for polite fetching.
//!
//! Callers [`acquire`](RateLimiter::acquire) a slot for an origin before
//! each request. Slots within one origin are spaced by the configured
//! interval; distinct origins never wait on each other. The limiter is
//! cheaply cloneable and must be shared across all worker units that can
//! target the same origins, so politeness holds fleet-wide.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use url::Url;

use crate::error::CrawlError;

/// Configuration for the per-origin rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Minimum delay between consecutive requests to the same origin.
    pub interval: Duration,

    /// Maximum random jitter added on top of `interval` (uniform [0, jitter]).
    /// Set to `Duration::ZERO` to disable.
    pub jitter: Duration,

    /// Upper bound on how long a single `acquire` may wait. A caller whose
    /// projected wait exceeds this fails fast with `RateLimitTimeout`
    /// without consuming a slot.
    pub acquire_timeout: Duration,
}

impl RateLimiterConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            jitter: Duration::ZERO,
            acquire_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

impl Default for RateLimiterConfig {
    /// 1 second interval, 500ms jitter — a sensible default for polite crawling.
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            jitter: Duration::from_millis(500),
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// Per-origin token gate. Tracks the next permitted request time for each
/// origin (scheme://host:port); `acquire` reserves the next slot and sleeps
/// until it opens. Thread-safe: concurrent callers against one origin are
/// serialized to the interval, other origins proceed unconstrained.
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    /// Next permitted request instant per origin key.
    next_slot: Arc<Mutex<HashMap<String, Instant>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            next_slot: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Extract the origin key from a URL (scheme://host:port).
    pub fn origin_key(url_str: &str) -> Option<String> {
        let url = Url::parse(url_str).ok()?;
        let host = url.host_str()?;
        let port = url
            .port_or_known_default()
            .map(|p| format!(":{p}"))
            .unwrap_or_default();
        Some(format!("{}://{}{}", url.scheme(), host, port))
    }

    /// Wait until a request to `origin` is permitted, then return.
    ///
    /// Never blocks indefinitely: if the projected wait exceeds the
    /// configured `acquire_timeout`, fails with
    /// [`CrawlError::RateLimitTimeout`] without reserving a slot.
    pub async fn acquire(&self, origin: &str) -> Result<(), CrawlError> {
        let now = Instant::now();

        let wait = {
            let mut slots = self.next_slot.lock().await;
            let slot = slots.entry(origin.to_string()).or_insert(now);
            let open_at = (*slot).max(now);
            let wait = open_at - now;

            if wait > self.config.acquire_timeout {
                return Err(CrawlError::RateLimitTimeout {
                    origin: origin.to_string(),
                    waited_ms: self.config.acquire_timeout.as_millis() as u64,
                });
            }

            // Reserve the slot before sleeping so concurrent callers queue
            // behind this one instead of racing for the same opening.
            *slot = open_at + self.config.interval + jitter_duration(self.config.jitter);
            wait
        };

        if !wait.is_zero() {
            tracing::debug!(origin, wait_ms = %wait.as_millis(), "Rate limiting request");
            tokio::time::sleep(wait).await;
        }

        Ok(())
    }

    /// Acquire using the origin of `url`. URLs without a parseable origin
    /// pass through unlimited.
    pub async fn acquire_url(&self, url: &str) -> Result<(), CrawlError> {
        match Self::origin_key(url) {
            Some(origin) => self.acquire(&origin).await,
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Deterministic jitter based on std — avoids pulling in the `rand` crate.
// Uses a simple xorshift seeded from the current time.
// ---------------------------------------------------------------------------

fn jitter_duration(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    // xorshift64
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    Duration::from_millis(x % max_ms)
}
