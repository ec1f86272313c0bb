use trawler_core::RateLimiter;
use trawler_db::Database;

/// Shared application state, available to all route handlers via `State<Arc<AppState>>`.
pub struct AppState {
    pub db: Database,
    /// API key protecting everything except the health probe.
    pub api_key: String,
    /// Politeness limiter shared by every trigger-crawl fetch.
    pub limiter: RateLimiter,
}
