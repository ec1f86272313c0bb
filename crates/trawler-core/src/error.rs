use thiserror::Error;
use uuid::Uuid;

/// Application-wide error types for Trawler.
#[derive(Error, Debug)]
pub enum CrawlError {
    /// The per-origin rate limiter could not grant a slot within the
    /// caller's bound. Not the target's fault; the caller backs off.
    #[error("rate limit wait for '{origin}' exceeded {waited_ms}ms")]
    RateLimitTimeout { origin: String, waited_ms: u64 },

    /// A fetch attempt failed. `transient` failures are retried by the
    /// fetch client; permanent ones surface as run failures.
    #[error("fetch error: {message}")]
    Fetch {
        message: String,
        status: Option<u16>,
        transient: bool,
    },

    /// Request timed out.
    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    /// Payload could not be parsed into a raw record. Content is presumed
    /// malformed, not transient; never retried.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// A raw record is missing mandatory fields (URL) or carries an
    /// unparseable one.
    #[error("normalization error: {0}")]
    Normalization(String),

    /// Caller referenced a job source that does not exist.
    #[error("job source not found: {0}")]
    SourceNotFound(Uuid),

    /// Persistence operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// JSON serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid or missing configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl CrawlError {
    /// Shorthand for a transient fetch failure.
    pub fn fetch_transient(message: impl Into<String>, status: Option<u16>) -> Self {
        CrawlError::Fetch {
            message: message.into(),
            status,
            transient: true,
        }
    }

    /// Shorthand for a permanent fetch failure.
    pub fn fetch_permanent(message: impl Into<String>, status: Option<u16>) -> Self {
        CrawlError::Fetch {
            message: message.into(),
            status,
            transient: false,
        }
    }

    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            CrawlError::Fetch { transient, .. } => *transient,
            CrawlError::Timeout(_) | CrawlError::RateLimitTimeout { .. } => true,
            _ => false,
        }
    }
}
