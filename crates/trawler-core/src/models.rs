use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::dedup::Fingerprint;

/// Status of a job run in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(format!("Unknown run status: {}", s)),
        }
    }
}

/// Scheduling backoff multiplier for a source with `failure_count`
/// consecutive failures. Doubles per failure, capped at 2^5.
pub fn backoff_multiplier(failure_count: u32) -> u32 {
    1 << failure_count.min(5)
}

/// A configured crawl target with scheduling metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSource {
    pub id: Uuid,
    pub name: String,
    pub base_url: String,
    pub enabled: bool,
    pub scrape_interval_minutes: u32,
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub failure_count: u32,
    pub created_at: DateTime<Utc>,
}

impl JobSource {
    /// Whether this source is due for a new crawl at `now`.
    ///
    /// A source never scraped is always due. Otherwise the configured
    /// interval is stretched by the failure backoff multiplier.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_scraped_at {
            None => true,
            Some(last) => {
                let minutes = i64::from(self.scrape_interval_minutes)
                    * i64::from(backoff_multiplier(self.failure_count));
                now >= last + TimeDelta::minutes(minutes)
            }
        }
    }
}

/// Request to register a new job source.
#[derive(Debug, Clone)]
pub struct NewJobSource {
    pub name: String,
    pub base_url: String,
    pub scrape_interval_minutes: u32,
    pub enabled: bool,
}

impl NewJobSource {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            scrape_interval_minutes: 60,
            enabled: true,
        }
    }

    pub fn with_interval_minutes(mut self, minutes: u32) -> Self {
        self.scrape_interval_minutes = minutes;
        self
    }
}

/// One scheduled/executed crawl attempt against a job source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub id: Uuid,
    pub source_id: Uuid,
    /// Idempotency token. Unique across runs.
    pub run_key: String,
    pub status: RunStatus,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub raw_count: u32,
    pub new_count: u32,
    pub merged_count: u32,
    pub error_message: Option<String>,
    pub worker_id: Option<String>,
}

/// Outcome counters reported by the worker for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub raw: u32,
    pub new: u32,
    pub merged: u32,
}

/// Full result of processing one run, including the terminal error if any.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub counters: RunCounters,
    pub error: Option<String>,
}

/// Raw structured record produced by an extractor. Ephemeral; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    /// Subject URL of the record (the page itself for web extraction).
    pub url: Option<String>,
    pub title: Option<String>,
    pub text: String,
    pub links: Vec<String>,
}

/// Normalized, stable-shaped record produced by the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    pub url: String,
    pub domain: String,
    pub title: Option<String>,
    pub text: String,
    pub links: Vec<String>,
    /// SHA-256 of the normalized text, for exact change detection.
    pub content_hash: String,
    pub fingerprint: Fingerprint,
    pub normalized_at: DateTime<Utc>,
}

/// Slim view of a persisted page, as much as dedup classification needs.
#[derive(Debug, Clone)]
pub struct StoredPage {
    pub id: Uuid,
    pub url: String,
    pub content_hash: String,
    pub fingerprint: Fingerprint,
    pub last_seen_at: DateTime<Utc>,
}

/// Aggregate counts reported by the stats endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CrawlStats {
    pub source_count: i64,
    pub page_count: i64,
    pub crawled_count: i64,
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
