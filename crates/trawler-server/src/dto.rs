use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use trawler_core::models::{CrawlStats, JobRun};
use trawler_core::pipeline::AdHocCrawl;

// ---------------------------------------------------------------------------
// Trigger crawl
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct TriggerCrawlRequest {
    pub url: String,
    /// Optional keyword hints to match alongside the built-in vocabulary.
    pub keywords: Option<Vec<String>>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TriggerCrawlResponse {
    pub url: String,
    pub title: Option<String>,
    pub extracted_keywords: Vec<String>,
    pub links: Vec<String>,
    pub status: String,
}

impl From<AdHocCrawl> for TriggerCrawlResponse {
    fn from(crawl: AdHocCrawl) -> Self {
        Self {
            url: crawl.url,
            title: crawl.title,
            extracted_keywords: crawl.extracted_keywords,
            links: crawl.links,
            status: crawl.status,
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct ScheduleRequest {
    /// Restrict scheduling to these source names.
    pub sources: Option<Vec<String>>,
    /// Schedule even sources that are not yet due.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ScheduleResponse {
    pub scheduled: Vec<Uuid>,
    pub count: usize,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct EnqueueRequest {
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct EnqueueResponse {
    pub run_id: Uuid,
    pub status: String,
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RunResponse {
    pub id: Uuid,
    pub source_id: Uuid,
    pub run_key: String,
    pub status: String,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub raw_count: u32,
    pub new_count: u32,
    pub merged_count: u32,
    pub error_message: Option<String>,
    pub worker_id: Option<String>,
}

impl From<JobRun> for RunResponse {
    fn from(run: JobRun) -> Self {
        Self {
            id: run.id,
            source_id: run.source_id,
            run_key: run.run_key,
            status: run.status.to_string(),
            scheduled_at: run.scheduled_at,
            started_at: run.started_at,
            completed_at: run.completed_at,
            raw_count: run.raw_count,
            new_count: run.new_count,
            merged_count: run.merged_count,
            error_message: run.error_message,
            worker_id: run.worker_id,
        }
    }
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListRunsQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RunListResponse {
    pub runs: Vec<RunResponse>,
    pub total: usize,
}

// ---------------------------------------------------------------------------
// Stats & health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StatsResponse {
    pub source_count: i64,
    pub page_count: i64,
    pub crawled_count: i64,
}

impl From<CrawlStats> for StatsResponse {
    fn from(stats: CrawlStats) -> Self {
        Self {
            source_count: stats.source_count,
            page_count: stats.page_count,
            crawled_count: stats.crawled_count,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
