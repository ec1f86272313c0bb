use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::CrawlError;
use crate::models::{
    CanonicalRecord, JobRun, JobSource, NewJobSource, RunCounters, RunStatus, StoredPage,
};

/// Persistent store for job sources and job runs.
///
/// This is the single source of truth shared by all schedulers and workers.
/// Implementations must make every state transition an atomic
/// read-modify-write: in particular [`RunStore::start_run`] must succeed only
/// while the run is still `pending` (conditional update or equivalent), so
/// that two workers can never claim the same run.
pub trait RunStore: Send + Sync + Clone {
    fn insert_source(
        &self,
        source: NewJobSource,
    ) -> impl Future<Output = Result<JobSource, CrawlError>> + Send;

    fn get_source(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<JobSource>, CrawlError>> + Send;

    /// All enabled sources, optionally restricted to the given names.
    fn list_sources(
        &self,
        filter: Option<&[String]>,
    ) -> impl Future<Output = Result<Vec<JobSource>, CrawlError>> + Send;

    /// Enabled sources whose interval (stretched by failure backoff) has
    /// elapsed, oldest-due first, bounded by `limit`.
    fn sources_due(
        &self,
        filter: Option<&[String]>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<JobSource>, CrawlError>> + Send;

    /// The source's pending or running run, if one exists.
    fn outstanding_run(
        &self,
        source_id: Uuid,
    ) -> impl Future<Output = Result<Option<JobRun>, CrawlError>> + Send;

    fn find_run_by_key(
        &self,
        run_key: &str,
    ) -> impl Future<Output = Result<Option<JobRun>, CrawlError>> + Send;

    /// Create a `pending` run for the source.
    ///
    /// Returns `None` when the source already has an outstanding
    /// pending/running run or the run key is taken — racing schedulers
    /// degrade to a skip, never a duplicate.
    fn insert_run(
        &self,
        source_id: Uuid,
        run_key: &str,
    ) -> impl Future<Output = Result<Option<JobRun>, CrawlError>> + Send;

    fn get_run(&self, id: Uuid)
    -> impl Future<Output = Result<Option<JobRun>, CrawlError>> + Send;

    /// Pending runs ordered by `scheduled_at` ascending (oldest first).
    fn pending_runs(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<JobRun>, CrawlError>> + Send;

    /// Runs for inspection, newest scheduled first, optionally filtered by
    /// status.
    fn list_runs(
        &self,
        status: Option<RunStatus>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<JobRun>, CrawlError>> + Send;

    /// Atomically claim a run: `pending -> running`, setting `started_at`
    /// and `worker_id`. Returns `None` if the run is missing or no longer
    /// pending.
    fn start_run(
        &self,
        id: Uuid,
        worker_id: &str,
    ) -> impl Future<Output = Result<Option<JobRun>, CrawlError>> + Send;

    /// Terminally complete a run with its counters and optional error.
    /// Returns the updated run, or `None` if it is missing.
    fn finish_run(
        &self,
        id: Uuid,
        status: RunStatus,
        counters: RunCounters,
        error: Option<&str>,
    ) -> impl Future<Output = Result<Option<JobRun>, CrawlError>> + Send;

    /// Bump the source's `last_scraped_at` to now; reset `failure_count`
    /// on success, increment it on failure.
    fn record_source_outcome(
        &self,
        source_id: Uuid,
        success: bool,
    ) -> impl Future<Output = Result<(), CrawlError>> + Send;

    /// Delete `completed` runs finished before the cutoff. `failed` runs
    /// are never deleted here; they are kept for diagnosis.
    fn delete_completed_runs_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, CrawlError>> + Send;

    /// Return `running` runs started before the cutoff to `pending` so a
    /// later pass can re-claim them (worker crash/interrupt recovery).
    fn reclaim_stale_runs(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, CrawlError>> + Send;

    fn count_sources(&self) -> impl Future<Output = Result<i64, CrawlError>> + Send;

    fn count_runs(
        &self,
        status: RunStatus,
    ) -> impl Future<Output = Result<i64, CrawlError>> + Send;
}

/// Persistent store for canonical pages, keyed by normalized URL with a
/// secondary fingerprint-bucket index for dedup candidate lookup.
pub trait PageStore: Send + Sync + Clone {
    fn find_by_url(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Option<StoredPage>, CrawlError>> + Send;

    /// Bounded candidate set for near-duplicate lookup: pages in the same
    /// fingerprint bucket and domain, most recently seen first, at most
    /// `top_k`. Keeps classification O(K), not O(all pages).
    fn find_fingerprint_candidates(
        &self,
        bucket: i64,
        domain: &str,
        top_k: usize,
    ) -> impl Future<Output = Result<Vec<StoredPage>, CrawlError>> + Send;

    /// Insert a new page. Returns the generated id.
    fn insert_page(
        &self,
        record: &CanonicalRecord,
    ) -> impl Future<Output = Result<Uuid, CrawlError>> + Send;

    /// Overwrite an existing page's content with a fresh record.
    fn update_page(
        &self,
        id: Uuid,
        record: &CanonicalRecord,
    ) -> impl Future<Output = Result<(), CrawlError>> + Send;

    fn count_pages(&self) -> impl Future<Output = Result<i64, CrawlError>> + Send;
}
