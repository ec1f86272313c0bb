//! Run scheduling with failure backoff.
//!
//! The scheduler owns the JobRun state machine
//! (`pending -> running -> {completed|failed}`) and all JobSource health
//! bookkeeping. It holds only a store handle — never global state — and
//! re-reads rows through the store before every mutation.

use chrono::{TimeDelta, Utc};
use uuid::Uuid;

use crate::error::CrawlError;
use crate::models::{JobRun, RunCounters, RunStatus};
use crate::store::RunStore;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum sources scheduled in one pass.
    pub schedule_batch: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { schedule_batch: 100 }
    }
}

/// Schedules job sources and reports run outcomes.
#[derive(Clone)]
pub struct Scheduler<S: RunStore> {
    store: S,
    config: SchedulerConfig,
}

impl<S: RunStore> Scheduler<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, SchedulerConfig::default())
    }

    pub fn with_config(store: S, config: SchedulerConfig) -> Self {
        Self { store, config }
    }

    /// Collision-resistant run key: source id plus a random token.
    fn generate_run_key(source_id: Uuid) -> String {
        format!("{}:{}", source_id, Uuid::new_v4().simple())
    }

    /// Create one `pending` run for every source that is due (or every
    /// enabled source, when `force`), skipping sources that already have an
    /// outstanding pending/running run. Returns the scheduled source ids.
    pub async fn schedule_all_sources(
        &self,
        filter: Option<&[String]>,
        force: bool,
    ) -> Result<Vec<Uuid>, CrawlError> {
        let sources = if force {
            self.store.list_sources(filter).await?
        } else {
            self.store.sources_due(filter, self.config.schedule_batch).await?
        };

        let mut scheduled = Vec::new();
        for source in sources.iter().take(self.config.schedule_batch) {
            if self.store.outstanding_run(source.id).await?.is_some() {
                tracing::debug!(source = %source.name, "Outstanding run exists; not scheduling another");
                continue;
            }

            let run_key = Self::generate_run_key(source.id);
            match self.store.insert_run(source.id, &run_key).await? {
                Some(run) => {
                    tracing::info!(source = %source.name, run_id = %run.id, "Scheduled crawl");
                    scheduled.push(source.id);
                }
                // A concurrent scheduler won the race; their run stands.
                None => {
                    tracing::debug!(source = %source.name, "Lost scheduling race; skipping");
                }
            }
        }

        tracing::info!(scheduled = scheduled.len(), force, "Scheduling pass complete");
        Ok(scheduled)
    }

    /// Enqueue an immediate crawl for one source.
    ///
    /// Idempotent on `idempotency_key`: while a run with that key is
    /// pending/running, its id is returned unchanged. A source that already
    /// has an outstanding run returns that run's id. Unknown sources fail
    /// with [`CrawlError::SourceNotFound`].
    pub async fn enqueue_scrape(
        &self,
        source_id: Uuid,
        idempotency_key: Option<&str>,
    ) -> Result<Uuid, CrawlError> {
        let mut key_taken = false;
        if let Some(key) = idempotency_key {
            if let Some(existing) = self.store.find_run_by_key(key).await? {
                if !existing.status.is_terminal() {
                    tracing::info!(run_id = %existing.id, key, "Run already enqueued for key");
                    return Ok(existing.id);
                }
                // The key belongs to a finished run; a fresh key keeps the
                // unique run_key constraint satisfied.
                key_taken = true;
            }
        }

        let source = self
            .store
            .get_source(source_id)
            .await?
            .ok_or(CrawlError::SourceNotFound(source_id))?;

        if let Some(run) = self.store.outstanding_run(source_id).await? {
            tracing::info!(source = %source.name, run_id = %run.id, "Source already queued");
            return Ok(run.id);
        }

        let run_key = match idempotency_key {
            Some(key) if !key_taken => key.to_string(),
            _ => Self::generate_run_key(source_id),
        };

        match self.store.insert_run(source_id, &run_key).await? {
            Some(run) => {
                tracing::info!(source = %source.name, run_id = %run.id, "Enqueued crawl");
                Ok(run.id)
            }
            None => {
                // Raced with another enqueue; converge on whichever run won.
                self.store
                    .outstanding_run(source_id)
                    .await?
                    .map(|run| run.id)
                    .ok_or_else(|| {
                        CrawlError::Generic(format!(
                            "enqueue for source {source_id} raced but no outstanding run found"
                        ))
                    })
            }
        }
    }

    /// Pending runs ready to execute, oldest scheduled first.
    pub async fn pending_runs(&self, limit: usize) -> Result<Vec<JobRun>, CrawlError> {
        self.store.pending_runs(limit).await
    }

    pub async fn get_run(&self, run_id: Uuid) -> Result<Option<JobRun>, CrawlError> {
        self.store.get_run(run_id).await
    }

    pub async fn get_source(
        &self,
        source_id: Uuid,
    ) -> Result<Option<crate::models::JobSource>, CrawlError> {
        self.store.get_source(source_id).await
    }

    /// Claim a run for a worker: atomic `pending -> running`.
    ///
    /// `None` means the run is missing or another worker claimed it first;
    /// both are logged, neither is an error.
    pub async fn mark_run_started(
        &self,
        run_id: Uuid,
        worker_id: &str,
    ) -> Result<Option<JobRun>, CrawlError> {
        let claimed = self.store.start_run(run_id, worker_id).await?;
        match &claimed {
            Some(run) => tracing::info!(%run_id, worker_id, source_id = %run.source_id, "Run started"),
            None => tracing::debug!(%run_id, worker_id, "Run missing or already claimed"),
        }
        Ok(claimed)
    }

    /// Terminally complete a run and update the owning source's health:
    /// `last_scraped_at` always moves to now; `failure_count` resets to 0
    /// on success and increments by exactly 1 on failure, which drives the
    /// scheduling backoff.
    pub async fn mark_run_completed(
        &self,
        run_id: Uuid,
        counters: RunCounters,
        error_message: Option<&str>,
    ) -> Result<(), CrawlError> {
        let status = if error_message.is_none() {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };

        match self
            .store
            .finish_run(run_id, status, counters, error_message)
            .await?
        {
            Some(run) => {
                self.store
                    .record_source_outcome(run.source_id, error_message.is_none())
                    .await?;
                tracing::info!(
                    %run_id,
                    status = %status,
                    raw = counters.raw,
                    new = counters.new,
                    merged = counters.merged,
                    error = error_message.unwrap_or(""),
                    "Run finished"
                );
            }
            None => tracing::warn!(%run_id, "Cannot complete unknown run"),
        }

        Ok(())
    }

    /// Delete `completed` runs older than the retention window. `failed`
    /// runs are always kept for diagnosis.
    pub async fn cleanup_old_runs(&self, retention_days: u32) -> Result<u64, CrawlError> {
        let cutoff = Utc::now() - TimeDelta::days(i64::from(retention_days));
        let deleted = self.store.delete_completed_runs_before(cutoff).await?;
        tracing::info!(deleted, retention_days, "Cleaned up old runs");
        Ok(deleted)
    }

    /// Return `running` runs older than `stale_after` to `pending` so they
    /// become claimable again after a worker crash or interrupt.
    pub async fn reclaim_stale_runs(&self, stale_after: TimeDelta) -> Result<u64, CrawlError> {
        let cutoff = Utc::now() - stale_after;
        let reclaimed = self.store.reclaim_stale_runs(cutoff).await?;
        if reclaimed > 0 {
            tracing::warn!(reclaimed, "Reclaimed stale running runs");
        }
        Ok(reclaimed)
    }
}
