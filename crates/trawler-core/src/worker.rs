//! The worker loop: claim pending runs, drive the pipeline, report back.
//!
//! A single unhandled failure in one run must never crash the loop — the
//! per-run boundary converts stage errors into the run's `error_message`
//! and moves on. Store failures at the polling level are treated as a bad
//! cycle: logged, backed off, retried.

use std::time::Duration;

use chrono::TimeDelta;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::CrawlError;
use crate::fetch::Fetcher;
use crate::models::{JobRun, RunCounters, RunOutcome};
use crate::pipeline::CrawlPipeline;
use crate::scheduler::Scheduler;
use crate::store::{PageStore, RunStore};

/// Events emitted by the worker for monitoring/logging.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    Started { worker_id: &'a str },
    Polling,
    RunClaimed { run: &'a JobRun },
    RunCompleted { run_id: Uuid, counters: RunCounters },
    RunFailed { run_id: Uuid, error: &'a str },
    Stopped { worker_id: &'a str },
}

/// Trait for receiving worker events (decoupled logging).
pub trait WorkerReporter: Send + Sync {
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started { worker_id } => {
                tracing::info!(%worker_id, "Worker started");
            }
            WorkerEvent::Polling => {
                tracing::debug!("Polling for pending runs");
            }
            WorkerEvent::RunClaimed { run } => {
                tracing::info!(run_id = %run.id, source_id = %run.source_id, "Run claimed");
            }
            WorkerEvent::RunCompleted { run_id, counters } => {
                tracing::info!(
                    %run_id,
                    raw = counters.raw,
                    new = counters.new,
                    merged = counters.merged,
                    "Run completed"
                );
            }
            WorkerEvent::RunFailed { run_id, error } => {
                tracing::warn!(%run_id, %error, "Run failed");
            }
            WorkerEvent::Stopped { worker_id } => {
                tracing::info!(%worker_id, "Worker stopped");
            }
        }
    }
}

/// Configuration for a worker instance.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub poll_interval: Duration,
    /// Pending runs claimed per poll.
    pub claim_batch: usize,
    /// Age past which a `running` run counts as abandoned and is reclaimed.
    pub stale_after: TimeDelta,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", &Uuid::new_v4().to_string()[..8]),
            poll_interval: Duration::from_secs(5),
            claim_batch: 5,
            stale_after: TimeDelta::minutes(30),
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Polls the scheduler for pending runs and executes them.
pub struct Worker<S, P, F>
where
    S: RunStore,
    P: PageStore,
    F: Fetcher,
{
    scheduler: Scheduler<S>,
    pipeline: CrawlPipeline<F, P>,
    config: WorkerConfig,
}

impl<S, P, F> Worker<S, P, F>
where
    S: RunStore,
    P: PageStore,
    F: Fetcher,
{
    pub fn new(scheduler: Scheduler<S>, pipeline: CrawlPipeline<F, P>, config: WorkerConfig) -> Self {
        Self {
            scheduler,
            pipeline,
            config,
        }
    }

    /// Drain currently-pending runs, then return the number processed.
    ///
    /// Runs another worker claims first are skipped. Store errors here are
    /// cycle-fatal and propagate to the caller.
    pub async fn run_once<R: WorkerReporter>(&self, reporter: &R) -> Result<usize, CrawlError> {
        let mut processed = 0;

        loop {
            let pending = self.scheduler.pending_runs(self.config.claim_batch).await?;
            if pending.is_empty() {
                break;
            }

            for run in pending {
                let Some(claimed) = self
                    .scheduler
                    .mark_run_started(run.id, &self.config.worker_id)
                    .await?
                else {
                    continue;
                };
                reporter.report(WorkerEvent::RunClaimed { run: &claimed });

                let outcome = self.process_run(&claimed).await;
                match &outcome.error {
                    None => reporter.report(WorkerEvent::RunCompleted {
                        run_id: claimed.id,
                        counters: outcome.counters,
                    }),
                    Some(error) => reporter.report(WorkerEvent::RunFailed {
                        run_id: claimed.id,
                        error,
                    }),
                }

                self.scheduler
                    .mark_run_completed(claimed.id, outcome.counters, outcome.error.as_deref())
                    .await?;
                processed += 1;
            }
        }

        Ok(processed)
    }

    /// Execute one claimed run inside the per-run error boundary. Stage
    /// errors become the run's error message, never a loop crash; counters
    /// keep whatever progress was made before the failure.
    async fn process_run(&self, run: &JobRun) -> RunOutcome {
        let mut counters = RunCounters::default();
        let result = self.execute(run, &mut counters).await;
        RunOutcome {
            counters,
            error: result.err().map(|e| e.to_string()),
        }
    }

    async fn execute(&self, run: &JobRun, counters: &mut RunCounters) -> Result<(), CrawlError> {
        // Re-fetch the source rather than trusting anything cached; the
        // store is the single source of truth.
        let source = self
            .scheduler
            .get_source(run.source_id)
            .await?
            .ok_or(CrawlError::SourceNotFound(run.source_id))?;

        self.pipeline.crawl_source(&source, counters).await
    }

    /// Poll-sleep loop until cancelled.
    ///
    /// Each cycle first reclaims stale `running` runs, then drains pending
    /// work. A cycle that fails at the store level sleeps twice the poll
    /// interval before retrying. Cancellation interrupts the sleep, not an
    /// in-flight run: an interrupted run stays `running` and is reclaimed
    /// by a later pass.
    pub async fn run_continuously<R: WorkerReporter>(
        &self,
        cancel_token: CancellationToken,
        reporter: &R,
    ) -> Result<(), CrawlError> {
        reporter.report(WorkerEvent::Started {
            worker_id: &self.config.worker_id,
        });

        loop {
            if cancel_token.is_cancelled() {
                break;
            }

            if let Err(e) = self.scheduler.reclaim_stale_runs(self.config.stale_after).await {
                tracing::error!(error = %e, "Stale-run reclaim failed");
            }

            reporter.report(WorkerEvent::Polling);

            let sleep_for = match self.run_once(reporter).await {
                Ok(_) => self.config.poll_interval,
                Err(e) => {
                    tracing::error!(error = %e, "Worker cycle failed");
                    self.config.poll_interval * 2
                }
            };

            tokio::select! {
                () = tokio::time::sleep(sleep_for) => {}
                () = cancel_token.cancelled() => break,
            }
        }

        reporter.report(WorkerEvent::Stopped {
            worker_id: &self.config.worker_id,
        });

        Ok(())
    }
}
