use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use trawler_core::error::CrawlError;
use trawler_core::models::{JobRun, JobSource, NewJobSource, RunCounters, RunStatus};
use trawler_core::store::RunStore;

/// PostgreSQL-backed run store.
///
/// Claims use a conditional `UPDATE ... WHERE status = 'pending'`; the
/// one-outstanding-run-per-source rule is a partial unique index, so
/// `insert_run` resolves races with `ON CONFLICT DO NOTHING`.
#[derive(Clone)]
pub struct CrawlRunRepository {
    pool: Pool<Postgres>,
}

impl CrawlRunRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// -- Internal row types for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct JobSourceRow {
    id: Uuid,
    name: String,
    base_url: String,
    enabled: bool,
    scrape_interval_minutes: i32,
    last_scraped_at: Option<DateTime<Utc>>,
    failure_count: i32,
    created_at: DateTime<Utc>,
}

impl From<JobSourceRow> for JobSource {
    fn from(row: JobSourceRow) -> Self {
        JobSource {
            id: row.id,
            name: row.name,
            base_url: row.base_url,
            enabled: row.enabled,
            scrape_interval_minutes: row.scrape_interval_minutes.max(0) as u32,
            last_scraped_at: row.last_scraped_at,
            failure_count: row.failure_count.max(0) as u32,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct JobRunRow {
    id: Uuid,
    source_id: Uuid,
    run_key: String,
    status: String,
    scheduled_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    raw_count: i32,
    new_count: i32,
    merged_count: i32,
    error_message: Option<String>,
    worker_id: Option<String>,
}

impl From<JobRunRow> for JobRun {
    fn from(row: JobRunRow) -> Self {
        JobRun {
            id: row.id,
            source_id: row.source_id,
            run_key: row.run_key,
            status: row.status.parse().unwrap_or(RunStatus::Pending),
            scheduled_at: row.scheduled_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            raw_count: row.raw_count.max(0) as u32,
            new_count: row.new_count.max(0) as u32,
            merged_count: row.merged_count.max(0) as u32,
            error_message: row.error_message,
            worker_id: row.worker_id,
        }
    }
}

impl RunStore for CrawlRunRepository {
    async fn insert_source(&self, source: NewJobSource) -> Result<JobSource, CrawlError> {
        let row = sqlx::query_as::<_, JobSourceRow>(
            r#"
            INSERT INTO job_sources (name, base_url, scrape_interval_minutes, enabled)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO UPDATE SET
                base_url = EXCLUDED.base_url,
                scrape_interval_minutes = EXCLUDED.scrape_interval_minutes,
                enabled = EXCLUDED.enabled
            RETURNING *
            "#,
        )
        .bind(&source.name)
        .bind(&source.base_url)
        .bind(source.scrape_interval_minutes as i32)
        .bind(source.enabled)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CrawlError::Database(e.to_string()))?;

        Ok(row.into())
    }

    async fn get_source(&self, id: Uuid) -> Result<Option<JobSource>, CrawlError> {
        let row = sqlx::query_as::<_, JobSourceRow>(r#"SELECT * FROM job_sources WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CrawlError::Database(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn list_sources(&self, filter: Option<&[String]>) -> Result<Vec<JobSource>, CrawlError> {
        let rows = if let Some(names) = filter {
            sqlx::query_as::<_, JobSourceRow>(
                r#"
                SELECT * FROM job_sources
                WHERE enabled AND name = ANY($1)
                ORDER BY name
                "#,
            )
            .bind(names)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, JobSourceRow>(
                r#"SELECT * FROM job_sources WHERE enabled ORDER BY name"#,
            )
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| CrawlError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn sources_due(
        &self,
        filter: Option<&[String]>,
        limit: usize,
    ) -> Result<Vec<JobSource>, CrawlError> {
        // The backoff-stretched interval check lives in JobSource::is_due so
        // the formula exists in exactly one place; candidates come back
        // oldest-scraped first.
        let rows = if let Some(names) = filter {
            sqlx::query_as::<_, JobSourceRow>(
                r#"
                SELECT * FROM job_sources
                WHERE enabled AND name = ANY($1)
                ORDER BY last_scraped_at ASC NULLS FIRST
                "#,
            )
            .bind(names)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, JobSourceRow>(
                r#"
                SELECT * FROM job_sources
                WHERE enabled
                ORDER BY last_scraped_at ASC NULLS FIRST
                "#,
            )
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| CrawlError::Database(e.to_string()))?;

        let now = Utc::now();
        let mut due: Vec<JobSource> = rows
            .into_iter()
            .map(JobSource::from)
            .filter(|s| s.is_due(now))
            .collect();
        due.truncate(limit);
        Ok(due)
    }

    async fn outstanding_run(&self, source_id: Uuid) -> Result<Option<JobRun>, CrawlError> {
        let row = sqlx::query_as::<_, JobRunRow>(
            r#"
            SELECT * FROM job_runs
            WHERE source_id = $1 AND status IN ('pending', 'running')
            LIMIT 1
            "#,
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CrawlError::Database(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn find_run_by_key(&self, run_key: &str) -> Result<Option<JobRun>, CrawlError> {
        let row = sqlx::query_as::<_, JobRunRow>(r#"SELECT * FROM job_runs WHERE run_key = $1"#)
            .bind(run_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CrawlError::Database(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn insert_run(
        &self,
        source_id: Uuid,
        run_key: &str,
    ) -> Result<Option<JobRun>, CrawlError> {
        // DO NOTHING covers both the unique run_key and the partial unique
        // outstanding-run index; a conflict returns no row.
        let row = sqlx::query_as::<_, JobRunRow>(
            r#"
            INSERT INTO job_runs (source_id, run_key)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            RETURNING *
            "#,
        )
        .bind(source_id)
        .bind(run_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CrawlError::Database(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<JobRun>, CrawlError> {
        let row = sqlx::query_as::<_, JobRunRow>(r#"SELECT * FROM job_runs WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CrawlError::Database(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn pending_runs(&self, limit: usize) -> Result<Vec<JobRun>, CrawlError> {
        let rows = sqlx::query_as::<_, JobRunRow>(
            r#"
            SELECT * FROM job_runs
            WHERE status = 'pending'
            ORDER BY scheduled_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CrawlError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_runs(
        &self,
        status: Option<RunStatus>,
        limit: usize,
    ) -> Result<Vec<JobRun>, CrawlError> {
        let rows = if let Some(status) = status {
            sqlx::query_as::<_, JobRunRow>(
                r#"
                SELECT * FROM job_runs
                WHERE status = $1
                ORDER BY scheduled_at DESC
                LIMIT $2
                "#,
            )
            .bind(status.as_str())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, JobRunRow>(
                r#"
                SELECT * FROM job_runs
                ORDER BY scheduled_at DESC
                LIMIT $1
                "#,
            )
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| CrawlError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn start_run(&self, id: Uuid, worker_id: &str) -> Result<Option<JobRun>, CrawlError> {
        let row = sqlx::query_as::<_, JobRunRow>(
            r#"
            UPDATE job_runs
            SET status = 'running', started_at = NOW(), worker_id = $2
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CrawlError::Database(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn finish_run(
        &self,
        id: Uuid,
        status: RunStatus,
        counters: RunCounters,
        error: Option<&str>,
    ) -> Result<Option<JobRun>, CrawlError> {
        let row = sqlx::query_as::<_, JobRunRow>(
            r#"
            UPDATE job_runs
            SET status = $2, completed_at = NOW(),
                raw_count = $3, new_count = $4, merged_count = $5,
                error_message = $6, worker_id = NULL
            WHERE id = $1 AND status IN ('pending', 'running')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(counters.raw as i32)
        .bind(counters.new as i32)
        .bind(counters.merged as i32)
        .bind(error)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CrawlError::Database(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn record_source_outcome(
        &self,
        source_id: Uuid,
        success: bool,
    ) -> Result<(), CrawlError> {
        sqlx::query(
            r#"
            UPDATE job_sources
            SET last_scraped_at = NOW(),
                failure_count = CASE WHEN $2 THEN 0 ELSE failure_count + 1 END
            WHERE id = $1
            "#,
        )
        .bind(source_id)
        .bind(success)
        .execute(&self.pool)
        .await
        .map_err(|e| CrawlError::Database(e.to_string()))?;

        Ok(())
    }

    async fn delete_completed_runs_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, CrawlError> {
        let result = sqlx::query(
            r#"DELETE FROM job_runs WHERE status = 'completed' AND completed_at < $1"#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| CrawlError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn reclaim_stale_runs(&self, cutoff: DateTime<Utc>) -> Result<u64, CrawlError> {
        let result = sqlx::query(
            r#"
            UPDATE job_runs
            SET status = 'pending', started_at = NULL, worker_id = NULL
            WHERE status = 'running' AND started_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| CrawlError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn count_sources(&self) -> Result<i64, CrawlError> {
        let (count,): (i64,) = sqlx::query_as(r#"SELECT COUNT(*) FROM job_sources"#)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CrawlError::Database(e.to_string()))?;

        Ok(count)
    }

    async fn count_runs(&self, status: RunStatus) -> Result<i64, CrawlError> {
        let (count,): (i64,) =
            sqlx::query_as(r#"SELECT COUNT(*) FROM job_runs WHERE status = $1"#)
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| CrawlError::Database(e.to_string()))?;

        Ok(count)
    }
}
