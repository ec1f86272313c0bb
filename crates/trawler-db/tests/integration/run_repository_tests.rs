use chrono::{TimeDelta, Utc};
use uuid::Uuid;

use trawler_core::models::{NewJobSource, RunCounters, RunStatus};
use trawler_core::store::RunStore;
use trawler_db::CrawlRunRepository;

use crate::integration::common::setup_test_db;

async fn make_source(repo: &CrawlRunRepository, name: &str) -> Uuid {
    repo.insert_source(NewJobSource::new(name, format!("https://{name}.test/")))
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn insert_source_is_an_upsert_on_name() {
    let (pool, _container) = setup_test_db().await;
    let repo = CrawlRunRepository::new(pool);

    let first = repo
        .insert_source(NewJobSource::new("acme", "https://acme.test/"))
        .await
        .unwrap();
    assert_eq!(first.failure_count, 0);
    assert!(first.last_scraped_at.is_none());

    let second = repo
        .insert_source(
            NewJobSource::new("acme", "https://acme.test/v2/").with_interval_minutes(120),
        )
        .await
        .unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.base_url, "https://acme.test/v2/");
    assert_eq!(second.scrape_interval_minutes, 120);
}

#[tokio::test]
async fn outstanding_run_index_blocks_second_insert() {
    let (pool, _container) = setup_test_db().await;
    let repo = CrawlRunRepository::new(pool);
    let source_id = make_source(&repo, "acme").await;

    let first = repo.insert_run(source_id, "key-1").await.unwrap();
    assert!(first.is_some());

    let second = repo.insert_run(source_id, "key-2").await.unwrap();
    assert!(second.is_none(), "partial unique index must reject a second outstanding run");

    assert!(repo.outstanding_run(source_id).await.unwrap().is_some());
}

#[tokio::test]
async fn run_key_is_unique_even_across_sources() {
    let (pool, _container) = setup_test_db().await;
    let repo = CrawlRunRepository::new(pool);
    let a = make_source(&repo, "a").await;
    let b = make_source(&repo, "b").await;

    assert!(repo.insert_run(a, "shared-key").await.unwrap().is_some());
    assert!(repo.insert_run(b, "shared-key").await.unwrap().is_none());
}

#[tokio::test]
async fn claim_is_atomic_and_single_winner() {
    let (pool, _container) = setup_test_db().await;
    let repo = CrawlRunRepository::new(pool);
    let source_id = make_source(&repo, "acme").await;
    let run = repo.insert_run(source_id, "key-1").await.unwrap().unwrap();

    let (first, second) = tokio::join!(repo.start_run(run.id, "w1"), repo.start_run(run.id, "w2"));
    let first = first.unwrap();
    let second = second.unwrap();

    assert_eq!(
        first.is_some() as u8 + second.is_some() as u8,
        1,
        "exactly one claim may win"
    );

    let claimed = repo.get_run(run.id).await.unwrap().unwrap();
    assert_eq!(claimed.status, RunStatus::Running);
    assert!(claimed.started_at.is_some());
    assert!(claimed.worker_id.is_some());
}

#[tokio::test]
async fn finish_run_sets_terminal_state_exactly_once() {
    let (pool, _container) = setup_test_db().await;
    let repo = CrawlRunRepository::new(pool);
    let source_id = make_source(&repo, "acme").await;
    let run = repo.insert_run(source_id, "key-1").await.unwrap().unwrap();
    repo.start_run(run.id, "w1").await.unwrap();

    let counters = RunCounters { raw: 7, new: 4, merged: 2 };
    let finished = repo
        .finish_run(run.id, RunStatus::Completed, counters, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(finished.status, RunStatus::Completed);
    assert_eq!(finished.raw_count, 7);
    assert_eq!(finished.new_count, 4);
    assert_eq!(finished.merged_count, 2);
    assert!(finished.completed_at.is_some());

    // A second terminal transition is refused.
    let again = repo
        .finish_run(run.id, RunStatus::Failed, RunCounters::default(), Some("late"))
        .await
        .unwrap();
    assert!(again.is_none());
}

#[tokio::test]
async fn source_outcome_resets_or_increments_failures() {
    let (pool, _container) = setup_test_db().await;
    let repo = CrawlRunRepository::new(pool);
    let source_id = make_source(&repo, "acme").await;

    repo.record_source_outcome(source_id, false).await.unwrap();
    repo.record_source_outcome(source_id, false).await.unwrap();
    let source = repo.get_source(source_id).await.unwrap().unwrap();
    assert_eq!(source.failure_count, 2);
    assert!(source.last_scraped_at.is_some());

    repo.record_source_outcome(source_id, true).await.unwrap();
    let source = repo.get_source(source_id).await.unwrap().unwrap();
    assert_eq!(source.failure_count, 0);
}

#[tokio::test]
async fn pending_runs_come_back_oldest_first() {
    let (pool, _container) = setup_test_db().await;
    let repo = CrawlRunRepository::new(pool.clone());
    let a = make_source(&repo, "a").await;
    let b = make_source(&repo, "b").await;

    let run_b = repo.insert_run(b, "kb").await.unwrap().unwrap();
    let run_a = repo.insert_run(a, "ka").await.unwrap().unwrap();

    // Backdate run_b so ordering is deterministic.
    sqlx::query("UPDATE job_runs SET scheduled_at = NOW() - INTERVAL '1 hour' WHERE id = $1")
        .bind(run_b.id)
        .execute(&pool)
        .await
        .unwrap();

    let pending = repo.pending_runs(10).await.unwrap();
    assert_eq!(
        pending.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![run_b.id, run_a.id]
    );
}

#[tokio::test]
async fn retention_deletes_only_old_completed_runs() {
    let (pool, _container) = setup_test_db().await;
    let repo = CrawlRunRepository::new(pool.clone());
    let source_id = make_source(&repo, "acme").await;

    for (key, status) in [("k1", "completed"), ("k2", "failed"), ("k3", "completed")] {
        sqlx::query(
            r#"
            INSERT INTO job_runs (source_id, run_key, status, completed_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(source_id)
        .bind(key)
        .bind(status)
        .bind(Utc::now() - TimeDelta::days(40))
        .execute(&pool)
        .await
        .unwrap();
    }

    let cutoff = Utc::now() - TimeDelta::days(30);
    let deleted = repo.delete_completed_runs_before(cutoff).await.unwrap();
    assert_eq!(deleted, 2);

    assert_eq!(repo.count_runs(RunStatus::Failed).await.unwrap(), 1);
    assert_eq!(repo.count_runs(RunStatus::Completed).await.unwrap(), 0);
}

#[tokio::test]
async fn stale_running_runs_return_to_pending() {
    let (pool, _container) = setup_test_db().await;
    let repo = CrawlRunRepository::new(pool.clone());
    let source_id = make_source(&repo, "acme").await;
    let run = repo.insert_run(source_id, "k1").await.unwrap().unwrap();
    repo.start_run(run.id, "w1").await.unwrap();

    sqlx::query("UPDATE job_runs SET started_at = NOW() - INTERVAL '2 hours' WHERE id = $1")
        .bind(run.id)
        .execute(&pool)
        .await
        .unwrap();

    let cutoff = Utc::now() - TimeDelta::minutes(30);
    let reclaimed = repo.reclaim_stale_runs(cutoff).await.unwrap();
    assert_eq!(reclaimed, 1);

    let run = repo.get_run(run.id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Pending);
    assert!(run.worker_id.is_none());
}

#[tokio::test]
async fn sources_due_applies_interval_and_backoff() {
    let (pool, _container) = setup_test_db().await;
    let repo = CrawlRunRepository::new(pool.clone());

    let never = make_source(&repo, "never-scraped").await;
    let fresh = make_source(&repo, "fresh").await;
    let overdue = make_source(&repo, "overdue").await;

    sqlx::query("UPDATE job_sources SET last_scraped_at = NOW() WHERE id = $1")
        .bind(fresh)
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("UPDATE job_sources SET last_scraped_at = NOW() - INTERVAL '2 hours' WHERE id = $1")
        .bind(overdue)
        .execute(&pool)
        .await
        .unwrap();

    let due = repo.sources_due(None, 10).await.unwrap();
    let ids: Vec<Uuid> = due.iter().map(|s| s.id).collect();
    assert!(ids.contains(&never));
    assert!(ids.contains(&overdue));
    assert!(!ids.contains(&fresh));

    // Two failures stretch the hour interval to four hours.
    sqlx::query("UPDATE job_sources SET failure_count = 2 WHERE id = $1")
        .bind(overdue)
        .execute(&pool)
        .await
        .unwrap();
    let due = repo.sources_due(None, 10).await.unwrap();
    assert!(!due.iter().any(|s| s.id == overdue));
}
