use std::sync::Arc;

use axum::Router;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

use trawler_core::{RateLimiter, RateLimiterConfig};
use trawler_db::Database;
use trawler_server::routes;
use trawler_server::state::AppState;

pub const TEST_API_KEY: &str = "test-api-key";

const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS job_sources (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        name VARCHAR(128) UNIQUE NOT NULL,
        base_url VARCHAR(512) NOT NULL,
        enabled BOOLEAN NOT NULL DEFAULT TRUE,
        scrape_interval_minutes INTEGER NOT NULL DEFAULT 60,
        last_scraped_at TIMESTAMPTZ,
        failure_count INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS job_runs (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        source_id UUID NOT NULL REFERENCES job_sources(id) ON DELETE CASCADE,
        run_key VARCHAR(255) UNIQUE NOT NULL,
        status VARCHAR(20) NOT NULL DEFAULT 'pending',
        scheduled_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        started_at TIMESTAMPTZ,
        completed_at TIMESTAMPTZ,
        raw_count INTEGER NOT NULL DEFAULT 0,
        new_count INTEGER NOT NULL DEFAULT 0,
        merged_count INTEGER NOT NULL DEFAULT 0,
        error_message TEXT,
        worker_id VARCHAR(255),
        CONSTRAINT chk_job_runs_status CHECK (
            status IN ('pending', 'running', 'completed', 'failed')
        )
    )"#,
    r#"CREATE UNIQUE INDEX IF NOT EXISTS uniq_job_runs_outstanding
        ON job_runs(source_id) WHERE status IN ('pending', 'running')"#,
    r#"CREATE TABLE IF NOT EXISTS pages (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        url VARCHAR(2048) UNIQUE NOT NULL,
        domain VARCHAR(255) NOT NULL,
        title VARCHAR(512),
        body_text TEXT NOT NULL,
        links TEXT[] NOT NULL DEFAULT '{}',
        content_hash VARCHAR(64) NOT NULL,
        fingerprint BIGINT[] NOT NULL,
        fingerprint_bucket BIGINT NOT NULL,
        first_seen_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        last_seen_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
];

/// Start PostgreSQL in a container and build the app router against it.
pub async fn setup_test_app() -> (Router, PgPool, ContainerAsync<GenericImage>) {
    let container = GenericImage::new("postgres", "16")
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "trawler_test")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");
    let connection_string = format!("postgresql://postgres:postgres@{host}:{port}/trawler_test");

    const MAX_RETRIES: u32 = 30;
    let mut retries = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .connect(&connection_string)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retries += 1;
                if retries >= MAX_RETRIES {
                    panic!("Failed to connect to database after {MAX_RETRIES} retries: {e}");
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    };

    for migration in MIGRATIONS {
        sqlx::query(migration)
            .execute(&pool)
            .await
            .expect("Failed to run migration");
    }

    let state = Arc::new(AppState {
        db: Database::from_pool(pool.clone()),
        api_key: TEST_API_KEY.to_string(),
        limiter: RateLimiter::new(RateLimiterConfig::default()),
    });

    (routes::router(state), pool, container)
}
