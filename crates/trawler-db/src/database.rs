use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use trawler_core::CrawlError;

use crate::config::DatabaseConfig;
use crate::page_repository::PageRepository;
use crate::run_repository::CrawlRunRepository;

/// Central database facade — owns the connection pool, runs migrations,
/// and vends repository instances.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL with the given configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, CrawlError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| CrawlError::Database(format!("Failed to connect: {e}")))?;

        Ok(Self { pool })
    }

    /// Create a `Database` from an existing pool (useful for testing).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<(), CrawlError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CrawlError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get a [`CrawlRunRepository`] backed by this pool.
    pub fn run_repo(&self) -> CrawlRunRepository {
        CrawlRunRepository::new(self.pool.clone())
    }

    /// Get a [`PageRepository`] backed by this pool.
    pub fn page_repo(&self) -> PageRepository {
        PageRepository::new(self.pool.clone())
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> Result<(), CrawlError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| CrawlError::Database(e.to_string()))?;
        Ok(())
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
