use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use trawler_core::dedup::Fingerprint;
use trawler_core::error::CrawlError;
use trawler_core::models::{CanonicalRecord, StoredPage};
use trawler_core::store::PageStore;

/// Repository for canonical pages, keyed by normalized URL with a
/// fingerprint-bucket index for dedup candidate lookup.
#[derive(Clone)]
pub struct PageRepository {
    pool: Pool<Postgres>,
}

impl PageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Flat page view for listings and exports.
#[derive(Debug, serde::Serialize, sqlx::FromRow)]
pub struct PageSummary {
    pub url: String,
    pub domain: String,
    pub title: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl PageRepository {
    /// Most recently seen pages, for export/inspection.
    pub async fn list_pages(&self, limit: usize) -> Result<Vec<PageSummary>, CrawlError> {
        let rows = sqlx::query_as::<_, PageSummary>(
            r#"
            SELECT url, domain, title, first_seen_at, last_seen_at
            FROM pages
            ORDER BY last_seen_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CrawlError::Database(e.to_string()))?;

        Ok(rows)
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct PageRow {
    id: Uuid,
    url: String,
    content_hash: String,
    fingerprint: Vec<i64>,
    last_seen_at: DateTime<Utc>,
}

impl From<PageRow> for StoredPage {
    fn from(row: PageRow) -> Self {
        StoredPage {
            id: row.id,
            url: row.url,
            content_hash: row.content_hash,
            fingerprint: Fingerprint::from_sketch(
                row.fingerprint.into_iter().map(|v| v as u64).collect(),
            ),
            last_seen_at: row.last_seen_at,
        }
    }
}

fn sketch_column(record: &CanonicalRecord) -> Vec<i64> {
    record.fingerprint.sketch().iter().map(|&h| h as i64).collect()
}

impl PageStore for PageRepository {
    async fn find_by_url(&self, url: &str) -> Result<Option<StoredPage>, CrawlError> {
        let row = sqlx::query_as::<_, PageRow>(
            r#"
            SELECT id, url, content_hash, fingerprint, last_seen_at
            FROM pages
            WHERE url = $1
            "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CrawlError::Database(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn find_fingerprint_candidates(
        &self,
        bucket: i64,
        domain: &str,
        top_k: usize,
    ) -> Result<Vec<StoredPage>, CrawlError> {
        let rows = sqlx::query_as::<_, PageRow>(
            r#"
            SELECT id, url, content_hash, fingerprint, last_seen_at
            FROM pages
            WHERE fingerprint_bucket = $1 AND domain = $2
            ORDER BY last_seen_at DESC
            LIMIT $3
            "#,
        )
        .bind(bucket)
        .bind(domain)
        .bind(top_k as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CrawlError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_page(&self, record: &CanonicalRecord) -> Result<Uuid, CrawlError> {
        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO pages
                (url, domain, title, body_text, links, content_hash,
                 fingerprint, fingerprint_bucket)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(&record.url)
        .bind(&record.domain)
        .bind(&record.title)
        .bind(&record.text)
        .bind(&record.links)
        .bind(&record.content_hash)
        .bind(sketch_column(record))
        .bind(record.fingerprint.bucket())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CrawlError::Database(e.to_string()))?;

        Ok(id)
    }

    async fn update_page(&self, id: Uuid, record: &CanonicalRecord) -> Result<(), CrawlError> {
        sqlx::query(
            r#"
            UPDATE pages
            SET url = $2, domain = $3, title = $4, body_text = $5, links = $6,
                content_hash = $7, fingerprint = $8, fingerprint_bucket = $9,
                last_seen_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&record.url)
        .bind(&record.domain)
        .bind(&record.title)
        .bind(&record.text)
        .bind(&record.links)
        .bind(&record.content_hash)
        .bind(sketch_column(record))
        .bind(record.fingerprint.bucket())
        .execute(&self.pool)
        .await
        .map_err(|e| CrawlError::Database(e.to_string()))?;

        Ok(())
    }

    async fn count_pages(&self) -> Result<i64, CrawlError> {
        let (count,): (i64,) = sqlx::query_as(r#"SELECT COUNT(*) FROM pages"#)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CrawlError::Database(e.to_string()))?;

        Ok(count)
    }
}
