//! Test utilities: mock implementations of the core capabilities.
//!
//! Handwritten mocks for dependency injection in unit tests. All mocks use
//! `Arc<Mutex<_>>` for interior mutability, allowing assertions on recorded
//! calls, and a fully in-memory store implements both store traits with the
//! same atomicity semantics the Postgres repositories provide.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use crate::error::CrawlError;
use crate::extract::Extractor;
use crate::fetch::{FetchResponse, Fetcher};
use crate::models::{
    CanonicalRecord, JobRun, JobSource, NewJobSource, RawRecord, RunCounters, RunStatus,
    StoredPage,
};
use crate::store::{PageStore, RunStore};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher. Either serves a fixed URL->body map (unknown URLs get a
/// permanent 404), or pops a queue of prepared results; an empty queue
/// returns a default page.
#[derive(Clone, Default)]
pub struct MockFetcher {
    queue: Arc<Mutex<Vec<Result<String, CrawlError>>>>,
    pages: Arc<Mutex<HashMap<String, String>>>,
    /// Every URL requested, in order.
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new(body: &str) -> Self {
        let fetcher = Self::default();
        fetcher.queue.lock().unwrap().push(Ok(body.to_string()));
        fetcher
    }

    pub fn with_error(error: CrawlError) -> Self {
        let fetcher = Self::default();
        fetcher.queue.lock().unwrap().push(Err(error));
        fetcher
    }

    pub fn with_responses(responses: Vec<Result<String, CrawlError>>) -> Self {
        let fetcher = Self::default();
        *fetcher.queue.lock().unwrap() = responses;
        fetcher
    }

    /// Serve specific bodies per URL; anything else 404s.
    pub fn with_pages(pages: &[(&str, &str)]) -> Self {
        let fetcher = Self::default();
        *fetcher.pages.lock().unwrap() = pages
            .iter()
            .map(|(u, b)| (u.to_string(), b.to_string()))
            .collect();
        fetcher
    }

    fn ok(url: &str, body: String) -> FetchResponse {
        FetchResponse {
            status: 200,
            headers: vec![("content-type".into(), "text/html".into())],
            body,
            final_url: url.to_string(),
        }
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, CrawlError> {
        self.requests.lock().unwrap().push(url.to_string());

        {
            let pages = self.pages.lock().unwrap();
            if !pages.is_empty() {
                return match pages.get(url) {
                    Some(body) => Ok(Self::ok(url, body.clone())),
                    None => Err(CrawlError::fetch_permanent(
                        format!("HTTP 404 for {url}"),
                        Some(404),
                    )),
                };
            }
        }

        let mut queue = self.queue.lock().unwrap();
        if queue.is_empty() {
            Ok(Self::ok(url, "<html><body>default</body></html>".to_string()))
        } else {
            queue.remove(0).map(|body| Self::ok(url, body))
        }
    }
}

// ---------------------------------------------------------------------------
// StubExtractor
// ---------------------------------------------------------------------------

/// Extractor over a trivial line format, so pipeline tests need no HTML:
/// `title:` lines set the title, `link:` lines append links, everything
/// else is body text.
#[derive(Clone)]
pub struct StubExtractor {
    name: String,
    error: Arc<Mutex<Option<CrawlError>>>,
}

impl StubExtractor {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_error(error: CrawlError) -> Self {
        Self {
            name: "failing".to_string(),
            error: Arc::new(Mutex::new(Some(error))),
        }
    }
}

impl Extractor for StubExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&self, page_url: &str, body: &str) -> Result<RawRecord, CrawlError> {
        if let Some(err) = self.error.lock().unwrap().take() {
            return Err(err);
        }

        let mut record = RawRecord {
            url: Some(page_url.to_string()),
            ..Default::default()
        };
        let mut text_parts = Vec::new();
        for line in body.lines() {
            if let Some(title) = line.strip_prefix("title:") {
                record.title = Some(title.trim().to_string());
            } else if let Some(link) = line.strip_prefix("link:") {
                record.links.push(link.trim().to_string());
            } else if !line.trim().is_empty() {
                text_parts.push(line.trim());
            }
        }
        record.text = text_parts.join(" ");
        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// InMemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct PageRow {
    id: Uuid,
    url: String,
    domain: String,
    content_hash: String,
    fingerprint: crate::dedup::Fingerprint,
    last_seen_at: DateTime<Utc>,
}

impl PageRow {
    fn stored(&self) -> StoredPage {
        StoredPage {
            id: self.id,
            url: self.url.clone(),
            content_hash: self.content_hash.clone(),
            fingerprint: self.fingerprint.clone(),
            last_seen_at: self.last_seen_at,
        }
    }
}

#[derive(Default)]
struct Inner {
    sources: Vec<JobSource>,
    runs: Vec<JobRun>,
    pages: Vec<PageRow>,
}

/// In-memory store implementing both store traits, with the same
/// conditional-update claim semantics as the Postgres repositories.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- sync helpers for test setup/assertions --

    pub fn add_source(&self, name: &str, last_scraped_at: Option<DateTime<Utc>>) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.lock().unwrap().sources.push(JobSource {
            id,
            name: name.to_string(),
            base_url: format!("https://{name}.test/"),
            enabled: true,
            scrape_interval_minutes: 60,
            last_scraped_at,
            failure_count: 0,
            created_at: Utc::now(),
        });
        id
    }

    pub fn set_base_url(&self, id: Uuid, base_url: &str) {
        let mut inner = self.inner.lock().unwrap();
        let source = inner.sources.iter_mut().find(|s| s.id == id).unwrap();
        source.base_url = base_url.to_string();
    }

    pub fn set_failure_count(&self, id: Uuid, count: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.sources.iter_mut().find(|s| s.id == id).unwrap().failure_count = count;
    }

    pub fn get_source_sync(&self, id: Uuid) -> JobSource {
        self.inner
            .lock()
            .unwrap()
            .sources
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .unwrap()
    }

    pub fn get_run_sync(&self, id: Uuid) -> JobRun {
        self.inner
            .lock()
            .unwrap()
            .runs
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .unwrap()
    }

    pub fn pending_run_count(&self) -> usize {
        self.run_count(RunStatus::Pending)
    }

    pub fn run_count(&self, status: RunStatus) -> usize {
        self.inner
            .lock()
            .unwrap()
            .runs
            .iter()
            .filter(|r| r.status == status)
            .count()
    }

    pub fn add_finished_run(
        &self,
        source_id: Uuid,
        status: RunStatus,
        completed_at: DateTime<Utc>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.lock().unwrap().runs.push(JobRun {
            id,
            source_id,
            run_key: format!("{source_id}:{}", Uuid::new_v4().simple()),
            status,
            scheduled_at: completed_at,
            started_at: Some(completed_at),
            completed_at: Some(completed_at),
            raw_count: 0,
            new_count: 0,
            merged_count: 0,
            error_message: None,
            worker_id: None,
        });
        id
    }

    pub fn age_run_start(&self, run_id: Uuid, by: TimeDelta) {
        let mut inner = self.inner.lock().unwrap();
        let run = inner.runs.iter_mut().find(|r| r.id == run_id).unwrap();
        run.started_at = run.started_at.map(|t| t - by);
    }

    pub fn insert_page_sync(&self, record: &CanonicalRecord) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.lock().unwrap().pages.push(PageRow {
            id,
            url: record.url.clone(),
            domain: record.domain.clone(),
            content_hash: record.content_hash.clone(),
            fingerprint: record.fingerprint.clone(),
            last_seen_at: Utc::now(),
        });
        id
    }

    pub fn page_count_sync(&self) -> usize {
        self.inner.lock().unwrap().pages.len()
    }
}

impl RunStore for InMemoryStore {
    async fn insert_source(&self, source: NewJobSource) -> Result<JobSource, CrawlError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.sources.iter_mut().find(|s| s.name == source.name) {
            existing.base_url = source.base_url;
            existing.scrape_interval_minutes = source.scrape_interval_minutes;
            existing.enabled = source.enabled;
            return Ok(existing.clone());
        }
        let row = JobSource {
            id: Uuid::new_v4(),
            name: source.name,
            base_url: source.base_url,
            enabled: source.enabled,
            scrape_interval_minutes: source.scrape_interval_minutes,
            last_scraped_at: None,
            failure_count: 0,
            created_at: Utc::now(),
        };
        inner.sources.push(row.clone());
        Ok(row)
    }

    async fn get_source(&self, id: Uuid) -> Result<Option<JobSource>, CrawlError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .sources
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn list_sources(&self, filter: Option<&[String]>) -> Result<Vec<JobSource>, CrawlError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .sources
            .iter()
            .filter(|s| s.enabled)
            .filter(|s| filter.is_none_or(|names| names.contains(&s.name)))
            .cloned()
            .collect())
    }

    async fn sources_due(
        &self,
        filter: Option<&[String]>,
        limit: usize,
    ) -> Result<Vec<JobSource>, CrawlError> {
        let now = Utc::now();
        let mut due: Vec<JobSource> = self
            .inner
            .lock()
            .unwrap()
            .sources
            .iter()
            .filter(|s| s.enabled)
            .filter(|s| filter.is_none_or(|names| names.contains(&s.name)))
            .filter(|s| s.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|s| s.last_scraped_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn outstanding_run(&self, source_id: Uuid) -> Result<Option<JobRun>, CrawlError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .runs
            .iter()
            .find(|r| r.source_id == source_id && !r.status.is_terminal())
            .cloned())
    }

    async fn find_run_by_key(&self, run_key: &str) -> Result<Option<JobRun>, CrawlError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .runs
            .iter()
            .find(|r| r.run_key == run_key)
            .cloned())
    }

    async fn insert_run(
        &self,
        source_id: Uuid,
        run_key: &str,
    ) -> Result<Option<JobRun>, CrawlError> {
        let mut inner = self.inner.lock().unwrap();
        let conflict = inner.runs.iter().any(|r| {
            r.run_key == run_key || (r.source_id == source_id && !r.status.is_terminal())
        });
        if conflict {
            return Ok(None);
        }
        let run = JobRun {
            id: Uuid::new_v4(),
            source_id,
            run_key: run_key.to_string(),
            status: RunStatus::Pending,
            scheduled_at: Utc::now(),
            started_at: None,
            completed_at: None,
            raw_count: 0,
            new_count: 0,
            merged_count: 0,
            error_message: None,
            worker_id: None,
        };
        inner.runs.push(run.clone());
        Ok(Some(run))
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<JobRun>, CrawlError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .runs
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn pending_runs(&self, limit: usize) -> Result<Vec<JobRun>, CrawlError> {
        let mut pending: Vec<JobRun> = self
            .inner
            .lock()
            .unwrap()
            .runs
            .iter()
            .filter(|r| r.status == RunStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.scheduled_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn list_runs(
        &self,
        status: Option<RunStatus>,
        limit: usize,
    ) -> Result<Vec<JobRun>, CrawlError> {
        let mut runs: Vec<JobRun> = self
            .inner
            .lock()
            .unwrap()
            .runs
            .iter()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .cloned()
            .collect();
        runs.sort_by_key(|r| std::cmp::Reverse(r.scheduled_at));
        runs.truncate(limit);
        Ok(runs)
    }

    async fn start_run(&self, id: Uuid, worker_id: &str) -> Result<Option<JobRun>, CrawlError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.runs.iter_mut().find(|r| r.id == id) {
            Some(run) if run.status == RunStatus::Pending => {
                run.status = RunStatus::Running;
                run.started_at = Some(Utc::now());
                run.worker_id = Some(worker_id.to_string());
                Ok(Some(run.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn finish_run(
        &self,
        id: Uuid,
        status: RunStatus,
        counters: RunCounters,
        error: Option<&str>,
    ) -> Result<Option<JobRun>, CrawlError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.runs.iter_mut().find(|r| r.id == id) {
            Some(run) if !run.status.is_terminal() => {
                run.status = status;
                run.completed_at = Some(Utc::now());
                run.raw_count = counters.raw;
                run.new_count = counters.new;
                run.merged_count = counters.merged;
                run.error_message = error.map(str::to_string);
                run.worker_id = None;
                Ok(Some(run.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn record_source_outcome(
        &self,
        source_id: Uuid,
        success: bool,
    ) -> Result<(), CrawlError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(source) = inner.sources.iter_mut().find(|s| s.id == source_id) {
            source.last_scraped_at = Some(Utc::now());
            if success {
                source.failure_count = 0;
            } else {
                source.failure_count += 1;
            }
        }
        Ok(())
    }

    async fn delete_completed_runs_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, CrawlError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.runs.len();
        inner.runs.retain(|r| {
            !(r.status == RunStatus::Completed
                && r.completed_at.is_some_and(|t| t < cutoff))
        });
        Ok((before - inner.runs.len()) as u64)
    }

    async fn reclaim_stale_runs(&self, cutoff: DateTime<Utc>) -> Result<u64, CrawlError> {
        let mut inner = self.inner.lock().unwrap();
        let mut reclaimed = 0;
        for run in inner.runs.iter_mut() {
            if run.status == RunStatus::Running && run.started_at.is_some_and(|t| t < cutoff) {
                run.status = RunStatus::Pending;
                run.started_at = None;
                run.worker_id = None;
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    async fn count_sources(&self) -> Result<i64, CrawlError> {
        Ok(self.inner.lock().unwrap().sources.len() as i64)
    }

    async fn count_runs(&self, status: RunStatus) -> Result<i64, CrawlError> {
        Ok(self.run_count(status) as i64)
    }
}

impl PageStore for InMemoryStore {
    async fn find_by_url(&self, url: &str) -> Result<Option<StoredPage>, CrawlError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .pages
            .iter()
            .find(|p| p.url == url)
            .map(PageRow::stored))
    }

    async fn find_fingerprint_candidates(
        &self,
        bucket: i64,
        domain: &str,
        top_k: usize,
    ) -> Result<Vec<StoredPage>, CrawlError> {
        let mut candidates: Vec<PageRow> = self
            .inner
            .lock()
            .unwrap()
            .pages
            .iter()
            .filter(|p| p.fingerprint.bucket() == bucket && p.domain == domain)
            .cloned()
            .collect();
        candidates.sort_by_key(|p| std::cmp::Reverse(p.last_seen_at));
        Ok(candidates.iter().take(top_k).map(PageRow::stored).collect())
    }

    async fn insert_page(&self, record: &CanonicalRecord) -> Result<Uuid, CrawlError> {
        Ok(self.insert_page_sync(record))
    }

    async fn update_page(&self, id: Uuid, record: &CanonicalRecord) -> Result<(), CrawlError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(page) = inner.pages.iter_mut().find(|p| p.id == id) {
            page.url = record.url.clone();
            page.domain = record.domain.clone();
            page.content_hash = record.content_hash.clone();
            page.fingerprint = record.fingerprint.clone();
            page.last_seen_at = Utc::now();
        }
        Ok(())
    }

    async fn count_pages(&self) -> Result<i64, CrawlError> {
        Ok(self.inner.lock().unwrap().pages.len() as i64)
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// A source that has never been scraped.
pub fn make_test_source(name: &str) -> JobSource {
    JobSource {
        id: Uuid::new_v4(),
        name: name.to_string(),
        base_url: format!("https://{name}.test/"),
        enabled: true,
        scrape_interval_minutes: 60,
        last_scraped_at: None,
        failure_count: 0,
        created_at: Utc::now(),
    }
}

/// A raw record with the given subject URL and body text.
pub fn make_raw_record(url: &str, text: &str) -> RawRecord {
    RawRecord {
        url: Some(url.to_string()),
        title: Some("Test Page".to_string()),
        text: text.to_string(),
        links: Vec::new(),
    }
}
