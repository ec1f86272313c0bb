//! The per-run crawl pipeline: fetch -> extract -> normalize -> classify ->
//! persist.
//!
//! Generic over the fetcher and page store via traits, enabling dependency
//! injection and testing without real HTTP or a database. The worker drives
//! [`CrawlPipeline::crawl_source`] for scheduled runs; the trigger API uses
//! [`CrawlPipeline::crawl_ad_hoc`] for one-off interactive crawls.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use url::Url;

use crate::dedup::{Classification, Deduper, DeduperConfig};
use crate::error::CrawlError;
use crate::extract::ExtractorRegistry;
use crate::fetch::Fetcher;
use crate::keywords::extract_keywords;
use crate::models::{JobSource, RunCounters};
use crate::normalize::normalize;
use crate::store::PageStore;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Page budget per run: the source's base page plus followed
    /// same-origin links.
    pub max_pages_per_run: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { max_pages_per_run: 5 }
    }
}

/// Result of an ad-hoc trigger crawl.
#[derive(Debug, Clone, Serialize)]
pub struct AdHocCrawl {
    pub url: String,
    pub title: Option<String>,
    pub extracted_keywords: Vec<String>,
    pub links: Vec<String>,
    pub status: String,
}

/// Orchestrates the stages of one crawl.
#[derive(Clone)]
pub struct CrawlPipeline<F, P>
where
    F: Fetcher,
    P: PageStore,
{
    fetcher: F,
    extractors: Arc<ExtractorRegistry>,
    pages: P,
    deduper: Deduper<P>,
    config: PipelineConfig,
}

impl<F, P> CrawlPipeline<F, P>
where
    F: Fetcher,
    P: PageStore,
{
    pub fn new(
        fetcher: F,
        extractors: Arc<ExtractorRegistry>,
        pages: P,
        deduper_config: DeduperConfig,
        config: PipelineConfig,
    ) -> Self {
        let deduper = Deduper::new(pages.clone(), deduper_config);
        Self {
            fetcher,
            extractors,
            pages,
            deduper,
            config,
        }
    }

    /// Crawl one source: the base page, then same-origin links
    /// breadth-first, up to the page budget.
    ///
    /// Counters accumulate in place so a failing run still reports the work
    /// done before the failure. A failure on the base page fails the run;
    /// failures on followed links are logged and skipped.
    pub async fn crawl_source(
        &self,
        source: &JobSource,
        counters: &mut RunCounters,
    ) -> Result<(), CrawlError> {
        let base = Url::parse(&source.base_url).map_err(|e| {
            CrawlError::Normalization(format!("source '{}' base url: {e}", source.name))
        })?;
        let base_host = base
            .host_str()
            .ok_or_else(|| {
                CrawlError::Normalization(format!("source '{}' base url has no host", source.name))
            })?
            .to_string();

        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::from([source.base_url.clone()]);
        let mut fetched = 0usize;

        while let Some(url) = queue.pop_front() {
            if fetched >= self.config.max_pages_per_run {
                break;
            }
            if !visited.insert(url.clone()) {
                continue;
            }

            let is_base_page = fetched == 0;
            fetched += 1;

            match self.process_page(&url, counters).await {
                Ok(links) => {
                    for link in links {
                        if visited.contains(&link) {
                            continue;
                        }
                        let same_host = Url::parse(&link)
                            .ok()
                            .and_then(|u| u.host_str().map(|h| h == base_host))
                            .unwrap_or(false);
                        if same_host {
                            queue.push_back(link);
                        }
                    }
                }
                Err(e) if is_base_page => return Err(e),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Skipping linked page");
                }
            }
        }

        tracing::info!(
            source = %source.name,
            fetched,
            raw = counters.raw,
            new = counters.new,
            merged = counters.merged,
            "Source crawl complete"
        );
        Ok(())
    }

    /// One page through the pipeline. Returns the canonical outbound links
    /// for the caller to consider following.
    async fn process_page(
        &self,
        url: &str,
        counters: &mut RunCounters,
    ) -> Result<Vec<String>, CrawlError> {
        let response = self.fetcher.fetch(url).await?;

        let page_url = if response.final_url.is_empty() {
            url
        } else {
            &response.final_url
        };

        let extractor = self.extractors.select_for_url(page_url);
        tracing::debug!(url = page_url, extractor = extractor.name(), "Parsing page");
        let raw = extractor.parse(page_url, &response.body)?;
        counters.raw += 1;

        let record = normalize(raw)?;
        let links = record.links.clone();

        match self.deduper.classify(&record).await? {
            Classification::New => {
                self.pages.insert_page(&record).await?;
                counters.new += 1;
            }
            Classification::UpdateOf(id) => {
                self.pages.update_page(id, &record).await?;
                counters.merged += 1;
            }
            Classification::DuplicateOf(id) => {
                tracing::debug!(url = %record.url, existing = %id, "Duplicate content; skipping write");
            }
        }

        Ok(links)
    }

    /// Single ad-hoc fetch + extract, bypassing the scheduler and writing
    /// nothing. Used by the interactive trigger API.
    pub async fn crawl_ad_hoc(
        &self,
        url: &str,
        keyword_hints: &[String],
    ) -> Result<AdHocCrawl, CrawlError> {
        let response = self.fetcher.fetch(url).await?;
        let page_url = if response.final_url.is_empty() {
            url
        } else {
            &response.final_url
        };

        let extractor = self.extractors.select_for_url(page_url);
        let raw = extractor.parse(page_url, &response.body)?;
        let record = normalize(raw)?;

        let extracted_keywords = extract_keywords(&record.text, keyword_hints);

        Ok(AdHocCrawl {
            url: record.url,
            title: record.title,
            extracted_keywords,
            links: record.links,
            status: "ok".to_string(),
        })
    }
}
