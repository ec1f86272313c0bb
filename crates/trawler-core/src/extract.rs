//! Extraction capability and per-host dispatch.
//!
//! An [`Extractor`] turns a fetched payload into a [`RawRecord`]. Variants
//! are registered against host patterns; the worker looks the right one up
//! per page and falls back to a generic extractor. "No matches found" is a
//! legitimate empty record, never an error — `parse` fails only on input it
//! cannot make sense of at all.

use std::sync::Arc;

use url::Url;

use crate::error::CrawlError;
use crate::models::RawRecord;

/// Turns a raw fetched payload into a structured raw record.
pub trait Extractor: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    fn parse(&self, page_url: &str, body: &str) -> Result<RawRecord, CrawlError>;
}

/// Registry of site-specific extractors keyed by host pattern, with a
/// generic fallback.
///
/// A pattern matches a host exactly, or as a parent-domain suffix:
/// `"example.com"` matches `example.com` and `news.example.com`.
/// First matching registration wins.
#[derive(Clone)]
pub struct ExtractorRegistry {
    rules: Vec<(String, Arc<dyn Extractor>)>,
    fallback: Arc<dyn Extractor>,
}

impl ExtractorRegistry {
    pub fn new(fallback: Arc<dyn Extractor>) -> Self {
        Self {
            rules: Vec::new(),
            fallback,
        }
    }

    pub fn register(mut self, host_pattern: impl Into<String>, extractor: Arc<dyn Extractor>) -> Self {
        self.rules.push((host_pattern.into(), extractor));
        self
    }

    /// Extractor for the given host.
    pub fn select(&self, host: &str) -> &Arc<dyn Extractor> {
        let host = host.to_ascii_lowercase();
        for (pattern, extractor) in &self.rules {
            if pattern_matches(pattern, &host) {
                return extractor;
            }
        }
        &self.fallback
    }

    /// Extractor for the host of `url`; unparseable URLs get the fallback.
    pub fn select_for_url(&self, url: &str) -> &Arc<dyn Extractor> {
        match Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_owned)) {
            Some(host) => self.select(&host),
            None => &self.fallback,
        }
    }
}

fn pattern_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    host == pattern || host.ends_with(&format!(".{pattern}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StubExtractor;

    fn registry() -> ExtractorRegistry {
        ExtractorRegistry::new(Arc::new(StubExtractor::named("generic")))
            .register("example.com", Arc::new(StubExtractor::named("example")))
            .register("jobs.acme.io", Arc::new(StubExtractor::named("acme-jobs")))
    }

    #[test]
    fn exact_host_match() {
        assert_eq!(registry().select("example.com").name(), "example");
        assert_eq!(registry().select("jobs.acme.io").name(), "acme-jobs");
    }

    #[test]
    fn subdomain_suffix_match() {
        assert_eq!(registry().select("news.example.com").name(), "example");
    }

    #[test]
    fn unknown_host_falls_back_to_generic() {
        assert_eq!(registry().select("other.net").name(), "generic");
        // A suffix of the pattern itself is not a match.
        assert_eq!(registry().select("acme.io").name(), "generic");
    }

    #[test]
    fn host_match_is_case_insensitive() {
        assert_eq!(registry().select("EXAMPLE.com").name(), "example");
    }

    #[test]
    fn select_for_url_uses_host() {
        let reg = registry();
        assert_eq!(
            reg.select_for_url("https://example.com/listings?page=2").name(),
            "example"
        );
        assert_eq!(reg.select_for_url("not a url").name(), "generic");
    }
}
