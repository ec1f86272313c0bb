use std::future::Future;

use crate::error::CrawlError;

/// A fetched HTTP response, as much as the pipeline needs.
#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    pub status: u16,
    /// Response headers, lowercased names, in arrival order.
    pub headers: Vec<(String, String)>,
    pub body: String,
    /// URL after redirects; equals the request URL when none occurred.
    pub final_url: String,
}

impl FetchResponse {
    /// First header value with the given (case-insensitive) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Fetches a URL, applying politeness rate limiting and retry policy.
///
/// Implementations classify failures as transient (retried internally up to
/// the configured attempts) or permanent (returned immediately); what comes
/// out of `fetch` is final from the pipeline's point of view.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<FetchResponse, CrawlError>> + Send;
}
