//! Canonicalization of raw records.
//!
//! `normalize` is a deterministic, pure mapping from a [`RawRecord`] to a
//! [`CanonicalRecord`]: whitespace collapsed, URLs canonicalized, links
//! deduplicated, content hash and similarity fingerprint computed. The only
//! failure mode is a missing or unparseable mandatory URL.

use std::collections::HashSet;

use chrono::Utc;
use url::Url;

use crate::dedup::Fingerprint;
use crate::error::CrawlError;
use crate::models::{CanonicalRecord, RawRecord, compute_hash};

/// Tracking query parameters stripped during URL canonicalization.
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid", "ref", "source"];

/// Canonicalize a URL, optionally resolving it against a base (for
/// relative links).
///
/// Rules: http/https only; scheme and host lowercased and default port
/// dropped (the `url` crate does both on parse); fragment stripped;
/// tracking parameters removed and the remaining query pairs sorted;
/// trailing slashes trimmed except on the root path.
pub fn canonicalize_url(raw: &str, base: Option<&Url>) -> Result<Url, CrawlError> {
    let mut url = match base {
        Some(base) => base.join(raw.trim()),
        None => Url::parse(raw.trim()),
    }
    .map_err(|e| CrawlError::Normalization(format!("invalid url '{raw}': {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(CrawlError::Normalization(format!(
                "unsupported url scheme '{scheme}' in '{raw}'"
            )));
        }
    }

    url.set_fragment(None);

    if url.query().is_some() {
        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !is_tracking_param(key))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        params.sort();

        if params.is_empty() {
            url.set_query(None);
        } else {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params)
                .finish();
            url.set_query(Some(&query));
        }
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    Ok(url)
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

/// Collapse all runs of whitespace to single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Map a raw record into its canonical form.
///
/// Fails with `NormalizationError` only when the mandatory URL is missing
/// or unparseable. Links that fail to canonicalize are dropped; the rest
/// are resolved against the record URL and deduplicated preserving
/// first-seen order.
pub fn normalize(raw: RawRecord) -> Result<CanonicalRecord, CrawlError> {
    let url_str = raw
        .url
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CrawlError::Normalization("record has no URL".into()))?;

    let url = canonicalize_url(url_str, None)?;
    let domain = url
        .host_str()
        .ok_or_else(|| CrawlError::Normalization(format!("url '{url}' has no host")))?
        .to_string();

    let title = raw
        .title
        .as_deref()
        .map(collapse_whitespace)
        .filter(|t| !t.is_empty());
    let text = collapse_whitespace(&raw.text);

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for link in &raw.links {
        if let Ok(canonical) = canonicalize_url(link, Some(&url)) {
            let canonical = canonical.to_string();
            if seen.insert(canonical.clone()) {
                links.push(canonical);
            }
        }
    }

    let content_hash = compute_hash(&text);
    let fingerprint = Fingerprint::compute(&text);

    Ok(CanonicalRecord {
        url: url.to_string(),
        domain,
        title,
        text,
        links,
        content_hash,
        fingerprint,
        normalized_at: Utc::now(),
    })
}
