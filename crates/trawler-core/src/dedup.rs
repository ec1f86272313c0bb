//! Similarity fingerprints and near-duplicate classification.
//!
//! A [`Fingerprint`] is a bottom-k sketch of 64-bit hashes over 3-word
//! shingles of normalized text. Two sketches support a Jaccard similarity
//! estimate; the minimum hash doubles as a cheap-recall bucket key for the
//! candidate index. Classification checks the exact-URL index first (high
//! precision, always wins), then a bounded candidate set from the
//! fingerprint bucket.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::CrawlError;
use crate::models::CanonicalRecord;
use crate::store::PageStore;

/// Number of shingle hashes kept in a sketch.
pub const SKETCH_SIZE: usize = 64;

/// Words per shingle.
const SHINGLE_WORDS: usize = 3;

/// Deterministic similarity signature of a record's text content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// The `SKETCH_SIZE` smallest distinct shingle hashes, ascending.
    sketch: Vec<u64>,
}

impl Fingerprint {
    /// Compute the fingerprint of a text. Case-insensitive; whitespace
    /// tokenized. Texts shorter than one shingle hash as a single shingle;
    /// empty text yields an empty sketch.
    pub fn compute(text: &str) -> Self {
        let words: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();

        let mut hashes = BTreeSet::new();
        if words.len() < SHINGLE_WORDS {
            if !words.is_empty() {
                hashes.insert(hash_shingle(&words.join(" ")));
            }
        } else {
            for window in words.windows(SHINGLE_WORDS) {
                hashes.insert(hash_shingle(&window.join(" ")));
            }
        }

        Self {
            sketch: hashes.into_iter().take(SKETCH_SIZE).collect(),
        }
    }

    /// Rebuild a fingerprint from a stored sketch.
    pub fn from_sketch(mut sketch: Vec<u64>) -> Self {
        sketch.sort_unstable();
        sketch.dedup();
        sketch.truncate(SKETCH_SIZE);
        Self { sketch }
    }

    pub fn sketch(&self) -> &[u64] {
        &self.sketch
    }

    /// Bucket key for candidate lookup: the minimum shingle hash.
    /// Near-identical texts almost always share it.
    pub fn bucket(&self) -> i64 {
        self.sketch.first().map(|&h| h as i64).unwrap_or(0)
    }

    /// Bottom-k Jaccard similarity estimate against another fingerprint.
    pub fn jaccard(&self, other: &Fingerprint) -> f64 {
        if self.sketch.is_empty() && other.sketch.is_empty() {
            return 1.0;
        }
        if self.sketch.is_empty() || other.sketch.is_empty() {
            return 0.0;
        }

        let a: BTreeSet<u64> = self.sketch.iter().copied().collect();
        let b: BTreeSet<u64> = other.sketch.iter().copied().collect();

        // k smallest of the union; count how many of those both sketches saw.
        let union: Vec<u64> = a.union(&b).copied().collect();
        let k = union.len().min(SKETCH_SIZE);
        let shared = union[..k]
            .iter()
            .filter(|h| a.contains(h) && b.contains(h))
            .count();

        shared as f64 / k as f64
    }
}

fn hash_shingle(shingle: &str) -> u64 {
    let digest = Sha256::digest(shingle.as_bytes());
    u64::from_be_bytes(digest[..8].try_into().expect("digest is 32 bytes"))
}

/// How a candidate record relates to already-stored pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// No match; insert.
    New,
    /// Content unchanged; skip the write.
    DuplicateOf(Uuid),
    /// Content changed materially; overwrite the existing page.
    UpdateOf(Uuid),
}

#[derive(Debug, Clone)]
pub struct DeduperConfig {
    /// Jaccard similarity at or above which a near match is an update of
    /// the existing page rather than a new one.
    pub similarity_threshold: f64,
    /// Bound on the fingerprint-bucket candidate set.
    pub candidate_limit: usize,
}

impl Default for DeduperConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.9,
            candidate_limit: 16,
        }
    }
}

/// Classifies canonical records against previously stored pages.
#[derive(Clone)]
pub struct Deduper<P: PageStore> {
    store: P,
    config: DeduperConfig,
}

impl<P: PageStore> Deduper<P> {
    pub fn new(store: P, config: DeduperConfig) -> Self {
        Self { store, config }
    }

    /// Classify a record as new, duplicate, or update.
    ///
    /// Exact URL match always wins over fingerprint similarity: the same
    /// URL with identical content is a duplicate, with different content an
    /// update. Only when the URL is unseen does the bounded fingerprint
    /// candidate set decide.
    pub async fn classify(
        &self,
        record: &CanonicalRecord,
    ) -> Result<Classification, CrawlError> {
        if let Some(existing) = self.store.find_by_url(&record.url).await? {
            return Ok(if existing.content_hash == record.content_hash {
                Classification::DuplicateOf(existing.id)
            } else {
                Classification::UpdateOf(existing.id)
            });
        }

        let candidates = self
            .store
            .find_fingerprint_candidates(
                record.fingerprint.bucket(),
                &record.domain,
                self.config.candidate_limit,
            )
            .await?;

        let mut best: Option<(f64, &crate::models::StoredPage)> = None;
        for candidate in &candidates {
            let similarity = record.fingerprint.jaccard(&candidate.fingerprint);
            if best.is_none_or(|(b, _)| similarity > b) {
                best = Some((similarity, candidate));
            }
        }

        if let Some((similarity, candidate)) = best {
            if candidate.content_hash == record.content_hash {
                return Ok(Classification::DuplicateOf(candidate.id));
            }
            if similarity >= self.config.similarity_threshold {
                tracing::debug!(
                    url = %record.url,
                    existing = %candidate.url,
                    similarity,
                    "Near-duplicate classified as update"
                );
                return Ok(Classification::UpdateOf(candidate.id));
            }
        }

        Ok(Classification::New)
    }
}
