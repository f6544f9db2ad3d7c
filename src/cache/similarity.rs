//! Textual similarity scoring for fuzzy cache lookups.
//!
//! The score is the longest-common-subsequence ratio over Unicode scalar values:
//! `LCS(a, b) / max(len(a), len(b))`. It is order- and whitespace-sensitive on
//! purpose; no tokenization or normalization is applied here.

use super::entry::CacheEntry;
use std::cmp::Ordering;

/// Similarity in `[0.0, 1.0]`. Empty inputs score 0.0, identical non-empty inputs 1.0.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    lcs_len(&a, &b) as f64 / longest as f64
}

/// Classic O(n·m) dynamic programming table, kept to two rows.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[derive(Debug, Clone)]
pub struct SimilarMatch {
    pub entry: CacheEntry,
    pub score: f64,
}

/// Ranks candidate entries against a query using [`similarity`].
#[derive(Debug, Clone, Copy)]
pub struct SimilarityMatcher {
    threshold: f64,
    max_candidates: usize,
}

impl SimilarityMatcher {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
            max_candidates: usize::MAX,
        }
    }

    pub fn with_max_candidates(mut self, n: usize) -> Self {
        self.max_candidates = n.max(1);
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn score(&self, a: &str, b: &str) -> f64 {
        similarity(a, b)
    }

    /// Candidates scoring at or above the threshold, best first.
    ///
    /// Ties are broken by most recent hit, then by higher hit count.
    pub fn rank<I>(&self, query: &str, candidates: I) -> Vec<SimilarMatch>
    where
        I: IntoIterator<Item = CacheEntry>,
    {
        let mut matches: Vec<SimilarMatch> = candidates
            .into_iter()
            .filter_map(|entry| {
                let score = similarity(query, &entry.input_content);
                (score >= self.threshold && score > 0.0).then_some(SimilarMatch { entry, score })
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.entry.last_hit_at.cmp(&a.entry.last_hit_at))
                .then_with(|| b.entry.hit_count.cmp(&a.entry.hit_count))
        });
        matches.truncate(self.max_candidates);
        matches
    }
}
