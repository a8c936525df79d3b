use rayon::prelude::*;
use std::collections::BTreeSet;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

use crate::models::FeedbackRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimilarityParams {
    pub min_token_len: usize,      // tokens must be strictly longer than this (4)
    pub min_shared_tokens: usize,  // 3
    pub points_per_sibling: u32,   // 5
    pub volume_cap: u32,           // 20
}

impl Default for SimilarityParams {
    fn default() -> Self {
        Self {
            min_token_len: 4,
            min_shared_tokens: 3,
            points_per_sibling: 5,
            volume_cap: 20,
        }
    }
}

impl SimilarityParams {
    /// Volume contribution: `min(cap, similar * points)`.
    pub fn volume_score(&self, similar_count: usize) -> u32 {
        let count = u32::try_from(similar_count).unwrap_or(u32::MAX);
        count.saturating_mul(self.points_per_sibling).min(self.volume_cap)
    }
}

/// Whitespace tokens of the lower-cased text, keeping only the long ones.
/// Length is measured on the raw token; kept tokens are NFC-composed so
/// precomposed and decomposed spellings compare equal.
pub fn token_set(text: &str, min_token_len: usize) -> BTreeSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .filter(|t| t.chars().count() > min_token_len)
        .map(|t| t.nfc().collect::<String>())
        .collect()
}

pub fn shared_tokens(a: &BTreeSet<String>, b: &BTreeSet<String>) -> usize {
    a.intersection(b).count()
}

pub fn is_similar(a: &BTreeSet<String>, b: &BTreeSet<String>, params: &SimilarityParams) -> bool {
    shared_tokens(a, b) >= params.min_shared_tokens
}

/// Batch-scoped similar-sibling counts, one per record, addressed by the
/// record's position in the batch it was built from.
#[derive(Debug, Clone, Default)]
pub struct SimilarityIndex {
    counts: Vec<usize>,
}

impl SimilarityIndex {
    pub fn build(records: &[FeedbackRecord], params: &SimilarityParams) -> Self {
        let texts: Vec<String> = records.iter().map(FeedbackRecord::text).collect();
        Self::from_texts(&texts, params)
    }

    pub fn from_texts<S: AsRef<str> + Sync>(texts: &[S], params: &SimilarityParams) -> Self {
        let sets: Vec<BTreeSet<String>> = texts
            .par_iter()
            .map(|t| token_set(t.as_ref(), params.min_token_len))
            .collect();

        // each row is computed independently; O(n^2) intersections
        let counts: Vec<usize> = (0..sets.len())
            .into_par_iter()
            .map(|i| {
                (0..sets.len())
                    .filter(|&j| j != i && is_similar(&sets[i], &sets[j], params))
                    .count()
            })
            .collect();

        let with_siblings = counts.iter().filter(|&&c| c > 0).count();
        debug!(
            "Similarity pass - records={}, with_siblings={}, max_siblings={}",
            counts.len(),
            with_siblings,
            counts.iter().max().copied().unwrap_or(0)
        );

        Self { counts }
    }

    pub fn similar_count(&self, index: usize) -> usize {
        self.counts.get(index).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_score_saturates_at_cap() {
        let p = SimilarityParams::default();
        let scores: Vec<u32> = (0..=5).map(|n| p.volume_score(n)).collect();
        assert_eq!(scores, vec![0, 5, 10, 15, 20, 20]);
    }

    #[test]
    fn only_tokens_longer_than_four_chars_are_kept() {
        let set = token_set("The LOGIN page crashes after update", 4);
        let expected: BTreeSet<String> =
            ["login", "crashes", "after", "update"].iter().map(|s| s.to_string()).collect();
        assert_eq!(set, expected);
    }

    #[test]
    fn length_is_counted_before_composition() {
        // "cafe" + combining acute is five raw chars, four once composed
        let decomposed = token_set("cafe\u{301}", 4);
        assert_eq!(decomposed.len(), 1);
        assert!(decomposed.contains("caf\u{e9}"));
        assert!(token_set("caf\u{e9}", 4).is_empty());
    }

    #[test]
    fn three_shared_tokens_are_similar_two_are_not() {
        let p = SimilarityParams::default();
        let idx = SimilarityIndex::from_texts(
            &[
                "checkout button freezes payment screen",
                "payment screen freezes sometimes",  // shares 3 with #0
                "checkout button looks great",       // shares 2 with #0
            ],
            &p,
        );
        assert_eq!(idx.similar_count(0), 1);
        assert_eq!(idx.similar_count(1), 1);
        assert_eq!(idx.similar_count(2), 0);
    }

    #[test]
    fn similarity_is_symmetric() {
        let p = SimilarityParams::default();
        let texts = [
            "upload fails with large files timeout",
            "large files upload timeout again",
            "unrelated kudos message",
            "files upload timeout large issue",
        ];
        let sets: Vec<_> = texts.iter().map(|t| token_set(t, p.min_token_len)).collect();
        for a in &sets {
            for b in &sets {
                assert_eq!(is_similar(a, b, &p), is_similar(b, a, &p));
            }
        }
        let idx = SimilarityIndex::from_texts(&texts, &p);
        assert_eq!(idx.similar_count(0), 2);
        assert_eq!(idx.similar_count(2), 0);
    }

    #[test]
    fn thresholds_are_tunable() {
        let p = SimilarityParams { min_shared_tokens: 2, ..Default::default() };
        let idx = SimilarityIndex::from_texts(&["alpha bravo charlie", "alpha bravo delta"], &p);
        assert_eq!(idx.similar_count(0), 1);
        assert_eq!(idx.similar_count(7), 0);
    }
}
