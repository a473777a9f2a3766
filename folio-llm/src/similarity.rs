//! Word-shingle containment scoring.
//!
//! The score of a candidate against a source is the fraction of the
//! candidate's word k-grams that also occur in the source. A fully copied
//! passage scores 1.0 even when the source is much longer.

use std::collections::HashSet;

use async_trait::async_trait;
use folio_core::{canonicalize_text, FolioResult};

use crate::{SimilarityReport, SimilarityScorer, SourceMatch, SourceText};

#[derive(Debug, Clone)]
pub struct ShingleSimilarityScorer {
    shingle_size: usize,
    id: String,
}

impl ShingleSimilarityScorer {
    /// `shingle_size` is clamped to at least 1.
    pub fn new(shingle_size: usize) -> Self {
        let shingle_size = shingle_size.max(1);
        Self {
            shingle_size,
            id: format!("shingle-{}", shingle_size),
        }
    }

    /// Containment of `candidate` in `source`, in `[0, 1]`.
    pub fn containment(&self, candidate: &str, source: &str) -> f64 {
        let candidate = self.shingles(candidate);
        if candidate.is_empty() {
            return 0.0;
        }
        let source = self.shingles(source);
        let shared = candidate.intersection(&source).count();
        shared as f64 / candidate.len() as f64
    }

    fn shingles(&self, text: &str) -> HashSet<String> {
        let canonical = canonicalize_text(text);
        let words: Vec<&str> = canonical
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        if words.is_empty() {
            return HashSet::new();
        }
        if words.len() < self.shingle_size {
            return HashSet::from([words.join(" ")]);
        }
        words
            .windows(self.shingle_size)
            .map(|window| window.join(" "))
            .collect()
    }
}

impl Default for ShingleSimilarityScorer {
    fn default() -> Self {
        Self::new(3)
    }
}

#[async_trait]
impl SimilarityScorer for ShingleSimilarityScorer {
    async fn score(&self, candidate: &str, sources: &[SourceText]) -> FolioResult<SimilarityReport> {
        let mut matches: Vec<SourceMatch> = sources
            .iter()
            .map(|source| SourceMatch {
                label: source.label.clone(),
                score: self.containment(candidate, &source.text),
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        let score = matches.first().map_or(0.0, |m| m.score);
        Ok(SimilarityReport {
            score,
            matches,
            scorer: self.id.clone(),
        })
    }

    fn scorer_id(&self) -> &str {
        &self.id
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Scores always fall in [0, 1].
        #[test]
        fn prop_score_bounded(a in "[a-z ]{0,80}", b in "[a-z ]{0,80}") {
            let score = ShingleSimilarityScorer::default().containment(&a, &b);
            prop_assert!((0.0..=1.0).contains(&score));
        }

        /// Any text is fully contained in itself.
        #[test]
        fn prop_self_containment(words in prop::collection::vec("[a-z]{1,6}", 1..20)) {
            let text = words.join(" ");
            prop_assert_eq!(ShingleSimilarityScorer::default().containment(&text, &text), 1.0);
        }
    }
}
