//! Scored item sets

use serde::{Deserialize, Serialize};

/// An ordered item -> score mapping.
///
/// Scores are indexed by item; a ranking is recovered by a stable
/// descending sort on score with ties broken by item index, so equal
/// scores are never silently dropped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredItems {
    scores: Vec<f64>,
}

impl ScoredItems {
    /// Wrap a score vector indexed by item
    pub fn from_scores(scores: Vec<f64>) -> Self {
        Self { scores }
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// True if no items are scored
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Score of one item
    pub fn score(&self, item: usize) -> f64 {
        self.scores[item]
    }

    /// All scores, indexed by item
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    /// Items sorted by descending score; ties keep ascending item order
    pub fn ranking(&self) -> Vec<usize> {
        let mut items: Vec<usize> = (0..self.scores.len()).collect();
        items.sort_by(|&a, &b| {
            self.scores[b]
                .partial_cmp(&self.scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });
        items
    }

    /// Iterate `(item, score)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.scores.iter().copied().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranking_descending() {
        let scored = ScoredItems::from_scores(vec![0.1, 2.0, -1.0]);
        assert_eq!(scored.ranking(), vec![1, 0, 2]);
    }

    #[test]
    fn test_ranking_tie_break_by_index() {
        let scored = ScoredItems::from_scores(vec![1.0, 2.0, 1.0]);
        assert_eq!(scored.ranking(), vec![1, 0, 2]);
    }
}
