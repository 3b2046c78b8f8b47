//! Pairwise win/loss tallies

use serde::{Deserialize, Serialize};

use crate::data::ranking::RankingProfile;
use crate::error::DataError;

/// An n x n win-count matrix: `wins(i, j)` = times item `i` beat item `j`.
///
/// The diagonal is unused and kept at zero. Counts are stored in a
/// contiguous row-major buffer; item identity lives only at the boundary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairwiseTally {
    items: usize,
    counts: Vec<u64>,
}

impl PairwiseTally {
    /// Create an empty tally over `items` items
    pub fn new(items: usize) -> Result<Self, DataError> {
        if items < 2 {
            return Err(DataError::TooFewItems {
                required: 2,
                actual: items,
            });
        }
        Ok(Self {
            items,
            counts: vec![0; items * items],
        })
    }

    /// Build a tally from a row-major matrix of counts
    pub fn from_matrix(rows: &[Vec<u64>]) -> Result<Self, DataError> {
        let n = rows.len();
        let mut tally = Self::new(n)?;
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n {
                return Err(DataError::DimensionMismatch {
                    expected: n,
                    actual: row.len(),
                });
            }
            for (j, &count) in row.iter().enumerate() {
                if i != j {
                    tally.counts[i * n + j] = count;
                }
            }
        }
        Ok(tally)
    }

    /// Derive pairwise counts from a ranking profile: every ranking
    /// contributes one win for each of its induced pairwise preferences.
    pub fn from_profile(profile: &RankingProfile) -> Result<Self, DataError> {
        let mut tally = Self::new(profile.items())?;
        for ranking in profile.iter() {
            let order = ranking.order();
            for (pos, &winner) in order.iter().enumerate() {
                for &loser in &order[pos + 1..] {
                    tally.record(winner, loser, 1);
                }
            }
        }
        Ok(tally)
    }

    /// Number of items
    pub fn items(&self) -> usize {
        self.items
    }

    /// Wins of `i` over `j`
    pub fn wins(&self, i: usize, j: usize) -> u64 {
        self.counts[i * self.items + j]
    }

    /// Add `count` wins of `winner` over `loser`; self-comparisons are ignored
    pub fn record(&mut self, winner: usize, loser: usize, count: u64) {
        if winner != loser {
            self.counts[winner * self.items + loser] += count;
        }
    }

    /// Total comparisons involving the pair `(i, j)` in either direction
    pub fn pair_total(&self, i: usize, j: usize) -> u64 {
        self.wins(i, j) + self.wins(j, i)
    }

    /// Total number of recorded comparisons
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Total wins of each item
    pub fn win_totals(&self) -> Vec<u64> {
        (0..self.items)
            .map(|i| (0..self.items).map(|j| self.wins(i, j)).sum())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ranking::Ranking;

    #[test]
    fn test_tally_record_and_read() {
        let mut tally = PairwiseTally::new(3).unwrap();
        tally.record(0, 1, 4);
        tally.record(1, 0, 2);
        tally.record(2, 2, 9); // ignored

        assert_eq!(tally.wins(0, 1), 4);
        assert_eq!(tally.wins(1, 0), 2);
        assert_eq!(tally.wins(2, 2), 0);
        assert_eq!(tally.pair_total(0, 1), 6);
        assert_eq!(tally.total(), 6);
    }

    #[test]
    fn test_tally_from_matrix_rejects_ragged() {
        let err = PairwiseTally::from_matrix(&[vec![0, 1], vec![2]]).unwrap_err();
        assert!(matches!(err, DataError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_tally_from_profile() {
        let mut profile = RankingProfile::new(3).unwrap();
        profile.push(Ranking::new(vec![0, 1, 2]).unwrap()).unwrap();
        profile.push(Ranking::new(vec![2, 0, 1]).unwrap()).unwrap();

        let tally = PairwiseTally::from_profile(&profile).unwrap();
        // Ranking 0: 0>1, 0>2, 1>2. Ranking 1: 2>0, 2>1, 0>1.
        assert_eq!(tally.wins(0, 1), 2);
        assert_eq!(tally.wins(0, 2), 1);
        assert_eq!(tally.wins(2, 0), 1);
        assert_eq!(tally.wins(1, 2), 1);
        assert_eq!(tally.wins(2, 1), 1);
        assert_eq!(tally.total(), 6);
        assert_eq!(tally.win_totals(), vec![3, 1, 2]);
    }
}
