//! Rankings and ranking profiles
//!
//! A [`Ranking`] is a strict total order over the item set (first = most
//! preferred). A [`RankingProfile`] is a multiset of rankings over the same
//! item set, the input to the ordinal estimation engine.

use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// A permutation of item indices, most preferred first
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ranking {
    order: Vec<usize>,
}

impl Ranking {
    /// Create a ranking from an ordering of item indices.
    ///
    /// Rejects orderings that are not a permutation of `0..order.len()`.
    pub fn new(order: Vec<usize>) -> Result<Self, DataError> {
        let n = order.len();
        let mut seen = vec![false; n];
        for &item in &order {
            if item >= n || seen[item] {
                return Err(DataError::NotAPermutation(item));
            }
            seen[item] = true;
        }
        Ok(Self { order })
    }

    /// Number of ranked items
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True if the ranking is empty
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Item at the given rank position (0 = most preferred)
    pub fn item_at(&self, position: usize) -> usize {
        self.order[position]
    }

    /// The full ordering, most preferred first
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Position of each item: `positions()[item]` = rank of `item`
    pub fn positions(&self) -> Vec<usize> {
        let mut pos = vec![0; self.order.len()];
        for (rank, &item) in self.order.iter().enumerate() {
            pos[item] = rank;
        }
        pos
    }
}

/// A multiset of rankings over a fixed item set
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RankingProfile {
    items: usize,
    rankings: Vec<Ranking>,
}

impl RankingProfile {
    /// Create an empty profile over `items` items
    pub fn new(items: usize) -> Result<Self, DataError> {
        if items < 2 {
            return Err(DataError::TooFewItems {
                required: 2,
                actual: items,
            });
        }
        Ok(Self {
            items,
            rankings: Vec::new(),
        })
    }

    /// Number of items in the item set
    pub fn items(&self) -> usize {
        self.items
    }

    /// Number of rankings in the profile
    pub fn len(&self) -> usize {
        self.rankings.len()
    }

    /// True if the profile holds no rankings
    pub fn is_empty(&self) -> bool {
        self.rankings.is_empty()
    }

    /// Add one ranking; its length must match the item count
    pub fn push(&mut self, ranking: Ranking) -> Result<(), DataError> {
        if ranking.len() != self.items {
            return Err(DataError::LengthMismatch {
                expected: self.items,
                actual: ranking.len(),
            });
        }
        self.rankings.push(ranking);
        Ok(())
    }

    /// Add `count` copies of the same ranking (duplicated ballots)
    pub fn push_many(&mut self, ranking: Ranking, count: usize) -> Result<(), DataError> {
        if ranking.len() != self.items {
            return Err(DataError::LengthMismatch {
                expected: self.items,
                actual: ranking.len(),
            });
        }
        self.rankings.extend(std::iter::repeat(ranking).take(count));
        Ok(())
    }

    /// The rankings in insertion order
    pub fn rankings(&self) -> &[Ranking] {
        &self.rankings
    }

    /// Iterate over the rankings
    pub fn iter(&self) -> impl Iterator<Item = &Ranking> {
        self.rankings.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranking_valid() {
        let r = Ranking::new(vec![2, 0, 1]).unwrap();
        assert_eq!(r.len(), 3);
        assert_eq!(r.item_at(0), 2);
        assert_eq!(r.positions(), vec![1, 2, 0]);
    }

    #[test]
    fn test_ranking_rejects_repeat() {
        let err = Ranking::new(vec![0, 1, 1]).unwrap_err();
        assert_eq!(err, DataError::NotAPermutation(1));
    }

    #[test]
    fn test_ranking_rejects_out_of_range() {
        let err = Ranking::new(vec![0, 3, 1]).unwrap_err();
        assert_eq!(err, DataError::NotAPermutation(3));
    }

    #[test]
    fn test_profile_length_invariant() {
        let mut profile = RankingProfile::new(3).unwrap();
        profile.push(Ranking::new(vec![0, 1, 2]).unwrap()).unwrap();

        let short = Ranking::new(vec![1, 0]).unwrap();
        let err = profile.push(short).unwrap_err();
        assert_eq!(
            err,
            DataError::LengthMismatch {
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_profile_push_many() {
        let mut profile = RankingProfile::new(2).unwrap();
        profile
            .push_many(Ranking::new(vec![0, 1]).unwrap(), 5)
            .unwrap();
        profile
            .push_many(Ranking::new(vec![1, 0]).unwrap(), 2)
            .unwrap();
        assert_eq!(profile.len(), 7);
    }

    #[test]
    fn test_profile_too_few_items() {
        assert!(RankingProfile::new(1).is_err());
    }
}
