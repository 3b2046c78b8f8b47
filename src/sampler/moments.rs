//! Per-item running moments
//!
//! E-step tasks each produce one accumulator; the driver merges them
//! sequentially (map-then-reduce), so no synchronization is needed on the
//! sums themselves.

use serde::{Deserialize, Serialize};

/// Running per-item first and second moments with an integer weight.
///
/// One "pass" records a value for every item; `weight` counts completed
/// passes (scaled for weighted data), so `mean(k) = sum[k] / weight`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MomentAccumulator {
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
    weight: u64,
}

impl MomentAccumulator {
    /// An empty accumulator over `items` items
    pub fn new(items: usize) -> Self {
        Self {
            sum: vec![0.0; items],
            sum_sq: vec![0.0; items],
            weight: 0,
        }
    }

    /// Number of items tracked
    pub fn items(&self) -> usize {
        self.sum.len()
    }

    /// Zero all sums without reallocating
    pub fn reset(&mut self) {
        self.sum.fill(0.0);
        self.sum_sq.fill(0.0);
        self.weight = 0;
    }

    /// Record one value for one item within the current pass
    #[inline]
    pub fn record(&mut self, item: usize, value: f64) {
        self.sum[item] += value;
        self.sum_sq[item] += value * value;
    }

    /// Record one value for one item, counted `weight` times
    #[inline]
    pub fn record_weighted(&mut self, item: usize, value: f64, weight: u64) {
        let w = weight as f64;
        self.sum[item] += w * value;
        self.sum_sq[item] += w * value * value;
    }

    /// Close the current pass, adding `weight` to the pass count
    pub fn complete_pass(&mut self, weight: u64) {
        self.weight += weight;
    }

    /// Completed pass weight
    pub fn weight(&self) -> u64 {
        self.weight
    }

    /// First moment of one item; zero before any completed pass
    pub fn mean(&self, item: usize) -> f64 {
        if self.weight == 0 {
            0.0
        } else {
            self.sum[item] / self.weight as f64
        }
    }

    /// Second raw moment of one item
    pub fn mean_sq(&self, item: usize) -> f64 {
        if self.weight == 0 {
            0.0
        } else {
            self.sum_sq[item] / self.weight as f64
        }
    }

    /// Fold another accumulator into this one
    pub fn merge(&mut self, other: &Self) {
        debug_assert_eq!(self.sum.len(), other.sum.len());
        for (a, b) in self.sum.iter_mut().zip(other.sum.iter()) {
            *a += b;
        }
        for (a, b) in self.sum_sq.iter_mut().zip(other.sum_sq.iter()) {
            *a += b;
        }
        self.weight += other.weight;
    }
}
