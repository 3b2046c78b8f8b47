//! Latent utility model parameters

use serde::{Deserialize, Serialize};

use crate::data::scored::ScoredItems;
use crate::error::DataError;

/// Per-item latent normal parameters with an identifiability anchor.
///
/// The likelihood of ordinal data is invariant to a global shift and scale
/// of the latent utilities, so item 0 is pinned to `mean[0] == 0`,
/// `variance[0] == 1`; all other parameters are relative to that anchor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatentUtilityModel {
    mean: Vec<f64>,
    variance: Vec<f64>,
}

impl LatentUtilityModel {
    /// Create a model from mean and variance vectors.
    ///
    /// Variances must be strictly positive; the anchor is re-established
    /// by construction.
    pub fn new(mean: Vec<f64>, variance: Vec<f64>) -> Result<Self, DataError> {
        if mean.len() != variance.len() {
            return Err(DataError::DimensionMismatch {
                expected: mean.len(),
                actual: variance.len(),
            });
        }
        if mean.len() < 2 {
            return Err(DataError::TooFewItems {
                required: 2,
                actual: mean.len(),
            });
        }
        for &v in &variance {
            if !(v > 0.0) || !v.is_finite() {
                return Err(DataError::invalid("variance", v, "must be finite and > 0"));
            }
        }
        for &m in &mean {
            if !m.is_finite() {
                return Err(DataError::invalid("mean", m, "must be finite"));
            }
        }
        let mut model = Self { mean, variance };
        model.reanchor();
        Ok(model)
    }

    /// A model with all means zero and unit variances
    pub fn standard(items: usize) -> Result<Self, DataError> {
        Self::new(vec![0.0; items], vec![1.0; items])
    }

    /// Number of items
    pub fn items(&self) -> usize {
        self.mean.len()
    }

    /// Per-item means
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Per-item variances
    pub fn variance(&self) -> &[f64] {
        &self.variance
    }

    /// Replace both parameter vectors at once (an M-step commit).
    /// Lengths must match the current item count and the values pass the
    /// same checks as [`new`](Self::new); on rejection the model is left
    /// unchanged. The anchor is restored on success.
    pub fn assign(&mut self, mean: Vec<f64>, variance: Vec<f64>) -> Result<(), DataError> {
        if mean.len() != self.mean.len() || variance.len() != self.variance.len() {
            return Err(DataError::DimensionMismatch {
                expected: self.mean.len(),
                actual: mean.len().max(variance.len()),
            });
        }
        for &v in &variance {
            if !(v > 0.0) || !v.is_finite() {
                return Err(DataError::invalid("variance", v, "must be finite and > 0"));
            }
        }
        for &m in &mean {
            if !m.is_finite() {
                return Err(DataError::invalid("mean", m, "must be finite"));
            }
        }
        self.mean = mean;
        self.variance = variance;
        self.reanchor();
        Ok(())
    }

    /// Restore the identifiability anchor: divide variances by
    /// `variance[0]`, divide means by `sqrt(variance[0])`, then subtract
    /// `mean[0]`, leaving `mean[0] == 0` and `variance[0] == 1` exactly.
    pub fn reanchor(&mut self) {
        let v0 = self.variance[0];
        let scale = v0.sqrt();
        for v in &mut self.variance {
            *v /= v0;
        }
        for m in &mut self.mean {
            *m /= scale;
        }
        let m0 = self.mean[0];
        for m in &mut self.mean {
            *m -= m0;
        }
        // Exactness at the anchor, independent of rounding
        self.mean[0] = 0.0;
        self.variance[0] = 1.0;
    }

    /// Euclidean distance between the stacked (mean, variance) parameter
    /// vectors of two models. Used as the EM convergence metric.
    pub fn parameter_distance(&self, other: &Self) -> f64 {
        let mean_sq: f64 = self
            .mean
            .iter()
            .zip(other.mean.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum();
        let var_sq: f64 = self
            .variance
            .iter()
            .zip(other.variance.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum();
        (mean_sq + var_sq).sqrt()
    }

    /// Norm of the stacked parameter vector
    pub fn parameter_norm(&self) -> f64 {
        let sq: f64 = self
            .mean
            .iter()
            .chain(self.variance.iter())
            .map(|x| x * x)
            .sum();
        sq.sqrt()
    }

    /// View the means as item scores
    pub fn scores(&self) -> ScoredItems {
        ScoredItems::from_scores(self.mean.clone())
    }
}
