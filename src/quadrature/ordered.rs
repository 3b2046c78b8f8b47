//! Conditional moments of independent normals under an observed ordering
//!
//! The order cone `x_{r0} > x_{r1} > ... > x_{r(m-1)}` is not a box, but the
//! bidiagonal change of variables `y_0 = x_{r0}`, `y_j = x_{r(j-1)} - x_{rj}`
//! maps it onto the half-open box `y_j > 0 (j >= 1)`, where the orthant
//! service applies directly. The transform is unit-triangular, so mapping
//! conditional means back is a forward substitution.

use nalgebra::DMatrix;

use crate::data::Ranking;
use crate::error::{DataError, EstResult};
use crate::quadrature::{orthant_cdf, orthant_expectation, MvnOptions};

/// Conditional first moments of the latent utilities given one ranking
#[derive(Clone, Debug)]
pub struct OrderedMoments {
    /// `values[item]` = `E[x_item | observed order]`
    pub values: Vec<f64>,
    /// Whether the underlying quadrature met its tolerance
    pub converged: bool,
}

/// `E[x_k | x ordered as ranked]` for independent `x_k ~ N(mean_k, variance_k)`.
pub fn order_constrained_moments(
    mean: &[f64],
    variance: &[f64],
    ranking: &Ranking,
    opts: &MvnOptions,
) -> EstResult<OrderedMoments> {
    let (mean_y, cov_y, lower, upper) = difference_problem(mean, variance, ranking)?;
    let expectation = orthant_expectation(&mean_y, &cov_y, &lower, &upper, opts)?;

    // Invert the unit-triangular transform: x_{r0} = y_0, x_{rj} = x_{r(j-1)} - y_j
    let m = ranking.len();
    let mut values = vec![0.0; m];
    let mut running = expectation.values[0];
    values[ranking.item_at(0)] = running;
    for j in 1..m {
        running -= expectation.values[j];
        values[ranking.item_at(j)] = running;
    }

    Ok(OrderedMoments {
        values,
        converged: expectation.converged,
    })
}

/// Log-probability of observing one ranking under independent normal
/// utilities, via the orthant probability of the difference box.
pub fn ranking_log_likelihood(
    mean: &[f64],
    variance: &[f64],
    ranking: &Ranking,
    opts: &MvnOptions,
) -> EstResult<f64> {
    let (mean_y, cov_y, lower, upper) = difference_problem(mean, variance, ranking)?;
    let result = orthant_cdf(&mean_y, &cov_y, &lower, &upper, opts)?;
    Ok(result.value.max(f64::MIN_POSITIVE).ln())
}

/// Build the difference-space mean, covariance and box bounds for one
/// ranking over independent normals.
#[allow(clippy::type_complexity)]
fn difference_problem(
    mean: &[f64],
    variance: &[f64],
    ranking: &Ranking,
) -> EstResult<(Vec<f64>, DMatrix<f64>, Vec<f64>, Vec<f64>)> {
    let m = ranking.len();
    if mean.len() != m {
        return Err(DataError::DimensionMismatch {
            expected: m,
            actual: mean.len(),
        }
        .into());
    }
    if variance.len() != m {
        return Err(DataError::DimensionMismatch {
            expected: m,
            actual: variance.len(),
        }
        .into());
    }
    for &v in variance {
        if !(v > 0.0) {
            return Err(DataError::invalid("variance", v, "must be > 0").into());
        }
    }

    // Parameters in ranked order
    let mu: Vec<f64> = (0..m).map(|j| mean[ranking.item_at(j)]).collect();
    let var: Vec<f64> = (0..m).map(|j| variance[ranking.item_at(j)]).collect();

    let mut mean_y = vec![0.0; m];
    mean_y[0] = mu[0];
    for j in 1..m {
        mean_y[j] = mu[j - 1] - mu[j];
    }

    // Covariance of (x_{r0}, successive differences): tridiagonal apart
    // from the coupling of y_0 with the first difference
    let mut cov_y = DMatrix::zeros(m, m);
    cov_y[(0, 0)] = var[0];
    if m > 1 {
        cov_y[(0, 1)] = var[0];
        cov_y[(1, 0)] = var[0];
    }
    for j in 1..m {
        cov_y[(j, j)] = var[j - 1] + var[j];
        if j + 1 < m {
            cov_y[(j, j + 1)] = -var[j];
            cov_y[(j + 1, j)] = -var[j];
        }
    }

    let mut lower = vec![0.0; m];
    lower[0] = f64::NEG_INFINITY;
    let upper = vec![f64::INFINITY; m];

    Ok((mean_y, cov_y, lower, upper))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use crate::distributions::normal::NormalKernel;

    fn opts(seed: u64) -> MvnOptions {
        MvnOptions {
            initial_points: 16_384,
            seed: Some(seed),
            ..MvnOptions::default()
        }
    }

    #[test]
    fn test_two_item_log_likelihood_matches_probit() {
        // P(x0 > x1) for N(mu0, 1), N(mu1, 1) = Phi((mu0 - mu1)/sqrt(2))
        let ranking = Ranking::new(vec![0, 1]).unwrap();
        let mean = [0.8, -0.4];
        let logp =
            ranking_log_likelihood(&mean, &[1.0, 1.0], &ranking, &opts(3)).unwrap();
        let expected = NormalKernel::Precise
            .cdf((mean[0] - mean[1]) / std::f64::consts::SQRT_2)
            .ln();
        assert_abs_diff_eq!(logp, expected, epsilon = 2e-3);
    }

    #[test]
    fn test_moments_respect_observed_order() {
        let ranking = Ranking::new(vec![2, 0, 1]).unwrap();
        let mean = [0.0, 0.0, 0.0];
        let variance = [1.0, 1.0, 1.0];
        let moments = order_constrained_moments(&mean, &variance, &ranking, &opts(7)).unwrap();

        // Conditional means must be ordered like the ranking
        assert!(moments.values[2] > moments.values[0]);
        assert!(moments.values[0] > moments.values[1]);
    }

    #[test]
    fn test_two_item_moment_reference() {
        // Exchangeable standard normals given x0 > x1:
        // E[x0 | x0 > x1] = 1/sqrt(pi), E[x1 | ...] = -1/sqrt(pi)
        let ranking = Ranking::new(vec![0, 1]).unwrap();
        let moments =
            order_constrained_moments(&[0.0, 0.0], &[1.0, 1.0], &ranking, &opts(13)).unwrap();
        let reference = 1.0 / std::f64::consts::PI.sqrt();
        assert_abs_diff_eq!(moments.values[0], reference, epsilon = 5e-3);
        assert_abs_diff_eq!(moments.values[1], -reference, epsilon = 5e-3);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let ranking = Ranking::new(vec![0, 1, 2]).unwrap();
        let err =
            order_constrained_moments(&[0.0, 0.0], &[1.0; 3], &ranking, &opts(1)).unwrap_err();
        assert!(matches!(
            err,
            crate::error::EstimationError::Data(DataError::DimensionMismatch { .. })
        ));
    }
}
