//! Randomized quasi-Monte-Carlo integration for multivariate normal boxes
//!
//! Sequential-conditioning estimator over a Richtmyer lattice with random
//! shifts: each lattice point is pushed through the Cholesky factor one
//! coordinate at a time, truncating to the box as it goes; the product of
//! interval masses is the sample weight. Probability and first-moment
//! integrals share one pass. Error estimates come from the spread of the
//! per-shift means.

use nalgebra::DMatrix;
use rand::Rng;

use crate::distributions::normal::NormalKernel;

/// Smallest usable conditional scale; guards near-singular factors
const MIN_DIAG: f64 = 1e-12;

/// One integration request over a standardized box
pub struct QmcProblem<'a> {
    /// Lower Cholesky factor of the correlation matrix
    pub chol: &'a DMatrix<f64>,
    /// Standardized lower bounds, `-inf` for unbounded
    pub lower: &'a [f64],
    /// Standardized upper bounds, `+inf` for unbounded
    pub upper: &'a [f64],
}

/// Raw integration output in standardized coordinates
#[derive(Clone, Debug)]
pub struct QmcEstimate {
    /// Estimated box probability
    pub probability: f64,
    /// Error estimate for the probability (3x standard error over shifts)
    pub prob_error: f64,
    /// Estimated `E[X_k * 1(box)]` per coordinate
    pub moments: Vec<f64>,
    /// Per-coordinate error estimates for the moments
    pub moment_errors: Vec<f64>,
}

/// Run the randomized lattice rule with `points` evaluations split across
/// `shifts` independent random shifts.
pub fn integrate<R: Rng + ?Sized>(
    problem: &QmcProblem<'_>,
    points: usize,
    shifts: usize,
    rng: &mut R,
) -> QmcEstimate {
    let d = problem.lower.len();
    let kernel = NormalKernel::Precise;
    let shifts = shifts.max(2);
    let per_shift = (points / shifts).max(1);
    let generators = lattice_generators(d);

    let mut shift_probs = Vec::with_capacity(shifts);
    let mut shift_moments = Vec::with_capacity(shifts);
    let mut y = vec![0.0; d];
    let mut w = vec![0.0; d];

    for _ in 0..shifts {
        let delta: Vec<f64> = (0..d).map(|_| rng.gen::<f64>()).collect();
        let mut prob_sum = 0.0;
        let mut moment_sum = vec![0.0; d];

        for k in 1..=per_shift {
            // Folded (antithetic) lattice point
            for i in 0..d {
                let v = (k as f64) * generators[i] + delta[i];
                w[i] = (2.0 * v.fract() - 1.0).abs();
            }

            let mut weight = 1.0;
            for i in 0..d {
                let mut shifted = 0.0;
                for j in 0..i {
                    shifted += problem.chol[(i, j)] * y[j];
                }
                let scale = problem.chol[(i, i)].max(MIN_DIAG);
                let lo = if problem.lower[i] == f64::NEG_INFINITY {
                    0.0
                } else {
                    kernel.cdf((problem.lower[i] - shifted) / scale)
                };
                let hi = if problem.upper[i] == f64::INFINITY {
                    1.0
                } else {
                    kernel.cdf((problem.upper[i] - shifted) / scale)
                };
                let mass = (hi - lo).max(0.0);
                weight *= mass;
                if weight == 0.0 {
                    break;
                }
                y[i] = kernel.quantile(lo + w[i] * mass);
            }

            if weight > 0.0 {
                prob_sum += weight;
                for i in 0..d {
                    let mut x = 0.0;
                    for j in 0..=i {
                        x += problem.chol[(i, j)] * y[j];
                    }
                    moment_sum[i] += weight * x;
                }
            }
        }

        shift_probs.push(prob_sum / per_shift as f64);
        shift_moments.push(
            moment_sum
                .into_iter()
                .map(|m| m / per_shift as f64)
                .collect::<Vec<f64>>(),
        );
    }

    let (probability, prob_error) = mean_and_error(&shift_probs);
    let mut moments = vec![0.0; d];
    let mut moment_errors = vec![0.0; d];
    for i in 0..d {
        let column: Vec<f64> = shift_moments.iter().map(|m| m[i]).collect();
        let (mean, err) = mean_and_error(&column);
        moments[i] = mean;
        moment_errors[i] = err;
    }

    QmcEstimate {
        probability,
        prob_error,
        moments,
        moment_errors,
    }
}

/// Mean of per-shift estimates and 3x their standard error
fn mean_and_error(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n * (n - 1.0));
    (mean, 3.0 * var.sqrt())
}

/// Square roots of the first `d` primes, the Richtmyer generators
fn lattice_generators(d: usize) -> Vec<f64> {
    let mut primes = Vec::with_capacity(d);
    let mut candidate: u64 = 2;
    while primes.len() < d {
        if (2..=((candidate as f64).sqrt() as u64)).all(|q| candidate % q != 0) {
            primes.push((candidate as f64).sqrt());
        }
        candidate += 1;
    }
    primes
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn identity_problem(d: usize, lower: Vec<f64>, upper: Vec<f64>) -> (DMatrix<f64>, Vec<f64>, Vec<f64>) {
        (DMatrix::identity(d, d), lower, upper)
    }

    #[test]
    fn test_independent_box_probability() {
        // P(all three coordinates in (-1, 1)) for independent standard
        // normals = (Phi(1) - Phi(-1))^3
        let (chol, lower, upper) =
            identity_problem(3, vec![-1.0; 3], vec![1.0; 3]);
        let problem = QmcProblem {
            chol: &chol,
            lower: &lower,
            upper: &upper,
        };
        let mut rng = StdRng::seed_from_u64(11);
        let est = integrate(&problem, 20_000, 8, &mut rng);

        let one_dim = NormalKernel::Precise.cdf(1.0) - NormalKernel::Precise.cdf(-1.0);
        assert_abs_diff_eq!(est.probability, one_dim.powi(3), epsilon = 1e-4);
    }

    #[test]
    fn test_half_space_moment() {
        // For a standard normal restricted to (0, inf):
        // E[X * 1(X > 0)] = phi(0), P = 0.5
        let (chol, lower, upper) = identity_problem(1, vec![0.0], vec![f64::INFINITY]);
        let problem = QmcProblem {
            chol: &chol,
            lower: &lower,
            upper: &upper,
        };
        let mut rng = StdRng::seed_from_u64(3);
        let est = integrate(&problem, 20_000, 8, &mut rng);

        assert_abs_diff_eq!(est.probability, 0.5, epsilon = 1e-3);
        assert_abs_diff_eq!(
            est.moments[0],
            crate::distributions::normal::pdf(0.0),
            epsilon = 1e-3
        );
    }

    #[test]
    fn test_error_estimate_brackets_truth() {
        let (chol, lower, upper) = identity_problem(2, vec![-0.5, -0.5], vec![0.5, 1.5]);
        let problem = QmcProblem {
            chol: &chol,
            lower: &lower,
            upper: &upper,
        };
        let mut rng = StdRng::seed_from_u64(19);
        let est = integrate(&problem, 16_000, 8, &mut rng);

        let k = NormalKernel::Precise;
        let truth = (k.cdf(0.5) - k.cdf(-0.5)) * (k.cdf(1.5) - k.cdf(-0.5));
        assert!(
            (est.probability - truth).abs() <= est.prob_error.max(1e-4),
            "estimate {} truth {} error bound {}",
            est.probability,
            truth,
            est.prob_error
        );
    }
}
