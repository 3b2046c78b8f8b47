//! Orthant probabilities and conditional expectations for multivariate
//! normals
//!
//! [`orthant_cdf`] and [`orthant_expectation`] wrap the iterative QMC
//! backend in [`genz`] with a standardize / integrate / retry policy: inputs
//! are converted to correlation form, the backend runs with a points budget,
//! and on non-convergence the budget doubles for up to a fixed number of
//! attempts. A non-converged final answer is returned with
//! `converged = false`, never raised; dimension mismatches fail immediately.
//!
//! Calls hold no shared mutable state and are safe from concurrent threads.

pub mod genz;
pub mod ordered;

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{DataError, EstResult, EstimationError};
use genz::{QmcEstimate, QmcProblem};

pub use ordered::{order_constrained_moments, ranking_log_likelihood, OrderedMoments};

/// Tuning knobs for the orthant integrals
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MvnOptions {
    /// Points budget for the first attempt
    pub initial_points: usize,
    /// Random lattice shifts per attempt (error estimation)
    pub shifts: usize,
    /// Maximum number of backend invocations; the budget doubles each time
    pub max_retries: usize,
    /// Absolute tolerance on the error estimate
    pub abs_eps: f64,
    /// Relative tolerance on the error estimate
    pub rel_eps: f64,
    /// Deterministic seed for the randomized lattice; `None` draws one
    pub seed: Option<u64>,
}

impl Default for MvnOptions {
    fn default() -> Self {
        Self {
            initial_points: 4096,
            shifts: 8,
            max_retries: 4,
            abs_eps: 1e-4,
            rel_eps: 1e-3,
            seed: None,
        }
    }
}

impl MvnOptions {
    /// Set the deterministic seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the tolerances
    pub fn tolerances(mut self, abs_eps: f64, rel_eps: f64) -> Self {
        self.abs_eps = abs_eps;
        self.rel_eps = rel_eps;
        self
    }

    /// Set the retry budget
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Result of an orthant probability evaluation
#[derive(Clone, Debug, PartialEq)]
pub struct MvnResult {
    /// Estimated probability mass of the box
    pub value: f64,
    /// Error estimate for `value`
    pub error: f64,
    /// Whether the error estimate met the requested tolerance
    pub converged: bool,
    /// Backend invocations performed (at most `max_retries`)
    pub attempts: usize,
}

/// Result of an orthant conditional-expectation evaluation
#[derive(Clone, Debug, PartialEq)]
pub struct MvnExpectation {
    /// Conditional first moments `E[X_k | X in box]`
    pub values: Vec<f64>,
    /// Per-coordinate error estimates
    pub errors: Vec<f64>,
    /// Whether every coordinate met the requested tolerance
    pub converged: bool,
    /// Backend invocations performed (at most `max_retries`)
    pub attempts: usize,
}

/// Standardized problem: correlation Cholesky factor plus scaled bounds
struct Standardized {
    chol: DMatrix<f64>,
    scales: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
}

/// `P(lower <= X <= upper)` for `X ~ N(mean, covariance)`.
///
/// Infinite bounds mark unbounded sides. See the module docs for the
/// retry policy.
pub fn orthant_cdf(
    mean: &[f64],
    covariance: &DMatrix<f64>,
    lower: &[f64],
    upper: &[f64],
    opts: &MvnOptions,
) -> EstResult<MvnResult> {
    let std = standardize(mean, covariance, lower, upper)?;
    let mut rng = make_rng(opts);
    let problem = QmcProblem {
        chol: &std.chol,
        lower: &std.lower,
        upper: &std.upper,
    };

    let mut points = opts.initial_points.max(opts.shifts);
    let mut attempts = 0;
    let mut last: Option<QmcEstimate> = None;
    while attempts < opts.max_retries.max(1) {
        let est = genz::integrate(&problem, points, opts.shifts, &mut rng);
        attempts += 1;
        let ok = within_tolerance(est.prob_error, est.probability, opts);
        last = Some(est);
        if ok {
            break;
        }
        points *= 2;
    }

    let est = last.ok_or_else(|| EstimationError::Numerical("no quadrature attempt ran".into()))?;
    let converged = within_tolerance(est.prob_error, est.probability, opts);
    Ok(MvnResult {
        value: est.probability,
        error: est.prob_error,
        converged,
        attempts,
    })
}

/// Conditional first moments `E[X | lower <= X <= upper]` for
/// `X ~ N(mean, covariance)`, with the same retry policy as [`orthant_cdf`].
pub fn orthant_expectation(
    mean: &[f64],
    covariance: &DMatrix<f64>,
    lower: &[f64],
    upper: &[f64],
    opts: &MvnOptions,
) -> EstResult<MvnExpectation> {
    let std = standardize(mean, covariance, lower, upper)?;
    let mut rng = make_rng(opts);
    let problem = QmcProblem {
        chol: &std.chol,
        lower: &std.lower,
        upper: &std.upper,
    };

    let mut points = opts.initial_points.max(opts.shifts);
    let mut attempts = 0;
    let mut last: Option<QmcEstimate> = None;
    while attempts < opts.max_retries.max(1) {
        let est = genz::integrate(&problem, points, opts.shifts, &mut rng);
        attempts += 1;
        let ok = expectation_converged(&est, opts);
        last = Some(est);
        if ok {
            break;
        }
        points *= 2;
    }

    let est = last.ok_or_else(|| EstimationError::Numerical("no quadrature attempt ran".into()))?;
    let converged = expectation_converged(&est, opts);
    let prob = est.probability.max(f64::MIN_POSITIVE);

    let d = mean.len();
    let mut values = Vec::with_capacity(d);
    let mut errors = Vec::with_capacity(d);
    for i in 0..d {
        let conditional = est.moments[i] / prob;
        values.push(mean[i] + std.scales[i] * conditional);
        errors.push(std.scales[i] * ratio_error(est.moments[i], est.moment_errors[i], &est));
    }

    Ok(MvnExpectation {
        values,
        errors,
        converged,
        attempts,
    })
}

fn make_rng(opts: &MvnOptions) -> StdRng {
    match opts.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn within_tolerance(error: f64, value: f64, opts: &MvnOptions) -> bool {
    error <= opts.abs_eps || error <= opts.rel_eps * value.abs()
}

/// First-order error of the ratio `m / p`: the numerator error plus the
/// probability error scaled by the ratio itself, since both estimates come
/// from the same integration pass.
fn ratio_error(m: f64, m_err: f64, est: &QmcEstimate) -> f64 {
    let prob = est.probability.max(f64::MIN_POSITIVE);
    (m_err + (m / prob).abs() * est.prob_error) / prob
}

fn expectation_converged(est: &QmcEstimate, opts: &MvnOptions) -> bool {
    let prob = est.probability.max(f64::MIN_POSITIVE);
    est.moment_errors
        .iter()
        .zip(est.moments.iter())
        .all(|(&err, &m)| within_tolerance(ratio_error(m, err, est), m / prob, opts))
}

/// Convert to correlation form: unit-diagonal covariance, bounds scaled by
/// the marginal standard deviations. Dimension mismatches are fatal here,
/// before any integration work.
fn standardize(
    mean: &[f64],
    covariance: &DMatrix<f64>,
    lower: &[f64],
    upper: &[f64],
) -> EstResult<Standardized> {
    let d = mean.len();
    if covariance.nrows() != d || covariance.ncols() != d {
        return Err(DataError::DimensionMismatch {
            expected: d,
            actual: covariance.nrows().max(covariance.ncols()),
        }
        .into());
    }
    for bounds in [lower, upper] {
        if bounds.len() != d {
            return Err(DataError::DimensionMismatch {
                expected: d,
                actual: bounds.len(),
            }
            .into());
        }
    }
    if d == 0 {
        return Err(DataError::EmptyData.into());
    }

    let mut scales = Vec::with_capacity(d);
    for i in 0..d {
        let v = covariance[(i, i)];
        if !(v > 0.0) || !v.is_finite() {
            return Err(DataError::invalid("covariance diagonal", v, "must be finite and > 0").into());
        }
        scales.push(v.sqrt());
    }

    let mut correlation = DMatrix::zeros(d, d);
    for i in 0..d {
        for j in 0..d {
            correlation[(i, j)] = covariance[(i, j)] / (scales[i] * scales[j]);
        }
    }

    let chol = cholesky_with_jitter(&correlation).ok_or_else(|| {
        EstimationError::Numerical("covariance is not positive definite".into())
    })?;

    let scale_bound = |b: f64, i: usize, m: f64| {
        if b.is_infinite() {
            b
        } else {
            (b - m) / scales[i]
        }
    };
    let lower_std: Vec<f64> = lower
        .iter()
        .enumerate()
        .map(|(i, &b)| scale_bound(b, i, mean[i]))
        .collect();
    let upper_std: Vec<f64> = upper
        .iter()
        .enumerate()
        .map(|(i, &b)| scale_bound(b, i, mean[i]))
        .collect();

    Ok(Standardized {
        chol,
        scales,
        lower: lower_std,
        upper: upper_std,
    })
}

/// Cholesky with escalating diagonal jitter for nearly-singular
/// correlation matrices
fn cholesky_with_jitter(matrix: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    if let Some(chol) = nalgebra::Cholesky::new(matrix.clone()) {
        return Some(chol.l());
    }
    let d = matrix.nrows();
    let mut jitter = 1e-10;
    while jitter <= 1e-4 {
        let jittered = matrix + DMatrix::identity(d, d) * jitter;
        if let Some(chol) = nalgebra::Cholesky::new(jittered) {
            return Some(chol.l());
        }
        jitter *= 100.0;
    }
    None
}
