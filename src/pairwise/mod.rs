//! Maximum-likelihood utilities from pairwise win counts
//!
//! Fits per-item utilities `theta` to a win tally under a logit link
//! (Bradley-Terry: `P(i beats j) = sigma(theta_i - theta_j)`) or a probit
//! link (`P(i beats j) = Phi(theta_i - theta_j)`). Item 0 is the scale
//! anchor with `theta_0 == 0`; the optimizer works on the remaining free
//! coordinates. Conjugate gradient is the primary solver with a
//! derivative-free direction-set fallback, and non-convergence is reported
//! in the result rather than raised.

pub mod mm;
pub mod optimizer;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::data::{PairwiseTally, ScoredItems};
use crate::distributions::NormalKernel;
use crate::error::{DataError, EstResult};

pub use mm::{fit_plackett_luce, PlackettLuceConfig, PlackettLuceFit};
pub use optimizer::{conjugate_gradient, powell, CgOptions, OptimOutcome, PowellOptions};

/// Link function for the pairwise win probability
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Link {
    /// `P(i beats j) = sigma(theta_i - theta_j)` (Bradley-Terry)
    #[default]
    Logit,
    /// `P(i beats j) = Phi(theta_i - theta_j)` (Thurstone-Mosteller)
    Probit,
}

/// Which solver produced the accepted parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveMethod {
    ConjugateGradient,
    DirectionSet,
}

/// Configuration for [`fit_pairwise`]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PairwiseConfig {
    pub link: Link,
    /// Normal kernel for the probit link
    pub kernel: NormalKernel,
    pub cg: CgOptions,
    /// Fallback options, applied when the gradient path stalls
    pub fallback: PowellOptions,
}

impl Default for PairwiseConfig {
    fn default() -> Self {
        Self {
            link: Link::Logit,
            kernel: NormalKernel::Precise,
            cg: CgOptions::default(),
            fallback: PowellOptions {
                max_iter: 1000,
                f_tol: 1e-9,
                ..PowellOptions::default()
            },
        }
    }
}

/// Fitted pairwise utilities
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PairwiseFit {
    /// Per-item utilities, `utilities[0] == 0` by the anchor
    pub utilities: Vec<f64>,
    pub link: Link,
    pub method: SolveMethod,
    pub log_likelihood: f64,
    pub iterations: usize,
    pub converged: bool,
    /// Asymptotic standard errors from the observed information; `None`
    /// when the information matrix is singular at the optimum. The anchor
    /// entry is zero by construction.
    pub standard_errors: Option<Vec<f64>>,
}

impl PairwiseFit {
    /// View the utilities as item scores
    pub fn scores(&self) -> ScoredItems {
        ScoredItems::from_scores(self.utilities.clone())
    }
}

/// Fit utilities to a win tally by maximum likelihood.
pub fn fit_pairwise(tally: &PairwiseTally, config: &PairwiseConfig) -> EstResult<PairwiseFit> {
    if tally.total() == 0 {
        return Err(DataError::EmptyData.into());
    }
    let n = tally.items();
    let link = config.link;
    let kernel = config.kernel;

    let objective = |free: &[f64]| nll(tally, link, kernel, &with_anchor(free));
    let gradient = |free: &[f64]| {
        let full = nll_gradient(tally, link, kernel, &with_anchor(free));
        full[1..].to_vec()
    };

    let cg = conjugate_gradient(objective, gradient, vec![0.0; n - 1], &config.cg);
    let (outcome, method) = if cg.converged {
        (cg, SolveMethod::ConjugateGradient)
    } else {
        // Resume from the best gradient point with the direction-set search
        let fallback = powell(objective, cg.x, &config.fallback);
        (fallback, SolveMethod::DirectionSet)
    };

    let utilities = with_anchor(&outcome.x);
    let standard_errors = standard_errors(tally, link, kernel, &utilities);

    Ok(PairwiseFit {
        utilities,
        link,
        method,
        log_likelihood: -outcome.value,
        iterations: outcome.iterations,
        converged: outcome.converged,
        standard_errors,
    })
}

/// Negative log-likelihood of a full utility vector
fn nll(tally: &PairwiseTally, link: Link, kernel: NormalKernel, theta: &[f64]) -> f64 {
    let n = tally.items();
    let mut total = 0.0;
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let w = tally.wins(i, j) as f64;
            if w == 0.0 {
                continue;
            }
            let d = theta[i] - theta[j];
            total += w * match link {
                // -ln sigma(d) = softplus(-d)
                Link::Logit => softplus(-d),
                Link::Probit => -kernel.log_cdf(d),
            };
        }
    }
    total
}

/// Gradient of the negative log-likelihood over the full utility vector
fn nll_gradient(tally: &PairwiseTally, link: Link, kernel: NormalKernel, theta: &[f64]) -> Vec<f64> {
    let n = tally.items();
    let mut grad = vec![0.0; n];
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let w = tally.wins(i, j) as f64;
            if w == 0.0 {
                continue;
            }
            let d = theta[i] - theta[j];
            // d/dd of the per-pair loss
            let slope = match link {
                Link::Logit => -sigmoid(-d),
                Link::Probit => -kernel.inverse_mills(d),
            };
            grad[i] += w * slope;
            grad[j] -= w * slope;
        }
    }
    grad
}

/// Observed-information Hessian over the full utility vector
fn nll_hessian(
    tally: &PairwiseTally,
    link: Link,
    kernel: NormalKernel,
    theta: &[f64],
) -> DMatrix<f64> {
    let n = tally.items();
    let mut hess = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let w = tally.wins(i, j) as f64;
            if w == 0.0 {
                continue;
            }
            let d = theta[i] - theta[j];
            let curvature = match link {
                Link::Logit => {
                    let s = sigmoid(d);
                    s * (1.0 - s)
                }
                Link::Probit => {
                    // -d^2/dd^2 ln Phi(d) = lambda(d) (lambda(d) + d)
                    let lambda = kernel.inverse_mills(d);
                    lambda * (lambda + d)
                }
            };
            let c = w * curvature;
            hess[(i, i)] += c;
            hess[(j, j)] += c;
            hess[(i, j)] -= c;
            hess[(j, i)] -= c;
        }
    }
    hess
}

/// Standard errors of the free utilities from the inverse observed
/// information, with zero at the anchor
fn standard_errors(
    tally: &PairwiseTally,
    link: Link,
    kernel: NormalKernel,
    theta: &[f64],
) -> Option<Vec<f64>> {
    let n = tally.items();
    let full = nll_hessian(tally, link, kernel, theta);
    // Drop the anchored coordinate before inverting
    let free = full.view((1, 1), (n - 1, n - 1)).into_owned();
    let inverse = nalgebra::Cholesky::new(free)?.inverse();
    let mut se = Vec::with_capacity(n);
    se.push(0.0);
    for k in 0..n - 1 {
        let v = inverse[(k, k)];
        if !(v >= 0.0) {
            return None;
        }
        se.push(v.sqrt());
    }
    Some(se)
}

fn with_anchor(free: &[f64]) -> Vec<f64> {
    let mut theta = Vec::with_capacity(free.len() + 1);
    theta.push(0.0);
    theta.extend_from_slice(free);
    theta
}

#[inline]
fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Numerically stable `ln(1 + e^x)`
#[inline]
fn softplus(x: f64) -> f64 {
    if x > 0.0 {
        x + (-x).exp().ln_1p()
    } else {
        x.exp().ln_1p()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Ranking, RankingProfile};
    use approx::assert_abs_diff_eq;

    fn two_item_tally(wins: u64, losses: u64) -> PairwiseTally {
        let mut tally = PairwiseTally::new(2).unwrap();
        tally.record(0, 1, wins);
        tally.record(1, 0, losses);
        tally
    }

    #[test]
    fn test_logit_recovers_log_odds() {
        // 800/200: sigma(-theta_1) = 0.8, so theta_1 = -ln 4
        let tally = two_item_tally(800, 200);
        let fit = fit_pairwise(&tally, &PairwiseConfig::default()).unwrap();
        assert!(fit.converged);
        assert_abs_diff_eq!(fit.utilities[1], -(4.0f64).ln(), epsilon = 1e-3);
        assert_eq!(fit.utilities[0], 0.0);
    }

    #[test]
    fn test_probit_recovers_quantile() {
        // 800/200: Phi(-theta_1) = 0.8, so theta_1 = -invPhi(0.8)
        let tally = two_item_tally(800, 200);
        let config = PairwiseConfig {
            link: Link::Probit,
            ..PairwiseConfig::default()
        };
        let fit = fit_pairwise(&tally, &config).unwrap();
        assert!(fit.converged);
        let expected = -NormalKernel::Precise.quantile(0.8);
        assert_abs_diff_eq!(fit.utilities[1], expected, epsilon = 1e-3);
    }

    #[test]
    fn test_logit_matches_plackett_luce_on_pairs() {
        // For two items Bradley-Terry and Plackett-Luce coincide:
        // theta_1 - theta_0 = ln(gamma_1 / gamma_0)
        let mut profile = RankingProfile::new(2).unwrap();
        profile
            .push_many(Ranking::new(vec![0, 1]).unwrap(), 70)
            .unwrap();
        profile
            .push_many(Ranking::new(vec![1, 0]).unwrap(), 30)
            .unwrap();

        let tally = PairwiseTally::from_profile(&profile).unwrap();
        let fit = fit_pairwise(&tally, &PairwiseConfig::default()).unwrap();
        let pl = fit_plackett_luce(&profile, &PlackettLuceConfig::default()).unwrap();

        let pl_diff = (pl.strengths[1] / pl.strengths[0]).ln();
        assert_abs_diff_eq!(fit.utilities[1], pl_diff, epsilon = 1e-4);
    }

    #[test]
    fn test_three_item_transitive_order() {
        let mut tally = PairwiseTally::new(3).unwrap();
        tally.record(0, 1, 60);
        tally.record(1, 0, 40);
        tally.record(1, 2, 60);
        tally.record(2, 1, 40);
        tally.record(0, 2, 70);
        tally.record(2, 0, 30);

        for link in [Link::Logit, Link::Probit] {
            let config = PairwiseConfig {
                link,
                ..PairwiseConfig::default()
            };
            let fit = fit_pairwise(&tally, &config).unwrap();
            assert_eq!(fit.scores().ranking(), vec![0, 1, 2]);
        }
    }

    #[test]
    fn test_standard_errors_shrink_with_data() {
        let small = fit_pairwise(&two_item_tally(8, 2), &PairwiseConfig::default()).unwrap();
        let large = fit_pairwise(&two_item_tally(800, 200), &PairwiseConfig::default()).unwrap();
        let se_small = small.standard_errors.unwrap();
        let se_large = large.standard_errors.unwrap();
        assert_eq!(se_small[0], 0.0);
        assert!(se_small[1] > se_large[1]);
    }

    #[test]
    fn test_empty_tally_rejected() {
        let tally = PairwiseTally::new(3).unwrap();
        let err = fit_pairwise(&tally, &PairwiseConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            crate::error::EstimationError::Data(DataError::EmptyData)
        ));
    }

    #[test]
    fn test_one_sided_tally_returns_without_panic() {
        // A never-winning item pushes its utility toward -inf; the fit
        // must still return a finite point with an honest flag
        let tally = two_item_tally(50, 0);
        let fit = fit_pairwise(&tally, &PairwiseConfig::default()).unwrap();
        assert!(fit.utilities[1].is_finite());
        assert!(fit.log_likelihood.is_finite());
    }

    #[test]
    fn test_softplus_stable() {
        assert_abs_diff_eq!(softplus(0.0), (2.0f64).ln(), epsilon = 1e-12);
        assert_abs_diff_eq!(softplus(800.0), 800.0, epsilon = 1e-9);
        assert!(softplus(-800.0) >= 0.0);
        assert!(softplus(-800.0) < 1e-300);
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let tally = two_item_tally(30, 10);
        for link in [Link::Logit, Link::Probit] {
            let theta = [0.0, -0.7];
            let grad = nll_gradient(&tally, link, NormalKernel::Precise, &theta);
            let h = 1e-6;
            let plus = nll(&tally, link, NormalKernel::Precise, &[0.0, -0.7 + h]);
            let minus = nll(&tally, link, NormalKernel::Precise, &[0.0, -0.7 - h]);
            assert_abs_diff_eq!(grad[1], (plus - minus) / (2.0 * h), epsilon = 1e-4);
        }
    }
}
