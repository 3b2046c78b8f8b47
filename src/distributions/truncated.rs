//! One-dimensional truncated normal distribution

use rand::Rng;

use crate::distributions::normal::{self, NormalKernel};
use crate::error::DataError;

/// A normal distribution conditioned on an interval `(lower, upper)`.
///
/// Either bound may be infinite. Moments use the standard truncated-normal
/// identities in terms of the standard normal density and CDF at the
/// standardized bounds; sampling is by inverse-transform of a uniform draw
/// on `[Phi(alpha), Phi(beta)]`.
#[derive(Clone, Debug)]
pub struct TruncatedNormal {
    mu: f64,
    sigma: f64,
    lower: f64,
    upper: f64,
    kernel: NormalKernel,
    /// Standardized bounds
    alpha: f64,
    beta: f64,
    /// CDF values at the standardized bounds
    cdf_alpha: f64,
    cdf_beta: f64,
}

impl TruncatedNormal {
    /// Create a truncated normal; rejects `sigma <= 0`, non-finite
    /// location/scale and `lower >= upper`.
    pub fn new(
        mu: f64,
        sigma: f64,
        lower: f64,
        upper: f64,
        kernel: NormalKernel,
    ) -> Result<Self, DataError> {
        if !mu.is_finite() {
            return Err(DataError::invalid("mu", mu, "must be finite"));
        }
        if !(sigma > 0.0) || !sigma.is_finite() {
            return Err(DataError::invalid("sigma", sigma, "must be finite and > 0"));
        }
        if !(lower < upper) {
            return Err(DataError::invalid(
                "lower",
                lower,
                "must be strictly below upper",
            ));
        }
        let alpha = (lower - mu) / sigma;
        let beta = (upper - mu) / sigma;
        Ok(Self {
            mu,
            sigma,
            lower,
            upper,
            kernel,
            alpha,
            beta,
            cdf_alpha: kernel.cdf(alpha),
            cdf_beta: kernel.cdf(beta),
        })
    }

    /// Probability mass of the parent normal inside the interval
    fn mass(&self) -> f64 {
        (self.cdf_beta - self.cdf_alpha).max(f64::MIN_POSITIVE)
    }

    /// Density at `x` (zero outside the interval)
    pub fn density(&self, x: f64) -> f64 {
        if x < self.lower || x > self.upper {
            return 0.0;
        }
        normal::pdf((x - self.mu) / self.sigma) / (self.sigma * self.mass())
    }

    /// CDF at `x`
    pub fn cdf(&self, x: f64) -> f64 {
        if x <= self.lower {
            0.0
        } else if x >= self.upper {
            1.0
        } else {
            let z = (x - self.mu) / self.sigma;
            ((self.kernel.cdf(z) - self.cdf_alpha) / self.mass()).clamp(0.0, 1.0)
        }
    }

    /// Closed-form mean: `mu + sigma (phi(alpha) - phi(beta)) / Z`
    pub fn mean(&self) -> f64 {
        let z = self.mass();
        self.mu + self.sigma * (pdf_or_zero(self.alpha) - pdf_or_zero(self.beta)) / z
    }

    /// Closed-form variance:
    /// `sigma^2 [1 + (alpha phi(alpha) - beta phi(beta))/Z - ((phi(alpha) - phi(beta))/Z)^2]`
    pub fn variance(&self) -> f64 {
        let z = self.mass();
        let pa = pdf_or_zero(self.alpha);
        let pb = pdf_or_zero(self.beta);
        let first = (weighted_pdf(self.alpha) - weighted_pdf(self.beta)) / z;
        let second = (pa - pb) / z;
        self.sigma * self.sigma * (1.0 + first - second * second)
    }

    /// Inverse-transform sample: uniform on `[Phi(alpha), Phi(beta)]`
    /// pushed through the normal quantile. The result is clamped into the
    /// closed interval to absorb quantile-approximation overshoot.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u: f64 = rng.gen();
        let p = self.cdf_alpha + u * (self.cdf_beta - self.cdf_alpha);
        let x = self.mu + self.sigma * self.kernel.quantile(p);
        x.clamp(self.lower, self.upper)
    }
}

/// phi(x) with the convention phi(+-inf) = 0
#[inline]
fn pdf_or_zero(x: f64) -> f64 {
    if x.is_infinite() {
        0.0
    } else {
        normal::pdf(x)
    }
}

/// x * phi(x) with the convention that it vanishes at +-inf
#[inline]
fn weighted_pdf(x: f64) -> f64 {
    if x.is_infinite() {
        0.0
    } else {
        x * normal::pdf(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_rejects_degenerate_inputs() {
        assert!(TruncatedNormal::new(0.0, 0.0, -1.0, 1.0, NormalKernel::Precise).is_err());
        assert!(TruncatedNormal::new(0.0, -2.0, -1.0, 1.0, NormalKernel::Precise).is_err());
        assert!(TruncatedNormal::new(0.0, 1.0, 1.0, 1.0, NormalKernel::Precise).is_err());
        assert!(TruncatedNormal::new(0.0, 1.0, 2.0, -2.0, NormalKernel::Precise).is_err());
        assert!(TruncatedNormal::new(f64::NAN, 1.0, -1.0, 1.0, NormalKernel::Precise).is_err());
    }

    #[test]
    fn test_untruncated_limits_recover_parent_moments() {
        let tn = TruncatedNormal::new(
            1.5,
            2.0,
            f64::NEG_INFINITY,
            f64::INFINITY,
            NormalKernel::Precise,
        )
        .unwrap();
        assert_abs_diff_eq!(tn.mean(), 1.5, epsilon = 1e-10);
        assert_abs_diff_eq!(tn.variance(), 4.0, epsilon = 1e-10);
    }

    #[test]
    fn test_half_normal_moments() {
        // Standard normal truncated to (0, inf): mean = sqrt(2/pi),
        // variance = 1 - 2/pi
        let tn =
            TruncatedNormal::new(0.0, 1.0, 0.0, f64::INFINITY, NormalKernel::Precise).unwrap();
        let two_over_pi = 2.0 / std::f64::consts::PI;
        assert_abs_diff_eq!(tn.mean(), two_over_pi.sqrt(), epsilon = 1e-10);
        assert_abs_diff_eq!(tn.variance(), 1.0 - two_over_pi, epsilon = 1e-10);
    }

    #[test]
    fn test_cdf_endpoints_and_median() {
        let tn = TruncatedNormal::new(0.0, 1.0, -1.0, 1.0, NormalKernel::Precise).unwrap();
        assert_eq!(tn.cdf(-1.5), 0.0);
        assert_eq!(tn.cdf(1.5), 1.0);
        // Symmetric interval around the mode: median at the center
        assert_abs_diff_eq!(tn.cdf(0.0), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_density_integrates_to_one() {
        let tn = TruncatedNormal::new(0.3, 0.7, -0.5, 1.2, NormalKernel::Precise).unwrap();
        let steps = 20_000;
        let h = 1.7 / steps as f64;
        let mut sum = 0.0;
        for i in 0..steps {
            let x = -0.5 + (i as f64 + 0.5) * h;
            sum += tn.density(x) * h;
        }
        assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_samples_respect_bounds_and_moments() {
        let tn = TruncatedNormal::new(0.5, 1.0, -0.25, 2.0, NormalKernel::Quick).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let n = 200_000;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        for _ in 0..n {
            let x = tn.sample(&mut rng);
            assert!((-0.25..=2.0).contains(&x));
            sum += x;
            sum_sq += x * x;
        }
        let mean = sum / n as f64;
        let var = sum_sq / n as f64 - mean * mean;
        assert_abs_diff_eq!(mean, tn.mean(), epsilon = 5e-3);
        assert_abs_diff_eq!(var, tn.variance(), epsilon = 5e-3);
    }
}
