//! Unconstrained smooth minimization for the pairwise likelihoods
//!
//! Two routines with one outcome type: nonlinear conjugate gradient
//! (Polak-Ribiere with restarts, Armijo backtracking) as the primary
//! solver, and a derivative-free Powell direction-set search as the
//! fallback when the gradient path stalls. Neither raises on
//! non-convergence; the outcome carries a flag instead.

use serde::{Deserialize, Serialize};

/// Termination state of a minimization run
#[derive(Clone, Debug, PartialEq)]
pub struct OptimOutcome {
    /// Best point found
    pub x: Vec<f64>,
    /// Objective value at `x`
    pub value: f64,
    /// Outer iterations performed
    pub iterations: usize,
    /// Whether the tolerance was met
    pub converged: bool,
}

/// Tuning for [`conjugate_gradient`]
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CgOptions {
    pub max_iter: usize,
    /// Infinity-norm gradient tolerance
    pub grad_tol: f64,
    pub max_backtracks: usize,
}

impl Default for CgOptions {
    fn default() -> Self {
        Self {
            max_iter: 200,
            grad_tol: 1e-7,
            max_backtracks: 60,
        }
    }
}

/// Tuning for [`powell`]
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PowellOptions {
    pub max_iter: usize,
    /// Relative decrease tolerance across a full direction sweep
    pub f_tol: f64,
    /// Line-minimization interval tolerance
    pub line_tol: f64,
    pub initial_step: f64,
}

impl Default for PowellOptions {
    fn default() -> Self {
        Self {
            max_iter: 500,
            f_tol: 1e-10,
            line_tol: 1e-8,
            initial_step: 1.0,
        }
    }
}

const ARMIJO_C1: f64 = 1e-4;
const GOLDEN: f64 = 1.618_033_988_749_895;
const INV_GOLDEN: f64 = 0.618_033_988_749_895;

/// Polak-Ribiere conjugate gradient with nonnegative beta and Armijo
/// backtracking. Restarts along steepest descent whenever the conjugate
/// direction stops being a descent direction.
pub fn conjugate_gradient<F, G>(f: F, grad: G, x0: Vec<f64>, opts: &CgOptions) -> OptimOutcome
where
    F: Fn(&[f64]) -> f64,
    G: Fn(&[f64]) -> Vec<f64>,
{
    let mut x = x0;
    let mut fx = f(&x);
    let mut g = grad(&x);
    let mut d: Vec<f64> = g.iter().map(|v| -v).collect();

    for iter in 0..opts.max_iter {
        if inf_norm(&g) < opts.grad_tol {
            return OptimOutcome {
                x,
                value: fx,
                iterations: iter,
                converged: true,
            };
        }

        let mut slope = dot(&g, &d);
        if slope >= 0.0 {
            // Conjugacy lost; restart from steepest descent
            d = g.iter().map(|v| -v).collect();
            slope = -dot(&g, &g);
        }

        let mut step = 1.0;
        let mut accepted = false;
        for _ in 0..opts.max_backtracks {
            let trial: Vec<f64> = x.iter().zip(d.iter()).map(|(xi, di)| xi + step * di).collect();
            let ft = f(&trial);
            if ft <= fx + ARMIJO_C1 * step * slope {
                x = trial;
                fx = ft;
                accepted = true;
                break;
            }
            step *= 0.5;
        }
        if !accepted {
            // No acceptable step even along steepest descent
            return OptimOutcome {
                x,
                value: fx,
                iterations: iter,
                converged: false,
            };
        }

        let g_new = grad(&x);
        let beta = ((dot(&g_new, &g_new) - dot(&g_new, &g)) / dot(&g, &g)).max(0.0);
        for i in 0..d.len() {
            d[i] = -g_new[i] + beta * d[i];
        }
        g = g_new;
    }

    let converged = inf_norm(&g) < opts.grad_tol;
    OptimOutcome {
        x,
        value: fx,
        iterations: opts.max_iter,
        converged,
    }
}

/// Powell's direction-set method with the extrapolation replacement rule.
/// Derivative-free; each sweep line-minimizes along every direction by
/// bracketing plus golden-section search.
pub fn powell<F>(f: F, x0: Vec<f64>, opts: &PowellOptions) -> OptimOutcome
where
    F: Fn(&[f64]) -> f64,
{
    let n = x0.len();
    let mut x = x0;
    let mut fx = f(&x);
    let mut dirs: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            let mut e = vec![0.0; n];
            e[i] = 1.0;
            e
        })
        .collect();

    for iter in 0..opts.max_iter {
        let x_start = x.clone();
        let f_start = fx;
        let mut biggest = 0.0;
        let mut biggest_idx = 0;

        for (i, dir) in dirs.iter().enumerate() {
            let before = fx;
            let (x_new, f_new) = line_minimize(&f, &x, dir, opts);
            x = x_new;
            fx = f_new;
            if before - fx > biggest {
                biggest = before - fx;
                biggest_idx = i;
            }
        }

        if 2.0 * (f_start - fx) <= opts.f_tol * (f_start.abs() + fx.abs()) + f64::MIN_POSITIVE {
            return OptimOutcome {
                x,
                value: fx,
                iterations: iter + 1,
                converged: true,
            };
        }

        // Try the extrapolated point; adopt the sweep displacement as a
        // new direction when it keeps paying off
        let extrap: Vec<f64> = x
            .iter()
            .zip(x_start.iter())
            .map(|(a, b)| 2.0 * a - b)
            .collect();
        let f_extrap = f(&extrap);
        if f_extrap < f_start {
            let t = 2.0 * (f_start - 2.0 * fx + f_extrap) * (f_start - fx - biggest).powi(2)
                - biggest * (f_start - f_extrap).powi(2);
            if t < 0.0 {
                let new_dir: Vec<f64> = x
                    .iter()
                    .zip(x_start.iter())
                    .map(|(a, b)| a - b)
                    .collect();
                let (x_new, f_new) = line_minimize(&f, &x, &new_dir, opts);
                x = x_new;
                fx = f_new;
                dirs[biggest_idx] = dirs[n - 1].clone();
                dirs[n - 1] = new_dir;
            }
        }
    }

    OptimOutcome {
        x,
        value: fx,
        iterations: opts.max_iter,
        converged: false,
    }
}

/// Minimize `t -> f(x + t * dir)`: bracket the minimum by expanding steps,
/// then golden-section to the interval tolerance.
fn line_minimize<F>(f: &F, x: &[f64], dir: &[f64], opts: &PowellOptions) -> (Vec<f64>, f64)
where
    F: Fn(&[f64]) -> f64,
{
    let along = |t: f64| -> f64 {
        let point: Vec<f64> = x.iter().zip(dir.iter()).map(|(xi, di)| xi + t * di).collect();
        f(&point)
    };

    let (mut lo, mut hi) = match bracket(&along, opts.initial_step) {
        Some(interval) => interval,
        None => return (x.to_vec(), along(0.0)),
    };

    // Golden-section shrink
    let mut a = hi - INV_GOLDEN * (hi - lo);
    let mut b = lo + INV_GOLDEN * (hi - lo);
    let mut fa = along(a);
    let mut fb = along(b);
    while hi - lo > opts.line_tol * (1.0 + lo.abs().max(hi.abs())) {
        if fa < fb {
            hi = b;
            b = a;
            fb = fa;
            a = hi - INV_GOLDEN * (hi - lo);
            fa = along(a);
        } else {
            lo = a;
            a = b;
            fa = fb;
            b = lo + INV_GOLDEN * (hi - lo);
            fb = along(b);
        }
    }

    let t = 0.5 * (lo + hi);
    let point: Vec<f64> = x.iter().zip(dir.iter()).map(|(xi, di)| xi + t * di).collect();
    let value = along(t);
    (point, value)
}

/// Find `lo < hi` with an interior point below both ends, expanding from
/// zero in whichever direction descends. `None` if the function never
/// turns back up within the expansion budget.
fn bracket<F>(f: &F, step: f64) -> Option<(f64, f64)>
where
    F: Fn(f64) -> f64,
{
    let f0 = f(0.0);
    let mut s = step;
    if f(s) > f0 {
        s = -s;
        if f(s) > f0 {
            // Minimum is between -step and step
            return Some((-step, step));
        }
    }

    let mut t_prev = 0.0;
    let mut t = s;
    let mut ft = f(t);
    for _ in 0..60 {
        let t_next = t + GOLDEN * (t - t_prev);
        let f_next = f(t_next);
        if f_next >= ft {
            return if t_prev <= t_next {
                Some((t_prev, t_next))
            } else {
                Some((t_next, t_prev))
            };
        }
        t_prev = t;
        t = t_next;
        ft = f_next;
    }
    None
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn inf_norm(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |acc, x| acc.max(x.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn quadratic(x: &[f64]) -> f64 {
        // Minimum at (1, -2), mildly anisotropic
        (x[0] - 1.0).powi(2) + 4.0 * (x[1] + 2.0).powi(2)
    }

    fn quadratic_grad(x: &[f64]) -> Vec<f64> {
        vec![2.0 * (x[0] - 1.0), 8.0 * (x[1] + 2.0)]
    }

    fn rosenbrock(x: &[f64]) -> f64 {
        100.0 * (x[1] - x[0] * x[0]).powi(2) + (1.0 - x[0]).powi(2)
    }

    fn rosenbrock_grad(x: &[f64]) -> Vec<f64> {
        vec![
            -400.0 * x[0] * (x[1] - x[0] * x[0]) - 2.0 * (1.0 - x[0]),
            200.0 * (x[1] - x[0] * x[0]),
        ]
    }

    #[test]
    fn test_cg_quadratic() {
        let out = conjugate_gradient(
            quadratic,
            quadratic_grad,
            vec![5.0, 5.0],
            &CgOptions::default(),
        );
        assert!(out.converged);
        assert_abs_diff_eq!(out.x[0], 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(out.x[1], -2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_cg_rosenbrock() {
        let opts = CgOptions {
            max_iter: 5000,
            grad_tol: 1e-6,
            ..CgOptions::default()
        };
        let out = conjugate_gradient(rosenbrock, rosenbrock_grad, vec![-1.2, 1.0], &opts);
        assert!(out.converged);
        assert_abs_diff_eq!(out.x[0], 1.0, epsilon = 1e-3);
        assert_abs_diff_eq!(out.x[1], 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_cg_never_panics_on_budget_exhaustion() {
        let opts = CgOptions {
            max_iter: 2,
            grad_tol: 0.0,
            ..CgOptions::default()
        };
        let out = conjugate_gradient(rosenbrock, rosenbrock_grad, vec![-1.2, 1.0], &opts);
        assert!(!out.converged);
        assert!(out.value <= rosenbrock(&[-1.2, 1.0]));
    }

    #[test]
    fn test_powell_quadratic() {
        let out = powell(quadratic, vec![5.0, 5.0], &PowellOptions::default());
        assert!(out.converged);
        assert_abs_diff_eq!(out.x[0], 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(out.x[1], -2.0, epsilon = 1e-4);
    }

    #[test]
    fn test_powell_rosenbrock() {
        let opts = PowellOptions {
            max_iter: 2000,
            ..PowellOptions::default()
        };
        let out = powell(rosenbrock, vec![-1.2, 1.0], &opts);
        assert!(out.converged);
        assert_abs_diff_eq!(out.x[0], 1.0, epsilon = 1e-3);
        assert_abs_diff_eq!(out.x[1], 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_bracket_contains_minimum() {
        let f = |t: f64| (t - 3.0).powi(2);
        let (lo, hi) = bracket(&f, 1.0).unwrap();
        assert!(lo <= 3.0 && 3.0 <= hi);
    }
}
