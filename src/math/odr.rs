//! Errors-in-variables straight-line fit (orthogonal distance regression).
//!
//! For the model `y = b x + c` with per-point uncertainties `σx`, `σy`, weighted orthogonal
//! distance regression minimises
//!
//! ```text
//! Σ [ (y_i - b (x_i + δ_i) - c)^2 / σy_i^2 + δ_i^2 / σx_i^2 ]
//! ```
//!
//! over `b`, `c` and the x-corrections `δ_i`. For a straight line the optimal `δ_i` has a
//! closed form, which leaves the two-parameter objective
//!
//! ```text
//! S(b, c) = Σ (y_i - b x_i - c)^2 / (σy_i^2 + b^2 σx_i^2)
//! ```
//!
//! minimised here with Levenberg–Marquardt. The solver must be started from a sensible
//! line (the OLS fit); it is not a global optimiser.

use nalgebra::{Matrix2, Vector2};

/// Lower bound on the per-point effective variance.
const VARIANCE_FLOOR: f64 = 1e-18;
const MAX_ITERATIONS: usize = 200;
const MAX_LAMBDA: f64 = 1e16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OdrLine {
    pub slope: f64,
    pub intercept: f64,
    pub slope_sd: f64,
    pub intercept_sd: f64,
    /// Residual variance `S / (n - 2)`; NaN when there are no spare degrees of freedom.
    pub res_var: f64,
    pub iterations: usize,
}

impl OdrLine {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

struct Problem<'a> {
    x: &'a [f64],
    y: &'a [f64],
    var_x: Vec<f64>,
    var_y: Vec<f64>,
}

impl Problem<'_> {
    fn cost(&self, p: &Vector2<f64>) -> f64 {
        let (b, c) = (p[0], p[1]);
        (0..self.x.len())
            .map(|i| {
                let e = self.y[i] - b * self.x[i] - c;
                e * e / self.effective_variance(i, b)
            })
            .sum()
    }

    fn effective_variance(&self, i: usize, b: f64) -> f64 {
        (self.var_y[i] + b * b * self.var_x[i]).max(VARIANCE_FLOOR)
    }

    /// Gauss–Newton normal matrix `JᵀJ` and gradient term `Jᵀr` of the weighted residuals.
    fn normal_equations(&self, p: &Vector2<f64>) -> (Matrix2<f64>, Vector2<f64>) {
        let (b, c) = (p[0], p[1]);
        let mut jtj = Matrix2::zeros();
        let mut jtr = Vector2::zeros();
        for i in 0..self.x.len() {
            let v = self.effective_variance(i, b);
            let s = v.sqrt();
            let e = self.y[i] - b * self.x[i] - c;
            let r = e / s;
            let d_b = -self.x[i] / s - e * b * self.var_x[i] / (v * s);
            let d_c = -1.0 / s;
            let j = Vector2::new(d_b, d_c);
            jtj += j * j.transpose();
            jtr += j * r;
        }
        (jtj, jtr)
    }
}

fn sanitize_variance(sigma: f64) -> f64 {
    if sigma.is_finite() { sigma * sigma } else { 0.0 }
}

/// Fit `y = slope * x + intercept` accounting for uncertainty in both coordinates.
///
/// `start` is the `(slope, intercept)` initial guess. Returns `None` for mismatched or
/// too-short inputs and when the solution is not finite.
pub fn orthogonal_distance_regression(
    x: &[f64],
    y: &[f64],
    sigma_x: &[f64],
    sigma_y: &[f64],
    start: (f64, f64),
) -> Option<OdrLine> {
    let n = x.len();
    if n < 2 || y.len() != n || sigma_x.len() != n || sigma_y.len() != n {
        return None;
    }
    if !(start.0.is_finite() && start.1.is_finite()) {
        return None;
    }

    let problem = Problem {
        x,
        y,
        var_x: sigma_x.iter().map(|&s| sanitize_variance(s)).collect(),
        var_y: sigma_y.iter().map(|&s| sanitize_variance(s)).collect(),
    };

    let mut p = Vector2::new(start.0, start.1);
    let mut cost = problem.cost(&p);
    if !cost.is_finite() {
        return None;
    }
    let mut lambda = 1e-3;
    let mut iterations = 0;

    'outer: while iterations < MAX_ITERATIONS {
        iterations += 1;
        let (jtj, jtr) = problem.normal_equations(&p);

        loop {
            let mut damped = jtj;
            for k in 0..2 {
                let d = if jtj[(k, k)] > 0.0 { jtj[(k, k)] } else { 1.0 };
                damped[(k, k)] += lambda * d;
            }
            let Some(step) = damped.lu().solve(&(-jtr)) else {
                lambda *= 10.0;
                if lambda > MAX_LAMBDA {
                    break 'outer;
                }
                continue;
            };

            let candidate = p + step;
            let candidate_cost = problem.cost(&candidate);
            if candidate_cost.is_finite() && candidate_cost <= cost {
                let small_step = step
                    .iter()
                    .zip(p.iter())
                    .all(|(s, v)| s.abs() <= 1e-12 * (v.abs() + 1e-12));
                let small_gain = cost - candidate_cost <= 1e-15 * cost.max(f64::MIN_POSITIVE);
                p = candidate;
                cost = candidate_cost;
                lambda = (lambda / 10.0).max(1e-12);
                if small_step || small_gain {
                    break 'outer;
                }
                break;
            }

            lambda *= 10.0;
            if lambda > MAX_LAMBDA {
                // No downhill step left: `p` is a minimum to working precision.
                break 'outer;
            }
        }
    }

    let res_var = if n > 2 { cost / (n - 2) as f64 } else { f64::NAN };
    let (jtj, _) = problem.normal_equations(&p);
    let (slope_sd, intercept_sd) = match jtj.try_inverse() {
        Some(cov) => (
            (cov[(0, 0)] * res_var).abs().sqrt(),
            (cov[(1, 1)] * res_var).abs().sqrt(),
        ),
        None => (f64::NAN, f64::NAN),
    };

    if !(p[0].is_finite() && p[1].is_finite()) {
        return None;
    }

    Some(OdrLine {
        slope: p[0],
        intercept: p[1],
        slope_sd,
        intercept_sd,
        res_var,
        iterations,
    })
}
