//! Least squares solver and the ordinary straight-line fit built on it.
//!
//! The line `y = intercept + slope * x` is solved as a tall least-squares problem with an
//! SVD (nalgebra's `QR::solve` is intended for square systems). Summary statistics use the
//! closed-form sums of squares so they match the textbook `linregress` definitions.

use nalgebra::{DMatrix, DVector};

use crate::math::mean;

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Ordinary least squares line with its usual diagnostics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OlsLine {
    pub slope: f64,
    pub intercept: f64,
    pub slope_stderr: f64,
    pub intercept_stderr: f64,
    /// Pearson correlation coefficient.
    pub r: f64,
    pub r_squared: f64,
    pub n: usize,
}

impl OlsLine {
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Fit `y = a + b x` by ordinary least squares.
///
/// Returns `None` for fewer than two points, mismatched lengths, or a constant `x`.
/// With exactly two points the standard errors are zero (no residual degrees of freedom).
pub fn ordinary_least_squares(x: &[f64], y: &[f64]) -> Option<OlsLine> {
    let n = x.len();
    if n < 2 || y.len() != n {
        return None;
    }

    let xbar = mean(x)?;
    let ybar = mean(y)?;
    let (mut ssxm, mut ssym, mut ssxym) = (0.0, 0.0, 0.0);
    for (&xi, &yi) in x.iter().zip(y) {
        let dx = xi - xbar;
        let dy = yi - ybar;
        ssxm += dx * dx;
        ssym += dy * dy;
        ssxym += dx * dy;
    }
    if ssxm <= 0.0 || !ssxm.is_finite() {
        return None;
    }

    let design = DMatrix::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { x[i] });
    let obs = DVector::from_column_slice(y);
    let beta = solve_least_squares(&design, &obs)?;
    let (intercept, slope) = (beta[0], beta[1]);

    let r = if ssym > 0.0 {
        (ssxym / (ssxm * ssym).sqrt()).clamp(-1.0, 1.0)
    } else {
        0.0
    };

    let (slope_stderr, intercept_stderr) = if n == 2 {
        (0.0, 0.0)
    } else {
        let df = (n - 2) as f64;
        let se = ((1.0 - r * r).max(0.0) * ssym / ssxm / df).sqrt();
        (se, se * (ssxm / n as f64 + xbar * xbar).sqrt())
    };

    Some(OlsLine {
        slope,
        intercept,
        slope_stderr,
        intercept_stderr,
        r,
        r_squared: r * r,
        n,
    })
}
