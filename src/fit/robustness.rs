//! Subsampling robustness test for the OLS slope.
//!
//! The slope is refitted on `iterations` random subsamples (without replacement) of size
//! `round(f * n)`. The coefficient of variation of those slopes decides robustness.

use rand::Rng;
use rand::seq::index;

use crate::domain::RobustnessConfig;
use crate::math::{mean, ordinary_least_squares, std_dev};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobustnessReport {
    pub mean_slope: f64,
    /// Population standard deviation of the subsample slopes.
    pub std_slope: f64,
    /// `std_slope / mean_slope` (signed).
    pub cv: f64,
    pub robust: bool,
    pub valid_subsamples: usize,
    pub subsample_size: usize,
}

impl RobustnessReport {
    fn inconclusive(subsample_size: usize, valid_subsamples: usize) -> Self {
        Self {
            mean_slope: f64::NAN,
            std_slope: f64::NAN,
            cv: f64::NAN,
            robust: false,
            valid_subsamples,
            subsample_size,
        }
    }
}

/// Run the subsampling test on paired `x`/`y`.
///
/// Subsamples whose regression is degenerate are skipped. With fewer than two valid
/// subsample slopes the result is not robust and its statistics are NaN.
pub fn subsample_robustness<R: Rng + ?Sized>(
    x: &[f64],
    y: &[f64],
    config: &RobustnessConfig,
    sector_filtered: bool,
    rng: &mut R,
) -> RobustnessReport {
    let n = x.len().min(y.len());
    let fraction = config.fraction_for(sector_filtered);
    let size = ((fraction * n as f64).round() as usize).min(n);
    if size < 2 {
        return RobustnessReport::inconclusive(size, 0);
    }

    let mut slopes = Vec::with_capacity(config.iterations);
    let mut xs = Vec::with_capacity(size);
    let mut ys = Vec::with_capacity(size);
    for _ in 0..config.iterations {
        xs.clear();
        ys.clear();
        for i in index::sample(rng, n, size).iter() {
            xs.push(x[i]);
            ys.push(y[i]);
        }
        if let Some(line) = ordinary_least_squares(&xs, &ys) {
            if line.slope.is_finite() {
                slopes.push(line.slope);
            }
        }
    }

    summarize(&slopes, size, config.threshold)
}

/// Statistics and robustness verdict over subsample slopes.
fn summarize(slopes: &[f64], subsample_size: usize, threshold: f64) -> RobustnessReport {
    if slopes.len() < 2 {
        return RobustnessReport::inconclusive(subsample_size, slopes.len());
    }

    let mean_slope = mean(slopes).unwrap_or(f64::NAN);
    let std_slope = std_dev(slopes).unwrap_or(f64::NAN);
    let cv = std_slope / mean_slope;
    RobustnessReport {
        mean_slope,
        std_slope,
        cv,
        robust: cv < threshold,
        valid_subsamples: slopes.len(),
        subsample_size,
    }
}
