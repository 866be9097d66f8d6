//! CH4:CO regression of one partition.
//!
//! For each subset we fit:
//! - OLS (slope, standard errors, R²)
//! - ODR started from the OLS line (uses the per-point measurement uncertainties)
//! - a Theil–Sen line as an outlier-resistant reference
//!
//! and run the subsampling robustness test on the OLS slope.

use log::debug;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use thiserror::Error;

use crate::domain::{EngineConfig, FitRecord, Observation, PartitionDescriptor};
use crate::fit::{RobustnessReport, subsample_robustness};
use crate::math::{
    OdrLine, OlsLine, TheilSenLine, has_spread, ordinary_least_squares, orthogonal_distance_regression,
    theil_sen,
};

/// Upper bound on the number of plot-line samples.
const MAX_LINE_POINTS: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FitError {
    #[error("Need at least 2 points to fit a line, got {n}.")]
    TooFewPoints { n: usize },
    #[error("Non-finite CO/CH4 value at row {index}.")]
    NonFinite { index: usize },
    #[error("All CO values are identical; the slope is undefined.")]
    ConstantX,
    #[error("All CH4 values are identical; the correlation is undefined.")]
    ConstantY,
    #[error("{method} regression did not produce a finite line.")]
    Solver { method: &'static str },
}

/// Sampled fit lines for external plotting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitLines {
    pub x: Vec<f64>,
    pub odr: Vec<f64>,
    pub ols: Vec<f64>,
    pub theil_sen: Vec<f64>,
}

impl FitLines {
    /// Lines on the grid `min_x, min_x + step, ...` strictly below `max_x`.
    pub fn sample(min_x: f64, max_x: f64, step: f64, odr: &OdrLine, ols: &OlsLine, ts: &TheilSenLine) -> Self {
        let mut x = Vec::new();
        if step > 0.0 && min_x.is_finite() && max_x.is_finite() {
            let count = (((max_x - min_x) / step).ceil().max(0.0) as usize).min(MAX_LINE_POINTS);
            x.extend((0..count).map(|i| min_x + step * i as f64).filter(|v| *v < max_x));
        }
        Self {
            odr: x.iter().map(|v| odr.predict(*v)).collect(),
            ols: x.iter().map(|v| ols.predict(*v)).collect(),
            theil_sen: x.iter().map(|v| ts.predict(*v)).collect(),
            x,
        }
    }
}

/// Everything the engine computes for one partition.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOutcome {
    pub n: usize,
    pub ols: OlsLine,
    pub odr: OdrLine,
    pub theil_sen: TheilSenLine,
    pub robustness: RobustnessReport,
    pub lines: FitLines,
}

impl FitOutcome {
    /// Fit-table row for `descriptor`.
    ///
    /// `red_chi2` is the ODR residual variance; `r2` is the OLS coefficient of determination.
    pub fn to_record(&self, descriptor: &PartitionDescriptor) -> FitRecord {
        let key = descriptor.row_key();
        FitRecord {
            year: key.year,
            label: key.label,
            slope: self.ols.slope,
            slope_sd: self.ols.slope_stderr,
            red_chi2: self.odr.res_var,
            mean_slope_sub: self.robustness.mean_slope,
            slope_sd_sub: self.robustness.std_slope,
            r2: self.ols.r_squared,
            robust: self.robustness.robust,
        }
    }
}

/// Regression engine holding the run's settings and its subsampling generator.
///
/// One engine is created per run; with a fixed seed the sequence of subsamples (and hence
/// every robustness verdict) is reproducible.
#[derive(Debug)]
pub struct RegressionEngine {
    config: EngineConfig,
    rng: StdRng,
}

impl RegressionEngine {
    pub fn new(config: EngineConfig) -> Self {
        let rng = match config.robustness.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { config, rng }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fit CH4 (y) against CO (x) for one selected subset.
    ///
    /// `sector_filtered` selects the subsample fraction of the robustness test.
    pub fn fit(&mut self, rows: &[Observation], sector_filtered: bool) -> Result<FitOutcome, FitError> {
        let n = rows.len();
        if n < 2 {
            return Err(FitError::TooFewPoints { n });
        }
        if let Some(index) = rows.iter().position(|o| !(o.co.is_finite() && o.ch4.is_finite())) {
            return Err(FitError::NonFinite { index });
        }

        let x: Vec<f64> = rows.iter().map(|o| o.co).collect();
        let y: Vec<f64> = rows.iter().map(|o| o.ch4).collect();
        if !has_spread(&x) {
            return Err(FitError::ConstantX);
        }
        if !has_spread(&y) {
            return Err(FitError::ConstantY);
        }

        let ols = ordinary_least_squares(&x, &y).ok_or(FitError::Solver { method: "OLS" })?;

        let sx: Vec<f64> = rows.iter().map(|o| o.co_stdev).collect();
        let sy: Vec<f64> = rows.iter().map(|o| o.ch4_stdev).collect();
        let odr = orthogonal_distance_regression(&x, &y, &sx, &sy, (ols.slope, ols.intercept))
            .ok_or(FitError::Solver { method: "ODR" })?;

        let ts = theil_sen(
            &x,
            &y,
            self.config.theil_sen_max_pairs,
            self.config.theil_sen_seed,
        )
        .ok_or(FitError::Solver { method: "Theil-Sen" })?;

        let robustness = subsample_robustness(&x, &y, &self.config.robustness, sector_filtered, &mut self.rng);

        let min_x = x.iter().copied().fold(f64::INFINITY, f64::min);
        let max_x = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let lines = FitLines::sample(min_x, max_x, self.config.line_step, &odr, &ols, &ts);

        debug!(
            "n={n} ols={:.4}±{:.4} odr={:.4}±{:.4} theil-sen={:.4} cv={:.3}",
            ols.slope, ols.slope_stderr, odr.slope, odr.slope_sd, ts.slope, robustness.cv
        );

        Ok(FitOutcome {
            n,
            ols,
            odr,
            theil_sen: ts,
            robustness,
            lines,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PartitionShape, Period, PeriodMode, RobustnessConfig};
    use chrono::{Duration, NaiveDate};
    use rand_distr::{Distribution, Normal};

    fn rows_from(points: &[(f64, f64)]) -> Vec<Observation> {
        let start = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        points
            .iter()
            .enumerate()
            .map(|(i, &(co, ch4))| Observation {
                timestamp: start + Duration::hours(i as i64),
                co,
                ch4,
                co_stdev: 1.0,
                ch4_stdev: 1.0,
                wind_direction: 0.0,
                background: None,
            })
            .collect()
    }

    fn seeded(seed: u64) -> RegressionEngine {
        RegressionEngine::new(EngineConfig {
            robustness: RobustnessConfig {
                seed: Some(seed),
                ..RobustnessConfig::default()
            },
            ..EngineConfig::default()
        })
    }

    #[test]
    fn exact_line_is_recovered_by_every_estimator() {
        let points: Vec<(f64, f64)> = (0..50).map(|i| (f64::from(i), 2.0 * f64::from(i) + 1.0)).collect();
        let out = seeded(1).fit(&rows_from(&points), false).unwrap();

        assert!((out.ols.slope - 2.0).abs() < 1e-9);
        assert!((out.ols.intercept - 1.0).abs() < 1e-9);
        assert!((out.odr.slope - 2.0).abs() < 1e-6);
        assert!((out.odr.intercept - 1.0).abs() < 1e-5);
        assert!((out.theil_sen.slope - 2.0).abs() < 1e-12);
        assert!((out.ols.r_squared - 1.0).abs() < 1e-12);
        assert!(out.robustness.robust);
    }

    #[test]
    fn noisy_line_gives_consistent_slopes() {
        let mut rng = StdRng::seed_from_u64(8);
        let noise = Normal::new(0.0, 2.0).unwrap();
        let points: Vec<(f64, f64)> = (0..300)
            .map(|i| {
                let co = 100.0 + f64::from(i) * 0.5;
                (co, 1850.0 + 0.6 * co + noise.sample(&mut rng))
            })
            .collect();
        let out = seeded(2).fit(&rows_from(&points), true).unwrap();

        assert!((out.ols.slope - 0.6).abs() < 0.05);
        assert!((out.odr.slope - out.ols.slope).abs() < 0.05);
        assert!((out.theil_sen.slope - 0.6).abs() < 0.1);
        assert!(out.odr.res_var.is_finite());
        assert_eq!(out.robustness.subsample_size, 120);
    }

    #[test]
    fn fixed_seed_reproduces_the_robustness_test() {
        let mut rng = StdRng::seed_from_u64(21);
        let noise = Normal::new(0.0, 5.0).unwrap();
        let points: Vec<(f64, f64)> = (0..80)
            .map(|i| (f64::from(i), 0.3 * f64::from(i) + noise.sample(&mut rng)))
            .collect();
        let rows = rows_from(&points);
        let a = seeded(99).fit(&rows, false).unwrap();
        let b = seeded(99).fit(&rows, false).unwrap();
        assert_eq!(a.robustness, b.robustness);
    }

    #[test]
    fn degenerate_inputs_are_errors() {
        let mut engine = seeded(0);
        assert_eq!(
            engine.fit(&rows_from(&[(1.0, 2.0)]), false),
            Err(FitError::TooFewPoints { n: 1 })
        );
        assert_eq!(
            engine.fit(&rows_from(&[(1.0, 2.0), (1.0, 3.0), (1.0, 4.0)]), false),
            Err(FitError::ConstantX)
        );
        assert_eq!(
            engine.fit(&rows_from(&[(1.0, 2.0), (2.0, 2.0), (3.0, 2.0)]), false),
            Err(FitError::ConstantY)
        );
        assert_eq!(
            engine.fit(&rows_from(&[(1.0, 2.0), (f64::NAN, 2.5), (3.0, 4.0)]), false),
            Err(FitError::NonFinite { index: 1 })
        );
    }

    #[test]
    fn lines_cover_the_observed_range() {
        let points = [(100.0, 10.0), (103.5, 12.0), (102.0, 11.0)];
        let out = seeded(3).fit(&rows_from(&points), false).unwrap();
        assert_eq!(out.lines.x, vec![100.0, 101.0, 102.0, 103.0]);
        assert_eq!(out.lines.odr.len(), 4);
        assert_eq!(out.lines.theil_sen.len(), 4);
    }

    #[test]
    fn record_uses_ols_slope_and_odr_variance() {
        let points: Vec<(f64, f64)> = (0..20).map(|i| (f64::from(i), f64::from(i) * 0.5 + 3.0)).collect();
        let out = seeded(4).fit(&rows_from(&points), false).unwrap();
        let shape = PartitionShape::new("CMN", PeriodMode::Month);
        let record = out.to_record(&shape.describe(Some(2019), Some(Period::Month(3))));
        assert_eq!(record.year, 2019);
        assert_eq!(record.label, "March");
        assert_eq!(record.slope, out.ols.slope);
        assert_eq!(record.red_chi2, out.odr.res_var);
        assert_eq!(record.r2, out.ols.r_squared);
    }
}
