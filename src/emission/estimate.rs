//! CH4 emissions from CH4:CO slopes and CO inventory totals.
//!
//! ```text
//! CH4 = slope * CO_inv * (M_CH4 / M_CO)
//! σ_CH4 = (CH4 / CO_inv) * σ_CO_inv
//! ```
//!
//! Only the inventory uncertainty is propagated; the slope uncertainty is not.

use log::{debug, warn};

use crate::domain::{EstimatedEmission, FitRecord, InventoryRecord, Period};
use crate::emission::{EmissionError, Inventory};
use crate::math::mean;

/// Molar mass of CH4 (g/mol).
pub const M_CH4: f64 = 16.043;
/// Molar mass of CO (g/mol).
pub const M_CO: f64 = 28.010;

pub const CO_SPECIES: &str = "CO";
pub const CH4_SPECIES: &str = "CH4";

/// Which stored slopes may enter an estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlopeFilter {
    pub positive_only: bool,
    pub robust_only: bool,
    /// Keep only fits with `r2` strictly above this value.
    pub min_r2: Option<f64>,
}

impl Default for SlopeFilter {
    fn default() -> Self {
        Self {
            positive_only: true,
            robust_only: false,
            min_r2: None,
        }
    }
}

impl SlopeFilter {
    pub fn accepts(&self, record: &FitRecord) -> bool {
        if !record.slope.is_finite() {
            return false;
        }
        if self.positive_only && record.slope <= 0.0 {
            return false;
        }
        if self.robust_only && !record.robust {
            return false;
        }
        match self.min_r2 {
            Some(min) => record.r2 > min,
            None => true,
        }
    }
}

/// `(ch4, ch4_err)` for `slope` applied to a CO inventory entry.
pub fn scale_inventory(slope: f64, co: &InventoryRecord) -> (f64, f64) {
    let ch4 = slope * co.emission_t * (M_CH4 / M_CO);
    let err = (ch4 / co.emission_t) * co.emission_err_t;
    (ch4, err)
}

/// Mean of the accepted slopes of `year` and how many were averaged.
pub fn mean_valid_slope(rows: &[FitRecord], year: i32, filter: &SlopeFilter) -> Option<(f64, usize)> {
    let slopes: Vec<f64> = rows
        .iter()
        .filter(|r| r.year == year && filter.accepts(r))
        .map(|r| r.slope)
        .collect();
    Some((mean(&slopes)?, slopes.len()))
}

/// Yearly CH4 estimates.
///
/// Every requested year must have at least one accepted slope and a CO inventory entry;
/// otherwise the whole estimate fails. The CH4 inventory, when given, is only attached as
/// a reference.
pub fn estimate_yearly(
    rows: &[FitRecord],
    years: &[i32],
    co_inventory: &Inventory,
    ch4_inventory: Option<&Inventory>,
    filter: &SlopeFilter,
) -> Result<Vec<EstimatedEmission>, EmissionError> {
    let mut out = Vec::with_capacity(years.len());
    for &year in years {
        let (mean_slope, n_slopes) = mean_valid_slope(rows, year, filter).ok_or(EmissionError::NoValidSlopes { year })?;
        let co = co_inventory.require(CO_SPECIES, year, None)?;
        let (ch4_t, ch4_err_t) = scale_inventory(mean_slope, co);
        debug!("{year}: mean slope {mean_slope:.4} over {n_slopes} fits");

        out.push(EstimatedEmission {
            year,
            month: None,
            mean_slope,
            n_slopes,
            co_emission_t: co.emission_t,
            ch4_t,
            ch4_err_t,
            reference: reference(ch4_inventory, year, None),
        });
    }
    Ok(out)
}

/// Monthly CH4 estimates from a monthly fit table and a monthly CO inventory.
///
/// Months lacking an accepted slope or a CO inventory entry are skipped.
pub fn estimate_monthly(
    rows: &[FitRecord],
    years: &[i32],
    co_inventory: &Inventory,
    ch4_inventory: Option<&Inventory>,
    filter: &SlopeFilter,
) -> Vec<EstimatedEmission> {
    let mut out = Vec::new();
    for &year in years {
        for month in 1..=12u32 {
            let label = Period::Month(month).label();
            let Some(row) = rows
                .iter()
                .find(|r| r.year == year && r.label == label && filter.accepts(r))
            else {
                continue;
            };
            let Some(co) = co_inventory.find(CO_SPECIES, year, Some(month)) else {
                warn!("No monthly CO inventory for {year} {label}; skipping");
                continue;
            };
            let (ch4_t, ch4_err_t) = scale_inventory(row.slope, co);
            out.push(EstimatedEmission {
                year,
                month: Some(month),
                mean_slope: row.slope,
                n_slopes: 1,
                co_emission_t: co.emission_t,
                ch4_t,
                ch4_err_t,
                reference: reference(ch4_inventory, year, Some(month)),
            });
        }
    }
    out
}

/// Mean slope per calendar month across all years (January first); NaN when none.
pub fn slope_climatology(rows: &[FitRecord], filter: &SlopeFilter) -> [f64; 12] {
    let mut out = [f64::NAN; 12];
    for (idx, slot) in out.iter_mut().enumerate() {
        let label = Period::Month(idx as u32 + 1).label();
        let slopes: Vec<f64> = rows
            .iter()
            .filter(|r| r.label == label && filter.accepts(r))
            .map(|r| r.slope)
            .collect();
        *slot = mean(&slopes).unwrap_or(f64::NAN);
    }
    out
}

fn reference(inventory: Option<&Inventory>, year: i32, month: Option<u32>) -> Option<InventoryRecord> {
    inventory?.find(CH4_SPECIES, year, month).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit(year: i32, label: &str, slope: f64, r2: f64, robust: bool) -> FitRecord {
        FitRecord {
            year,
            label: label.to_string(),
            slope,
            slope_sd: 0.01,
            red_chi2: 1.0,
            mean_slope_sub: slope,
            slope_sd_sub: 0.01,
            r2,
            robust,
        }
    }

    fn inv(species: &str, entries: &[(i32, Option<u32>, f64, f64)]) -> Inventory {
        Inventory::new(
            "mem",
            entries
                .iter()
                .map(|&(year, month, e, err)| InventoryRecord {
                    year,
                    month,
                    species: species.to_string(),
                    emission_t: e,
                    emission_err_t: err,
                })
                .collect(),
        )
    }

    #[test]
    fn propagation_matches_the_formula() {
        let co = inv("CO", &[(2019, None, 100.0, 10.0)]);
        let rows = vec![fit(2019, "DJF", 0.5, 0.8, true)];
        let est = estimate_yearly(&rows, &[2019], &co, None, &SlopeFilter::default()).unwrap();
        let expected = 0.5 * 100.0 * (16.043 / 28.010);
        assert!((est[0].ch4_t - expected).abs() < 1e-12);
        assert!((est[0].ch4_err_t - expected / 100.0 * 10.0).abs() < 1e-12);
        assert_eq!(est[0].n_slopes, 1);
    }

    #[test]
    fn mean_excludes_invalid_slopes() {
        let rows = vec![
            fit(2019, "DJF", 0.4, 0.8, true),
            fit(2019, "MAM", 0.6, 0.3, false),
            fit(2019, "JJA", -0.2, 0.9, true),
            fit(2019, "SON", f64::NAN, 0.9, true),
            fit(2020, "DJF", 9.0, 0.9, true),
        ];
        let (m, n) = mean_valid_slope(&rows, 2019, &SlopeFilter::default()).unwrap();
        assert!((m - 0.5).abs() < 1e-12);
        assert_eq!(n, 2);

        let strict = SlopeFilter {
            robust_only: true,
            min_r2: Some(0.6),
            ..SlopeFilter::default()
        };
        assert_eq!(mean_valid_slope(&rows, 2019, &strict), Some((0.4, 1)));
    }

    #[test]
    fn missing_inventory_year_fails_explicitly() {
        let co = inv("CO", &[(2019, None, 100.0, 10.0)]);
        let rows = vec![fit(2019, "DJF", 0.5, 0.8, true), fit(2020, "DJF", 0.5, 0.8, true)];
        let err = estimate_yearly(&rows, &[2019, 2020], &co, None, &SlopeFilter::default()).unwrap_err();
        assert!(matches!(
            err,
            EmissionError::MissingInventory { year: 2020, month: None, .. }
        ));
    }

    #[test]
    fn year_without_valid_slopes_fails() {
        let co = inv("CO", &[(2019, None, 100.0, 10.0)]);
        let rows = vec![fit(2019, "DJF", -0.5, 0.8, true)];
        let err = estimate_yearly(&rows, &[2019], &co, None, &SlopeFilter::default()).unwrap_err();
        assert!(matches!(err, EmissionError::NoValidSlopes { year: 2019 }));
    }

    #[test]
    fn monthly_skips_incomplete_months_and_attaches_reference() {
        let co = inv("CO", &[(2019, Some(1), 10.0, 1.0), (2019, Some(2), 12.0, 1.0)]);
        let ch4 = inv("CH4", &[(2019, Some(1), 4.0, 0.5)]);
        let rows = vec![
            fit(2019, "January", 0.5, 0.8, true),
            fit(2019, "March", 0.5, 0.8, true),
        ];
        let est = estimate_monthly(&rows, &[2019], &co, Some(&ch4), &SlopeFilter::default());
        assert_eq!(est.len(), 1);
        assert_eq!(est[0].month, Some(1));
        assert_eq!(est[0].reference.as_ref().map(|r| r.emission_t), Some(4.0));
    }

    #[test]
    fn climatology_averages_each_month_over_years() {
        let rows = vec![
            fit(2019, "January", 0.4, 0.8, true),
            fit(2020, "January", 0.6, 0.8, true),
            fit(2019, "July", 0.3, 0.8, true),
        ];
        let clim = slope_climatology(&rows, &SlopeFilter::default());
        assert!((clim[0] - 0.5).abs() < 1e-12);
        assert!((clim[6] - 0.3).abs() < 1e-12);
        assert!(clim[1].is_nan());
    }
}
