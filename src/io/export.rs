//! Result exports.
//!
//! - per-partition plot data (JSON) so fits can be rendered by an external tool
//! - emission estimates (CSV) for spreadsheets or downstream scripts

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::domain::{Observation, PartitionDescriptor};
use crate::emission::SourceEstimate;
use crate::error::AppError;
use crate::fit::{FitLines, FitOutcome};

#[derive(Debug, Serialize)]
struct PlotData<'a> {
    tool: &'static str,
    title: String,
    station: &'a str,
    year: Option<i32>,
    period: Option<String>,
    n: usize,
    points: Points,
    ols: LineSummary,
    odr: LineSummary,
    theil_sen: LineSummary,
    robustness: RobustnessSummary,
    lines: &'a FitLines,
}

#[derive(Debug, Serialize)]
struct Points {
    co: Vec<f64>,
    ch4: Vec<f64>,
    co_stdev: Vec<f64>,
    ch4_stdev: Vec<f64>,
}

#[derive(Debug, Serialize)]
struct LineSummary {
    slope: f64,
    intercept: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    slope_sd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    r2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    res_var: Option<f64>,
}

#[derive(Debug, Serialize)]
struct RobustnessSummary {
    mean_slope: f64,
    std_slope: f64,
    cv: f64,
    robust: bool,
    subsamples: usize,
}

/// Write `<root>/<plot dir>/<plot stem>.json` for one fitted partition and return its path.
pub fn write_plot_data(
    root: &Path,
    descriptor: &PartitionDescriptor,
    rows: &[Observation],
    outcome: &FitOutcome,
) -> Result<PathBuf, AppError> {
    let path = root.join(descriptor.plot_path("json"));
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .map_err(|e| AppError::new(2, format!("Failed to create plot directory '{}': {e}", dir.display())))?;
    }

    let data = PlotData {
        tool: "ch4co",
        title: descriptor.title(),
        station: &descriptor.shape.station,
        year: descriptor.year,
        period: descriptor.period.map(|p| p.label()),
        n: outcome.n,
        points: Points {
            co: rows.iter().map(|o| o.co).collect(),
            ch4: rows.iter().map(|o| o.ch4).collect(),
            co_stdev: rows.iter().map(|o| o.co_stdev).collect(),
            ch4_stdev: rows.iter().map(|o| o.ch4_stdev).collect(),
        },
        ols: LineSummary {
            slope: outcome.ols.slope,
            intercept: outcome.ols.intercept,
            slope_sd: Some(outcome.ols.slope_stderr),
            r2: Some(outcome.ols.r_squared),
            res_var: None,
        },
        odr: LineSummary {
            slope: outcome.odr.slope,
            intercept: outcome.odr.intercept,
            slope_sd: Some(outcome.odr.slope_sd),
            r2: None,
            res_var: Some(outcome.odr.res_var),
        },
        theil_sen: LineSummary {
            slope: outcome.theil_sen.slope,
            intercept: outcome.theil_sen.intercept,
            slope_sd: None,
            r2: None,
            res_var: None,
        },
        robustness: RobustnessSummary {
            mean_slope: outcome.robustness.mean_slope,
            std_slope: outcome.robustness.std_slope,
            cv: outcome.robustness.cv,
            robust: outcome.robustness.robust,
            subsamples: outcome.robustness.valid_subsamples,
        },
        lines: &outcome.lines,
    };

    let file = File::create(&path)
        .map_err(|e| AppError::new(2, format!("Failed to create plot data '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, &data)
        .map_err(|e| AppError::new(2, format!("Failed to write plot data: {e}")))?;
    Ok(path)
}

/// Write emission estimates to a CSV file (one row per station, source and period).
pub fn write_estimates_csv(path: &Path, results: &[SourceEstimate]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))?;
    let write_err = |e: csv::Error| AppError::new(2, format!("Failed to write export CSV '{}': {e}", path.display()));

    writer
        .write_record([
            "station",
            "table",
            "source",
            "year",
            "month",
            "mean_slope",
            "n_slopes",
            "co_inventory_t",
            "ch4_estimate_t",
            "ch4_error_t",
            "ch4_inventory_t",
            "ch4_inventory_error_t",
        ])
        .map_err(write_err)?;

    for result in results {
        for e in &result.estimates {
            writer
                .write_record([
                    result.station.clone(),
                    result.table.clone(),
                    result.source.clone(),
                    e.year.to_string(),
                    e.month.map(|m| m.to_string()).unwrap_or_default(),
                    format!("{:.6}", e.mean_slope),
                    e.n_slopes.to_string(),
                    format!("{:.3}", e.co_emission_t),
                    format!("{:.3}", e.ch4_t),
                    format!("{:.3}", e.ch4_err_t),
                    e.reference.as_ref().map(|r| format!("{:.3}", r.emission_t)).unwrap_or_default(),
                    e.reference.as_ref().map(|r| format!("{:.3}", r.emission_err_t)).unwrap_or_default(),
                ])
                .map_err(write_err)?;
        }
    }

    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV '{}': {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EngineConfig, EstimatedEmission, PartitionShape, Period, PeriodMode, RobustnessConfig};
    use crate::fit::RegressionEngine;
    use chrono::{Duration, NaiveDate};
    use tempdir::TempDir;

    #[test]
    fn plot_data_lands_under_the_partition_directory() {
        let start = NaiveDate::from_ymd_opt(2019, 7, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let rows: Vec<Observation> = (0..30)
            .map(|i| Observation {
                timestamp: start + Duration::hours(i),
                co: 100.0 + i as f64,
                ch4: 1900.0 + 0.5 * i as f64 + if i % 2 == 0 { 0.3 } else { -0.3 },
                co_stdev: 1.0,
                ch4_stdev: 2.0,
                wind_direction: 180.0,
                background: None,
            })
            .collect();
        let mut engine = RegressionEngine::new(EngineConfig {
            robustness: RobustnessConfig {
                seed: Some(5),
                ..RobustnessConfig::default()
            },
            ..EngineConfig::default()
        });
        let outcome = engine.fit(&rows, false).unwrap();
        let descriptor = PartitionShape::new("CMN", PeriodMode::Month).describe(Some(2019), Some(Period::Month(7)));

        let dir = TempDir::new("export").unwrap();
        let path = write_plot_data(dir.path(), &descriptor, &rows, &outcome).unwrap();
        assert_eq!(path, dir.path().join("CMN/2019/scatter_fit_2019_7.json"));

        let json: serde_json::Value = serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(json["title"], "CMN, 2019, July");
        assert_eq!(json["n"], 30);
        assert_eq!(json["points"]["co"].as_array().unwrap().len(), 30);
        assert!(json["odr"]["res_var"].is_number());
        assert!(json["theil_sen"].get("slope_sd").is_none());
    }

    #[test]
    fn estimates_csv_has_one_row_per_estimate() {
        let dir = TempDir::new("export").unwrap();
        let path = dir.path().join("estimates.csv");
        let results = vec![SourceEstimate {
            station: "CMN".to_string(),
            table: "fit_results_season.txt".to_string(),
            source: "EDGAR".to_string(),
            estimates: vec![EstimatedEmission {
                year: 2019,
                month: None,
                mean_slope: 0.5,
                n_slopes: 4,
                co_emission_t: 100.0,
                ch4_t: 28.637,
                ch4_err_t: 2.8637,
                reference: None,
            }],
        }];
        write_estimates_csv(&path, &results).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("CMN,fit_results_season.txt,EDGAR,2019,,0.500000,4,100.000,28.637,2.864,"));
    }

    #[test]
    fn estimates_csv_quotes_labels_with_commas() {
        let dir = TempDir::new("export").unwrap();
        let path = dir.path().join("estimates.csv");
        let results = vec![SourceEstimate {
            station: "CMN".to_string(),
            table: "fit_results.txt".to_string(),
            source: "EDGAR, v8".to_string(),
            estimates: vec![EstimatedEmission {
                year: 2020,
                month: Some(5),
                mean_slope: 0.4,
                n_slopes: 1,
                co_emission_t: 10.0,
                ch4_t: 2.291,
                ch4_err_t: 0.229,
                reference: None,
            }],
        }];
        write_estimates_csv(&path, &results).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 12);
        assert_eq!(&rows[0][2], "EDGAR, v8");
        assert_eq!(&rows[0][4], "5");
    }
}
