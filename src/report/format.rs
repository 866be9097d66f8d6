//! Formatted terminal output for fit and estimate runs.
//!
//! We keep formatting code in one place so:
//! - the fitting and estimation code stays clean and testable
//! - output changes are localized

use crate::app::pipeline::{FitRunOutput, PartitionStatus};
use crate::domain::{RunConfig, month_name};
use crate::emission::SourceEstimate;
use crate::report::count_outcomes;
use crate::store::AppendOutcome;

/// Format the full fit-run summary (settings + one line per partition + tallies).
pub fn format_fit_summary(config: &RunConfig, run: &FitRunOutput) -> String {
    let mut out = String::new();

    out.push_str("=== ch4co - CH4:CO regression ===\n");
    out.push_str(&format!(
        "Station: {} (lat {:.4}, lon {:.4})\n",
        config.station.code, config.station.latitude, config.station.longitude
    ));
    out.push_str(&format!("Table: {}\n", run.table_path.display()));
    out.push_str(&format!("Years: {}\n", fmt_years(&run.years)));
    out.push_str(&format!(
        "Robustness: {} subsamples | fraction {:.2} (sector) / {:.2} (undivided) | CV < {:.2}\n",
        config.engine.robustness.iterations,
        config.engine.robustness.fraction,
        config.engine.robustness.undivided_fraction,
        config.engine.robustness.threshold,
    ));

    out.push_str("\nPartitions:\n");
    out.push_str(&format!(
        "{:<24} {:>6} {:>9} {:>8} {:>7} {:>6}  {}\n",
        "Partition", "n", "slope", "sd", "r2", "robust", "status"
    ));
    for p in &run.partitions {
        let name = truncate(&p.descriptor.title(), 24);
        match &p.status {
            PartitionStatus::Fitted { record, n, stored, .. } => {
                let status = match stored {
                    AppendOutcome::Appended => "stored",
                    AppendOutcome::SkippedDuplicate => "duplicate",
                };
                out.push_str(&format!(
                    "{name:<24} {n:>6} {:>9.4} {:>8.4} {:>7.3} {:>6}  {status}\n",
                    record.slope,
                    record.slope_sd,
                    record.r2,
                    if record.robust { "yes" } else { "no" },
                ));
            }
            PartitionStatus::Skipped { rows } => {
                out.push_str(&format!("{name:<24} {rows:>6} {:>9} {:>8} {:>7} {:>6}  skipped\n", "-", "-", "-", "-"));
            }
            PartitionStatus::Failed { reason } => {
                out.push_str(&format!(
                    "{name:<24} {:>6} {:>9} {:>8} {:>7} {:>6}  failed: {reason}\n",
                    "-", "-", "-", "-", "-"
                ));
            }
        }
    }

    let counts = count_outcomes(run);
    out.push_str(&format!(
        "\n{} planned | {} stored | {} duplicates | {} skipped | {} failed | {} robust\n",
        counts.planned, counts.appended, counts.duplicates, counts.skipped, counts.failed, counts.robust
    ));
    out
}

/// Format emission estimates, one block per station/source pair.
pub fn format_estimates(results: &[SourceEstimate]) -> String {
    let mut out = String::new();
    for result in results {
        out.push_str(&format!(
            "=== {} | {} | {} ===\n",
            result.station, result.source, result.table
        ));
        out.push_str(&format!(
            "{:<9} {:>9} {:>3} {:>12} {:>12} {:>10} {:>12}\n",
            "Period", "slope", "n", "CO [t]", "CH4 [t]", "+/- [t]", "inv CH4 [t]"
        ));
        if result.estimates.is_empty() {
            out.push_str("(no estimates)\n");
        }
        for e in &result.estimates {
            let period = match e.month {
                Some(m) => format!("{}-{m:02}", e.year),
                None => e.year.to_string(),
            };
            let reference = e
                .reference
                .as_ref()
                .map(|r| format!("{:.1}", r.emission_t))
                .unwrap_or_else(|| "-".to_string());
            out.push_str(&format!(
                "{period:<9} {:>9.4} {:>3} {:>12.1} {:>12.1} {:>10.1} {reference:>12}\n",
                e.mean_slope, e.n_slopes, e.co_emission_t, e.ch4_t, e.ch4_err_t
            ));
        }
        out.push('\n');
    }
    out
}

/// Format the mean slope of each calendar month.
pub fn format_climatology(slopes: &[f64; 12]) -> String {
    let mut out = String::from("Monthly slope climatology:\n");
    for (idx, slope) in slopes.iter().enumerate() {
        let name = month_name(idx as u32 + 1).unwrap_or("?");
        if slope.is_finite() {
            out.push_str(&format!("  {:<10} {slope:>8.4}\n", truncate(name, 10)));
        } else {
            out.push_str(&format!("  {:<10} {:>8}\n", truncate(name, 10), "-"));
        }
    }
    out
}

fn fmt_years(years: &[i32]) -> String {
    if years.is_empty() {
        return "all".to_string();
    }
    let parts: Vec<String> = years.iter().map(|y| y.to_string()).collect();
    parts.join(", ")
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use chrono::Duration;

    use crate::app::pipeline::PartitionReport;
    use crate::domain::{
        DedupMode, EngineConfig, EstimatedEmission, FitRecord, InventoryRecord, PartitionShape, Period, PeriodMode,
        StationConfig,
    };

    fn config() -> RunConfig {
        RunConfig {
            station: StationConfig::known("CMN").unwrap(),
            years: vec![2019],
            year_selection: true,
            shape: PartitionShape::new("CMN", PeriodMode::Month),
            engine: EngineConfig::default(),
            min_run_gap: Duration::hours(1),
            output_dir: PathBuf::from("out"),
            dedup: DedupMode::Keyed,
            fresh: true,
            export_plot_data: false,
        }
    }

    fn record(robust: bool) -> FitRecord {
        FitRecord {
            year: 2019,
            label: "January".to_string(),
            slope: 0.52,
            slope_sd: 0.01,
            red_chi2: 1.2,
            mean_slope_sub: 0.51,
            slope_sd_sub: 0.05,
            r2: 0.9,
            robust,
        }
    }

    #[test]
    fn fit_summary_lists_every_partition() {
        let config = config();
        let shape = config.shape.clone();
        let run = FitRunOutput {
            table_path: PathBuf::from("out/CMN/res_fit/fit_results_monthly.txt"),
            years: vec![2019],
            partitions: vec![
                PartitionReport {
                    descriptor: shape.describe(Some(2019), Some(Period::Month(1))),
                    status: PartitionStatus::Fitted {
                        record: record(true),
                        n: 500,
                        stored: AppendOutcome::Appended,
                        plot: None,
                    },
                },
                PartitionReport {
                    descriptor: shape.describe(Some(2019), Some(Period::Month(2))),
                    status: PartitionStatus::Skipped { rows: 1 },
                },
                PartitionReport {
                    descriptor: shape.describe(Some(2019), Some(Period::Month(3))),
                    status: PartitionStatus::Failed {
                        reason: "CO is constant".to_string(),
                    },
                },
            ],
        };

        let text = format_fit_summary(&config, &run);
        assert!(text.contains("Station: CMN"));
        assert!(text.contains("CMN, 2019, January"));
        assert!(text.contains("stored"));
        assert!(text.contains("skipped"));
        assert!(text.contains("failed: CO is constant"));
        assert!(text.contains("3 planned | 1 stored | 0 duplicates | 1 skipped | 1 failed | 1 robust"));
    }

    #[test]
    fn estimates_show_reference_when_available() {
        let results = vec![SourceEstimate {
            station: "CMN".to_string(),
            table: "fit_results_season.txt".to_string(),
            source: "EDGAR".to_string(),
            estimates: vec![EstimatedEmission {
                year: 2019,
                month: Some(3),
                mean_slope: 0.5,
                n_slopes: 1,
                co_emission_t: 100.0,
                ch4_t: 28.6,
                ch4_err_t: 2.9,
                reference: Some(InventoryRecord {
                    year: 2019,
                    month: Some(3),
                    species: "CH4".to_string(),
                    emission_t: 31.0,
                    emission_err_t: 3.1,
                }),
            }],
        }];
        let text = format_estimates(&results);
        assert!(text.contains("=== CMN | EDGAR | fit_results_season.txt ==="));
        assert!(text.contains("2019-03"));
        assert!(text.contains("31.0"));
    }

    #[test]
    fn climatology_marks_missing_months() {
        let mut slopes = [f64::NAN; 12];
        slopes[0] = 0.25;
        let text = format_climatology(&slopes);
        assert_eq!(text.lines().count(), 13);
        assert!(text.contains("January"));
        assert!(text.contains("0.2500"));
        assert!(text.lines().nth(2).unwrap().trim_end().ends_with('-'));
    }

    #[test]
    fn truncate_marks_cut_text() {
        assert_eq!(truncate("September", 10), "September");
        assert_eq!(truncate("CMN, 2019, September", 8), "CMN, 20.");
    }
}
