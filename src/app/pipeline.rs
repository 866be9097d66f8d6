//! Shared pipeline logic behind the CLI subcommands.
//!
//! Keeping this in one place keeps the core workflow testable without a process:
//! observations -> partition plan -> selection -> fit -> fit table (-> plot data)
//! and fit tables + inventories -> emission estimates.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::domain::{
    BackgroundFilter, FitRecord, ObservationTable, PartitionDescriptor, PartitionShape, PeriodMode, RunConfig,
};
use crate::emission::{
    CH4_SPECIES, CO_SPECIES, ComparePlan, Inventory, InventorySource, SlopeFilter, SourceEstimate,
    estimate_monthly, estimate_source, estimate_yearly, read_inventory, slope_climatology,
};
use crate::error::AppError;
use crate::fit::RegressionEngine;
use crate::io::write_plot_data;
use crate::select::{MIN_PARTITION_ROWS, Selector, check_background, plan_partitions};
use crate::store::{AppendOutcome, AppendPolicy, FitResultStore};

/// What happened to one planned partition.
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionStatus {
    Fitted {
        record: FitRecord,
        n: usize,
        stored: AppendOutcome,
        plot: Option<PathBuf>,
    },
    /// Fewer rows than a line fit needs.
    Skipped { rows: usize },
    /// The regression was degenerate.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionReport {
    pub descriptor: PartitionDescriptor,
    pub status: PartitionStatus,
}

/// All outputs of a single `fit` run.
#[derive(Debug, Clone)]
pub struct FitRunOutput {
    pub table_path: PathBuf,
    pub years: Vec<i32>,
    pub partitions: Vec<PartitionReport>,
}

/// Fit every planned partition of `table` and append the results to the fit table.
pub fn run_fit(config: &RunConfig, table: &ObservationTable) -> Result<FitRunOutput, AppError> {
    check_background(&config.station, &config.shape)?;
    if config.shape.background != BackgroundFilter::Unfiltered && table.rows().iter().all(|o| o.background.is_none()) {
        return Err(AppError::new(
            2,
            "Background selection requested but the observations carry no background flags.",
        ));
    }

    let years = if config.years.is_empty() {
        table.years()
    } else {
        config.years.clone()
    };
    let plan = plan_partitions(&config.shape, &config.station, &years, config.year_selection);

    let store = FitResultStore::new(&config.output_dir);
    if config.fresh {
        store.reset(&config.shape)?;
    }
    let policy = AppendPolicy::for_run(config.dedup, &plan);
    let selector = Selector::new(&config.station, config.min_run_gap);
    let mut engine = RegressionEngine::new(config.engine.clone());
    let sector_filtered = config.shape.sector.is_some();

    info!(
        "{}: {} partitions over years {:?} -> {}",
        config.station.code,
        plan.len(),
        years,
        store.table_path(&config.shape).display()
    );

    let mut partitions = Vec::with_capacity(plan.len());
    for descriptor in plan {
        let rows = selector.select(table.rows(), &descriptor);
        if rows.len() < MIN_PARTITION_ROWS {
            info!("{}: {} rows selected, skipping", descriptor.title(), rows.len());
            partitions.push(PartitionReport {
                descriptor,
                status: PartitionStatus::Skipped { rows: rows.len() },
            });
            continue;
        }

        let status = match engine.fit(&rows, sector_filtered) {
            Ok(outcome) => {
                let record = outcome.to_record(&descriptor);
                let stored = store.append(&config.shape, &record, &policy)?;
                let plot = if config.export_plot_data {
                    Some(write_plot_data(&config.output_dir, &descriptor, &rows, &outcome)?)
                } else {
                    None
                };
                PartitionStatus::Fitted {
                    record,
                    n: outcome.n,
                    stored,
                    plot,
                }
            }
            Err(e) => {
                warn!("{}: {e}", descriptor.title());
                PartitionStatus::Failed { reason: e.to_string() }
            }
        };
        partitions.push(PartitionReport { descriptor, status });
    }

    Ok(FitRunOutput {
        table_path: store.table_path(&config.shape),
        years,
        partitions,
    })
}

/// Settings of an `estimate` run.
#[derive(Debug, Clone)]
pub struct EstimateConfig {
    pub shape: PartitionShape,
    pub output_dir: PathBuf,
    pub years: Vec<i32>,
    pub co_inventory: PathBuf,
    pub ch4_inventory: Option<PathBuf>,
    /// Per-month estimates instead of yearly ones.
    pub monthly: bool,
    pub filter: SlopeFilter,
    pub source_label: String,
}

#[derive(Debug, Clone)]
pub struct EstimateOutput {
    pub table_path: PathBuf,
    pub result: SourceEstimate,
    /// Mean slope per calendar month, when the table is monthly.
    pub climatology: Option<[f64; 12]>,
}

/// Estimate CH4 emissions of one station from its stored fits.
pub fn run_estimate(config: &EstimateConfig) -> Result<EstimateOutput, AppError> {
    let store = FitResultStore::new(&config.output_dir);
    let rows = store.read_rows(&config.shape)?;
    let (co, ch4) = load_inventories(&config.co_inventory, config.ch4_inventory.as_deref())?;

    let estimates = if config.monthly {
        let estimates = estimate_monthly(&rows, &config.years, &co, ch4.as_ref(), &config.filter);
        if estimates.is_empty() {
            return Err(AppError::new(
                3,
                "No month has both a valid stored slope and a monthly CO inventory entry.",
            ));
        }
        estimates
    } else {
        estimate_yearly(&rows, &config.years, &co, ch4.as_ref(), &config.filter)?
    };

    let climatology = (config.shape.period_mode == PeriodMode::Month)
        .then(|| slope_climatology(&rows, &config.filter));

    Ok(EstimateOutput {
        table_path: store.table_path(&config.shape),
        result: SourceEstimate {
            station: config.shape.station.clone(),
            table: config.shape.table_file_name(),
            source: config.source_label.clone(),
            estimates,
        },
        climatology,
    })
}

/// Run every station/inventory pair of a comparison plan.
pub fn run_compare(plan: &ComparePlan, output_dir: &Path) -> Result<Vec<SourceEstimate>, AppError> {
    let store = FitResultStore::new(output_dir);
    let mut results = Vec::new();
    for station in &plan.stations {
        let rows = store.read_rows(&station.shape)?;
        for source in &station.inventories {
            let (co, ch4) = load_source(source)?;
            let result = estimate_source(station, &rows, source, &co, ch4.as_ref())?;
            info!(
                "{} / {}: {} yearly estimates",
                result.station,
                result.source,
                result.estimates.len()
            );
            results.push(result);
        }
    }
    Ok(results)
}

fn load_source(source: &InventorySource) -> Result<(Inventory, Option<Inventory>), AppError> {
    load_inventories(&source.co_path, source.ch4_path.as_deref())
}

fn load_inventories(co_path: &Path, ch4_path: Option<&Path>) -> Result<(Inventory, Option<Inventory>), AppError> {
    let co = read_inventory(co_path, CO_SPECIES)?;
    let ch4 = match ch4_path {
        Some(path) => Some(read_inventory(path, CH4_SPECIES)?),
        None => None,
    };
    Ok((co, ch4))
}
