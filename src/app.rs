//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - reads and merges the station tables
//! - runs partition selection + regression and appends the fit tables
//! - turns fit tables into emission estimates
//! - prints reports and writes optional exports

use chrono::Duration;
use clap::Parser;
use log::info;

use crate::cli::{Command, CompareArgs, EstimateArgs, FitArgs, SelectionArgs};
use crate::domain::{
    BackgroundSpecies, EngineConfig, PartitionShape, RobustnessConfig, RunConfig, StationConfig,
};
use crate::emission::{SlopeFilter, load_plan};
use crate::error::AppError;
use crate::io::{StationFiles, load_station, write_estimates_csv};
use crate::report::{format_climatology, format_estimates, format_fit_summary};
use crate::select::{SelectError, period_mode_from_flags};

pub mod pipeline;

/// Entry point for the `ch4co` binary.
pub fn run() -> Result<(), AppError> {
    // A missing .env is fine; flags and the process environment still apply.
    dotenvy::dotenv().ok();
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Estimate(args) => handle_estimate(args),
        Command::Compare(args) => handle_compare(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = run_config_from_args(&args)?;
    let prefix = args.prefix.clone().unwrap_or_else(|| config.station.code.clone());
    let files = StationFiles::from_prefix(&args.data_dir, &prefix, args.background_file.clone());
    let ingested = load_station(&config.station.code, &files, config.shape.background_species)?;

    let run = pipeline::run_fit(&config, &ingested.table)?;
    println!("{}", format_fit_summary(&config, &run));
    Ok(())
}

fn handle_estimate(args: EstimateArgs) -> Result<(), AppError> {
    let config = estimate_config_from_args(&args)?;
    let output = pipeline::run_estimate(&config)?;

    println!("{}", format_estimates(std::slice::from_ref(&output.result)));
    if let Some(climatology) = &output.climatology {
        println!("{}", format_climatology(climatology));
    }

    if let Some(path) = &args.export {
        write_estimates_csv(path, std::slice::from_ref(&output.result))?;
        info!("Wrote {}", path.display());
    }
    Ok(())
}

fn handle_compare(args: CompareArgs) -> Result<(), AppError> {
    let plan = load_plan(&args.plan)?;
    let results = pipeline::run_compare(&plan, &args.output_dir)?;

    println!("{}", format_estimates(&results));
    if let Some(path) = &args.export {
        write_estimates_csv(path, &results)?;
        info!("Wrote {}", path.display());
    }
    Ok(())
}

/// Resolve a station code to a preset, applying coordinate overrides.
///
/// Stations without a preset need both coordinates; they have no coverage gaps and
/// support background selection only when a background table is supplied.
pub fn station_from_args(
    code: &str,
    lat: Option<f64>,
    lon: Option<f64>,
    has_background_file: bool,
) -> Result<StationConfig, AppError> {
    let code = code.trim().to_uppercase();
    match StationConfig::known(&code) {
        Some(mut station) => {
            if let Some(lat) = lat {
                station.latitude = lat;
            }
            if let Some(lon) = lon {
                station.longitude = lon;
            }
            Ok(station)
        }
        None => {
            let (Some(latitude), Some(longitude)) = (lat, lon) else {
                return Err(SelectError::UnknownStation(code).into());
            };
            let background_species = if has_background_file {
                vec![BackgroundSpecies::Co2, BackgroundSpecies::CoCh4]
            } else {
                Vec::new()
            };
            Ok(StationConfig {
                code,
                latitude,
                longitude,
                coverage_gaps: Vec::new(),
                background_species,
            })
        }
    }
}

pub fn shape_from_args(station: &str, args: &SelectionArgs) -> Result<PartitionShape, AppError> {
    let period_mode = period_mode_from_flags(args.month, args.season)?;
    Ok(PartitionShape {
        sector: args.sector,
        day_night: args.day_night,
        background: args.background,
        background_species: args.background_species,
        robust_only: args.robust,
        ..PartitionShape::new(station, period_mode)
    })
}

pub fn run_config_from_args(args: &FitArgs) -> Result<RunConfig, AppError> {
    let station = station_from_args(
        &args.selection.station,
        args.lat,
        args.lon,
        args.background_file.is_some(),
    )?;
    let shape = shape_from_args(&station.code, &args.selection)?;

    if args.iterations == 0 {
        return Err(AppError::new(2, "--iterations must be at least 1."));
    }
    for (name, value) in [("--fraction", args.fraction), ("--undivided-fraction", args.undivided_fraction)] {
        if !(value > 0.0 && value <= 1.0) {
            return Err(AppError::new(2, format!("{name} must be in (0, 1], got {value}.")));
        }
    }
    if args.min_run_gap_hours < 0 {
        return Err(AppError::new(2, "--min-run-gap-hours must not be negative."));
    }

    Ok(RunConfig {
        station,
        years: args.years.clone(),
        year_selection: !args.no_year_selection,
        shape,
        engine: EngineConfig {
            robustness: RobustnessConfig {
                iterations: args.iterations,
                fraction: args.fraction,
                undivided_fraction: args.undivided_fraction,
                threshold: args.threshold,
                seed: args.seed,
            },
            ..EngineConfig::default()
        },
        min_run_gap: Duration::hours(args.min_run_gap_hours),
        output_dir: args.output_dir.clone(),
        dedup: args.dedup,
        fresh: !args.append,
        export_plot_data: args.plot_data,
    })
}

pub fn estimate_config_from_args(args: &EstimateArgs) -> Result<pipeline::EstimateConfig, AppError> {
    let station = args.selection.station.trim().to_uppercase();
    let shape = shape_from_args(&station, &args.selection)?;
    Ok(pipeline::EstimateConfig {
        filter: SlopeFilter {
            positive_only: true,
            robust_only: shape.robust_only,
            min_r2: args.min_r2,
        },
        shape,
        output_dir: args.output_dir.clone(),
        years: args.years.clone(),
        co_inventory: args.co_inventory.clone(),
        ch4_inventory: args.ch4_inventory.clone(),
        monthly: args.monthly,
        source_label: args.label.clone(),
    })
}
