//! Command-line parsing for the CH4:CO regression and emission tool.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the selection/fitting/estimation code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{BackgroundFilter, BackgroundSpecies, DayNightFilter, DedupMode, WindSector};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "ch4co", version, about = "CH4:CO regression slopes and top-down CH4 emission estimates")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit CH4 against CO for every partition of a station's record and append to the fit table.
    Fit(FitArgs),
    /// Estimate CH4 emissions of one station from its fit table and a CO inventory.
    Estimate(EstimateArgs),
    /// Run a multi-station, multi-inventory comparison plan (JSON).
    Compare(CompareArgs),
}

/// Selection options shared by `fit` and `estimate`; together they name the fit table.
#[derive(Debug, Args, Clone)]
pub struct SelectionArgs {
    /// Station code (CMN, LMP, PUY, JFJ, HPB, OPE, or a custom code with --lat/--lon).
    #[arg(short = 's', long, default_value = "CMN")]
    pub station: String,

    /// One partition per calendar month.
    #[arg(long)]
    pub month: bool,

    /// One partition per meteorological season (DJF, MAM, JJA, SON).
    #[arg(long)]
    pub season: bool,

    /// Wind-direction sector in degrees, `min-max` (wraps through north when min > max).
    #[arg(long = "wd", value_name = "MIN-MAX")]
    pub sector: Option<WindSector>,

    /// Day/night selection.
    #[arg(long, value_enum, default_value_t = DayNightFilter::Unfiltered)]
    pub day_night: DayNightFilter,

    /// Background selection.
    #[arg(long, value_enum, default_value_t = BackgroundFilter::Unfiltered)]
    pub background: BackgroundFilter,

    /// Species whose background detection defines the background flag.
    #[arg(long = "bkg-species", value_enum, default_value_t = BackgroundSpecies::Co2)]
    pub background_species: BackgroundSpecies,

    /// Robustness mode: separate tables, and estimates only use robust slopes.
    #[arg(long)]
    pub robust: bool,
}

/// Options for fitting.
#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Directory holding the L2 tables.
    #[arg(long, env = "CH4CO_DATA_DIR", default_value = ".")]
    pub data_dir: PathBuf,

    /// File prefix of the L2 tables (`<prefix>.CH4`, `<prefix>.CO`, `<prefix>.MTO`); defaults to the station code.
    #[arg(long)]
    pub prefix: Option<String>,

    /// Background-detection table (CSV with `date` and `*_bg2` columns).
    #[arg(long)]
    pub background_file: Option<PathBuf>,

    /// Root directory for fit tables and plot data.
    #[arg(short = 'o', long, env = "CH4CO_OUTPUT_DIR", default_value = "results")]
    pub output_dir: PathBuf,

    /// Years to scan (comma separated); defaults to every year present in the data.
    #[arg(long, value_delimiter = ',')]
    pub years: Vec<i32>,

    /// Fit the whole record as one partition instead of scanning years.
    #[arg(long)]
    pub no_year_selection: bool,

    /// Latitude override (required for stations without a preset).
    #[arg(long, allow_hyphen_values = true)]
    pub lat: Option<f64>,

    /// Longitude override (required for stations without a preset).
    #[arg(long, allow_hyphen_values = true)]
    pub lon: Option<f64>,

    /// Seed for the robustness subsampling (entropy when omitted).
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of robustness subsamples.
    #[arg(long, default_value_t = 100)]
    pub iterations: usize,

    /// Subsample fraction when a wind sector is selected.
    #[arg(long, default_value_t = 0.4)]
    pub fraction: f64,

    /// Subsample fraction when the data is not divided by wind direction.
    #[arg(long, default_value_t = 0.2)]
    pub undivided_fraction: f64,

    /// Coefficient-of-variation threshold for a robust slope.
    #[arg(long, default_value_t = 0.3)]
    pub threshold: f64,

    /// Minimum gap (hours) that keeps an isolated non-background row.
    #[arg(long, default_value_t = 1)]
    pub min_run_gap_hours: i64,

    /// Duplicate detection when appending rows.
    #[arg(long, value_enum, default_value_t = DedupMode::Keyed)]
    pub dedup: DedupMode,

    /// Keep the existing fit table and append to it.
    #[arg(long)]
    pub append: bool,

    /// Write per-partition plot data (JSON) next to the fit tables.
    #[arg(long)]
    pub plot_data: bool,
}

/// Options for a single-station emission estimate.
#[derive(Debug, Args, Clone)]
pub struct EstimateArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Root directory holding the fit tables.
    #[arg(short = 'o', long, env = "CH4CO_OUTPUT_DIR", default_value = "results")]
    pub output_dir: PathBuf,

    /// CO inventory (space separated: year [month] emission_tonnes emission_error_tonnes).
    #[arg(long, value_name = "FILE")]
    pub co_inventory: PathBuf,

    /// CH4 inventory to compare the estimates against.
    #[arg(long, value_name = "FILE")]
    pub ch4_inventory: Option<PathBuf>,

    /// Years to estimate (comma separated).
    #[arg(long, value_delimiter = ',', required = true)]
    pub years: Vec<i32>,

    /// Per-month estimates (needs a monthly fit table and a monthly inventory).
    #[arg(long)]
    pub monthly: bool,

    /// Only use fits with r2 above this value.
    #[arg(long)]
    pub min_r2: Option<f64>,

    /// Label of the inventory source in reports and exports.
    #[arg(long, default_value = "inventory")]
    pub label: String,

    /// Export estimates to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,
}

/// Options for a comparison plan.
#[derive(Debug, Args, Clone)]
pub struct CompareArgs {
    /// Comparison plan (JSON).
    #[arg(long, value_name = "JSON")]
    pub plan: PathBuf,

    /// Root directory holding the fit tables.
    #[arg(short = 'o', long, env = "CH4CO_OUTPUT_DIR", default_value = "results")]
    pub output_dir: PathBuf,

    /// Export all estimates to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fit_flags() {
        let cli = Cli::try_parse_from([
            "ch4co", "fit", "--season", "--wd", "310-80", "--background", "non-bkg", "--years", "2018,2019",
            "--seed", "7",
        ])
        .unwrap();
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert!(args.selection.season);
        assert_eq!(args.selection.sector, Some(WindSector { min: 310, max: 80 }));
        assert_eq!(args.selection.background, BackgroundFilter::NonBackgroundOnly);
        assert_eq!(args.years, vec![2018, 2019]);
        assert_eq!(args.seed, Some(7));
        assert!(!args.append);
    }

    #[test]
    fn rejects_malformed_sector() {
        assert!(Cli::try_parse_from(["ch4co", "fit", "--wd", "north"]).is_err());
    }

    #[test]
    fn estimate_requires_inventory_and_years() {
        assert!(Cli::try_parse_from(["ch4co", "estimate", "--years", "2019"]).is_err());
        let cli = Cli::try_parse_from(["ch4co", "estimate", "--co-inventory", "co.txt", "--years", "2019"]).unwrap();
        assert!(matches!(cli.command, Command::Estimate(_)));
    }
}
