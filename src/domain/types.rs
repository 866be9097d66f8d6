use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDateTime};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One merged hourly record at a station.
///
/// `co` is the regression x-axis and `ch4` the y-axis. Concentrations are in ppb.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub timestamp: NaiveDateTime,
    pub co: f64,
    pub ch4: f64,
    pub co_stdev: f64,
    pub ch4_stdev: f64,
    /// Wind direction in degrees (meteorological convention).
    pub wind_direction: f64,
    /// Background flag from the background-detection dataset, when the station has one.
    pub background: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("duplicate timestamp {0} in observation table")]
pub struct DuplicateTimestamp(pub NaiveDateTime);

/// Observations of one station, sorted by timestamp with unique timestamps.
#[derive(Debug, Clone, Default)]
pub struct ObservationTable {
    rows: Vec<Observation>,
}

impl ObservationTable {
    pub fn new(mut rows: Vec<Observation>) -> Result<Self, DuplicateTimestamp> {
        rows.sort_by_key(|o| o.timestamp);
        for pair in rows.windows(2) {
            if pair[0].timestamp == pair[1].timestamp {
                return Err(DuplicateTimestamp(pair[0].timestamp));
            }
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct calendar years present, ascending.
    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.rows.iter().map(|o| o.timestamp.year()).collect();
        years.dedup();
        years
    }
}

/// Climatological season. DJF of year `Y` is December `Y` plus January/February `Y+1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Season {
    Djf,
    Mam,
    Jja,
    Son,
}

impl Season {
    /// Scan order used when iterating seasons of a year.
    pub const ALL: [Season; 4] = [Season::Djf, Season::Mam, Season::Jja, Season::Son];

    pub fn code(self) -> &'static str {
        match self {
            Season::Djf => "DJF",
            Season::Mam => "MAM",
            Season::Jja => "JJA",
            Season::Son => "SON",
        }
    }

    /// Calendar month that opens the season.
    pub fn first_month(self) -> u32 {
        match self {
            Season::Djf => 12,
            Season::Mam => 3,
            Season::Jja => 6,
            Season::Son => 9,
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Season::ALL.into_iter().find(|s| s.code() == code)
    }
}

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// English month name for `1..=12`.
pub fn month_name(month: u32) -> Option<&'static str> {
    MONTH_NAMES.get(month.checked_sub(1)? as usize).copied()
}

pub fn month_from_name(name: &str) -> Option<u32> {
    MONTH_NAMES
        .iter()
        .position(|m| *m == name)
        .map(|idx| idx as u32 + 1)
}

/// Sub-year analysis window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Month(u32),
    Season(Season),
}

impl Period {
    /// Label written in fit tables and titles (`March`, `DJF`).
    pub fn label(self) -> String {
        match self {
            Period::Month(m) => month_name(m).unwrap_or("?").to_string(),
            Period::Season(s) => s.code().to_string(),
        }
    }

    /// Short token used in plot file names (`3`, `DJF`).
    pub fn token(self) -> String {
        match self {
            Period::Month(m) => m.to_string(),
            Period::Season(s) => s.code().to_string(),
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        if let Some(m) = month_from_name(label) {
            return Some(Period::Month(m));
        }
        Season::from_code(label).map(Period::Season)
    }

    /// Whether `ts` falls into this period of `year` (any year when `year` is `None`).
    pub fn contains(self, year: Option<i32>, ts: &NaiveDateTime) -> bool {
        let (y, m) = (ts.year(), ts.month());
        match self {
            Period::Month(month) => m == month && year.is_none_or(|yy| yy == y),
            Period::Season(Season::Djf) => match year {
                Some(yy) => (y == yy && m == 12) || (y == yy + 1 && (m == 1 || m == 2)),
                None => matches!(m, 12 | 1 | 2),
            },
            Period::Season(season) => {
                let first = season.first_month();
                (first..first + 3).contains(&m) && year.is_none_or(|yy| yy == y)
            }
        }
    }
}

/// How the years are subdivided when scanning partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PeriodMode {
    /// One partition per year.
    Year,
    /// Twelve monthly partitions per year.
    Month,
    /// Four seasonal partitions per year.
    Season,
}

/// Circular wind-direction sector written as `min-max` degrees.
///
/// When `min < max` the sector is the open interval `(min, max)`; otherwise it wraps
/// through north and selects `wd > min || wd < max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WindSector {
    pub min: u16,
    pub max: u16,
}

impl WindSector {
    pub fn contains(self, wd: f64) -> bool {
        let (lo, hi) = (f64::from(self.min), f64::from(self.max));
        if self.min < self.max {
            wd > lo && wd < hi
        } else {
            wd > lo || wd < hi
        }
    }
}

impl fmt::Display for WindSector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

impl FromStr for WindSector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("Invalid wind sector '{s}': expected 'min-max' in degrees."))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u16>()
                .ok()
                .filter(|d| *d <= 360)
                .ok_or_else(|| format!("Invalid wind sector '{s}': '{v}' is not a direction in 0..=360."))
        };
        Ok(WindSector {
            min: parse(a)?,
            max: parse(b)?,
        })
    }
}

impl TryFrom<String> for WindSector {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WindSector> for String {
    fn from(value: WindSector) -> Self {
        value.to_string()
    }
}

/// Day/night selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DayNightFilter {
    #[default]
    Unfiltered,
    #[value(name = "day")]
    #[serde(rename = "day")]
    DayOnly,
    #[value(name = "night")]
    #[serde(rename = "night")]
    NightOnly,
}

impl DayNightFilter {
    pub fn tag(self) -> Option<&'static str> {
        match self {
            DayNightFilter::Unfiltered => None,
            DayNightFilter::DayOnly => Some("day"),
            DayNightFilter::NightOnly => Some("night"),
        }
    }
}

/// Background-state selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundFilter {
    #[default]
    Unfiltered,
    /// Keep only rows flagged as background.
    #[value(name = "bkg")]
    #[serde(rename = "bkg")]
    BackgroundOnly,
    /// Keep only non-background rows (with the run-length rule applied).
    #[value(name = "non-bkg")]
    #[serde(rename = "non-bkg")]
    NonBackgroundOnly,
}

/// Species whose background detection defines the background flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum BackgroundSpecies {
    #[default]
    #[value(name = "co2")]
    #[serde(rename = "co2")]
    Co2,
    /// Background only when both CO and CH4 are flagged.
    #[value(name = "co+ch4")]
    #[serde(rename = "co+ch4")]
    CoCh4,
}

impl BackgroundSpecies {
    pub fn label(self) -> &'static str {
        match self {
            BackgroundSpecies::Co2 => "co2",
            BackgroundSpecies::CoCh4 => "co+ch4",
        }
    }

    /// Columns of the background table that must all be positive for a background row.
    pub fn flag_columns(self) -> &'static [&'static str] {
        match self {
            BackgroundSpecies::Co2 => &["co2_bg2"],
            BackgroundSpecies::CoCh4 => &["co_bg2", "ch4_bg2"],
        }
    }
}

/// Year whose record starts late (instrument installed or data not yet released).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageGap {
    pub year: i32,
    /// First calendar month with data.
    pub first_month: u32,
}

/// Static description of a monitoring station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationConfig {
    pub code: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub coverage_gaps: Vec<CoverageGap>,
    /// Background species for which a background-detection dataset exists.
    #[serde(default)]
    pub background_species: Vec<BackgroundSpecies>,
}

impl StationConfig {
    /// Built-in station presets.
    pub fn known(code: &str) -> Option<Self> {
        let station = |lat: f64, lon: f64, gaps: Vec<CoverageGap>, species: Vec<BackgroundSpecies>| StationConfig {
            code: code.to_string(),
            latitude: lat,
            longitude: lon,
            coverage_gaps: gaps,
            background_species: species,
        };
        match code {
            "CMN" => Some(station(
                44.19433,
                10.70111,
                vec![CoverageGap { year: 2018, first_month: 5 }],
                vec![BackgroundSpecies::Co2, BackgroundSpecies::CoCh4],
            )),
            "LMP" => Some(station(35.51, 12.63, Vec::new(), vec![BackgroundSpecies::Co2])),
            "PUY" => Some(station(45.7719, 2.9658, Vec::new(), Vec::new())),
            "JFJ" => Some(station(46.5475, 7.9851, Vec::new(), Vec::new())),
            "HPB" => Some(station(47.8011, 11.0246, Vec::new(), Vec::new())),
            "OPE" => Some(station(48.5619, 5.5036, Vec::new(), Vec::new())),
            _ => None,
        }
    }

    pub fn coverage_gap(&self, year: i32) -> Option<CoverageGap> {
        self.coverage_gaps.iter().copied().find(|g| g.year == year)
    }

    pub fn supports_background(&self, species: BackgroundSpecies) -> bool {
        self.background_species.contains(&species)
    }
}

/// Subsampling robustness test settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RobustnessConfig {
    pub iterations: usize,
    /// Subsample fraction when a wind-sector filter is active.
    pub fraction: f64,
    /// Subsample fraction when the data is not divided by wind direction.
    pub undivided_fraction: f64,
    /// Coefficient-of-variation threshold below which a slope is robust.
    pub threshold: f64,
    /// Fixed seed for reproducible runs; `None` draws from system entropy.
    pub seed: Option<u64>,
}

impl Default for RobustnessConfig {
    fn default() -> Self {
        Self {
            iterations: 100,
            fraction: 0.4,
            undivided_fraction: 0.2,
            threshold: 0.3,
            seed: None,
        }
    }
}

impl RobustnessConfig {
    pub fn fraction_for(&self, sector_filtered: bool) -> f64 {
        if sector_filtered {
            self.fraction
        } else {
            self.undivided_fraction
        }
    }
}

/// Regression engine settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub robustness: RobustnessConfig,
    /// Seed of the pair sampler used by Theil–Sen on large inputs.
    pub theil_sen_seed: u64,
    /// Maximum number of point pairs Theil–Sen considers.
    pub theil_sen_max_pairs: usize,
    /// Spacing (ppb) of the x grid used for plot lines.
    pub line_step: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            robustness: RobustnessConfig::default(),
            theil_sen_seed: 42,
            theil_sen_max_pairs: 10_000,
            line_step: 1.0,
        }
    }
}

/// How rows are de-duplicated when appended to an existing fit table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DedupMode {
    /// Skip rows whose `(year, label)` key is already present.
    #[default]
    Keyed,
    /// Legacy heuristic: skip when the last row equals the run's final expected key.
    TailLabel,
}

/// A full fit run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults) and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub station: StationConfig,
    pub years: Vec<i32>,
    /// Whether partitions are restricted to calendar years at all.
    pub year_selection: bool,
    pub shape: crate::domain::PartitionShape,
    pub engine: EngineConfig,
    /// Minimum gap that keeps a non-background row (run-length rule).
    pub min_run_gap: Duration,
    pub output_dir: PathBuf,
    pub dedup: DedupMode,
    /// Remove existing fit tables before the run.
    pub fresh: bool,
    pub export_plot_data: bool,
}

/// One row of a fit-result table.
#[derive(Debug, Clone, PartialEq)]
pub struct FitRecord {
    pub year: i32,
    /// Month name, season code, or `-` for whole-year partitions.
    pub label: String,
    pub slope: f64,
    pub slope_sd: f64,
    pub red_chi2: f64,
    pub mean_slope_sub: f64,
    pub slope_sd_sub: f64,
    pub r2: f64,
    pub robust: bool,
}

impl FitRecord {
    pub fn key(&self) -> RowKey {
        RowKey {
            year: self.year,
            label: self.label.clone(),
        }
    }
}

/// Identity of a fit-table row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey {
    pub year: i32,
    pub label: String,
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.year, self.label)
    }
}

/// One entry of an emission inventory (EDGAR, ISPRA, ...).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryRecord {
    pub year: i32,
    pub month: Option<u32>,
    pub species: String,
    pub emission_t: f64,
    pub emission_err_t: f64,
}

/// CH4 emission estimated from a CH4:CO slope and a CO inventory total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimatedEmission {
    pub year: i32,
    pub month: Option<u32>,
    pub mean_slope: f64,
    /// Number of sub-partition slopes averaged into `mean_slope`.
    pub n_slopes: usize,
    pub co_emission_t: f64,
    pub ch4_t: f64,
    pub ch4_err_t: f64,
    /// Inventory CH4 value for the same period, when available.
    pub reference: Option<InventoryRecord>,
}
