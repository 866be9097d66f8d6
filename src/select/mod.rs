//! Time-series selection: carve the merged observation table into analysis windows.
//!
//! Responsibilities:
//!
//! - per-criterion filters (period, wind sector, day/night, background)
//! - the partition scan order (`plan`)
//! - validating selection settings before any data is touched

pub mod filters;
pub mod plan;
pub mod sun;

pub use filters::*;
pub use plan::*;

use chrono::Duration;
use log::debug;
use thiserror::Error;

use crate::domain::{
    BackgroundFilter, Observation, PartitionDescriptor, PartitionShape, PeriodMode, StationConfig,
};

/// Minimum number of rows a partition needs to be worth fitting.
pub const MIN_PARTITION_ROWS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectError {
    #[error("Both month and season selection requested; choose one.")]
    MonthAndSeason,
    #[error("Station {station} has no background-detection dataset for species '{species}'.")]
    UnsupportedBackground { station: String, species: String },
    #[error("Unknown station '{0}': pass --lat and --lon to describe it.")]
    UnknownStation(String),
}

/// Resolve the month/season flags into a period mode.
pub fn period_mode_from_flags(month: bool, season: bool) -> Result<PeriodMode, SelectError> {
    match (month, season) {
        (true, true) => Err(SelectError::MonthAndSeason),
        (true, false) => Ok(PeriodMode::Month),
        (false, true) => Ok(PeriodMode::Season),
        (false, false) => Ok(PeriodMode::Year),
    }
}

/// Check that a background selection is backed by data at this station.
pub fn check_background(station: &StationConfig, shape: &PartitionShape) -> Result<(), SelectError> {
    if shape.background == BackgroundFilter::Unfiltered || station.supports_background(shape.background_species) {
        return Ok(());
    }
    Err(SelectError::UnsupportedBackground {
        station: station.code.clone(),
        species: shape.background_species.label().to_string(),
    })
}

/// Applies a partition descriptor to a station's observations.
#[derive(Debug, Clone)]
pub struct Selector<'a> {
    station: &'a StationConfig,
    min_run_gap: Duration,
}

impl<'a> Selector<'a> {
    pub fn new(station: &'a StationConfig, min_run_gap: Duration) -> Self {
        Self { station, min_run_gap }
    }

    /// Rows matching every criterion of `descriptor`.
    ///
    /// Criteria are applied in the order period, day/night, wind sector, background; the
    /// run-length rule therefore sees gaps inside the already narrowed subset.
    pub fn select(&self, rows: &[Observation], descriptor: &PartitionDescriptor) -> Vec<Observation> {
        let shape = &descriptor.shape;
        let subset = match (descriptor.year, descriptor.period) {
            (year, Some(period)) => select_period(rows, year, period),
            (Some(year), None) => select_year(rows, year),
            (None, None) => rows.to_vec(),
        };
        let subset = select_day_night(subset, shape.day_night, self.station);
        let subset = select_sector(subset, shape.sector);
        let subset = select_background(subset, shape.background, self.min_run_gap);
        debug!("{}: {} rows selected", descriptor.title(), subset.len());
        subset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BackgroundSpecies, Period};
    use chrono::{Datelike, NaiveDate};

    fn hourly_year(year: i32) -> Vec<Observation> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let end = NaiveDate::from_ymd_opt(year + 1, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let mut rows = Vec::new();
        let mut ts = start;
        let mut i = 0u32;
        while ts < end {
            rows.push(Observation {
                timestamp: ts,
                co: 100.0 + f64::from(i % 50),
                ch4: 1900.0 + f64::from(i % 37),
                co_stdev: 1.0,
                ch4_stdev: 1.0,
                wind_direction: f64::from((i * 7) % 360),
                background: Some(i % 3 == 0),
            });
            ts += Duration::hours(1);
            i += 1;
        }
        rows
    }

    #[test]
    fn month_and_season_together_is_fatal() {
        assert_eq!(period_mode_from_flags(true, true), Err(SelectError::MonthAndSeason));
        assert_eq!(period_mode_from_flags(false, false), Ok(PeriodMode::Year));
    }

    #[test]
    fn monthly_partitions_are_disjoint_and_cover_the_year() {
        let rows = hourly_year(2019);
        let station = StationConfig::known("PUY").unwrap();
        let shape = PartitionShape::new("PUY", PeriodMode::Month);
        let selector = Selector::new(&station, Duration::hours(1));
        let plan = plan_partitions(&shape, &station, &[2019], true);
        assert_eq!(plan.len(), 12);

        let mut seen = std::collections::HashSet::new();
        for d in &plan {
            let subset = selector.select(&rows, d);
            assert!(subset.len() >= MIN_PARTITION_ROWS);
            let Some(Period::Month(m)) = d.period else {
                panic!("monthly plan produced {:?}", d.period);
            };
            for o in subset {
                assert_eq!(o.timestamp.month(), m);
                assert!(seen.insert(o.timestamp), "row in two partitions");
            }
        }
        assert_eq!(seen.len(), rows.len());
    }

    #[test]
    fn background_selection_requires_a_dataset() {
        let puy = StationConfig::known("PUY").unwrap();
        let mut shape = PartitionShape::new("PUY", PeriodMode::Season);
        assert!(check_background(&puy, &shape).is_ok());

        shape.background = BackgroundFilter::NonBackgroundOnly;
        assert!(matches!(
            check_background(&puy, &shape),
            Err(SelectError::UnsupportedBackground { .. })
        ));

        let lmp = StationConfig::known("LMP").unwrap();
        shape.background_species = BackgroundSpecies::CoCh4;
        assert!(check_background(&lmp, &shape).is_err());
        shape.background_species = BackgroundSpecies::Co2;
        assert!(check_background(&lmp, &shape).is_ok());
    }
}
