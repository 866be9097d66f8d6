//! Individual selection criteria.
//!
//! Every filter takes rows in timestamp order and returns the matching rows in the same
//! order. An unset criterion returns its input unchanged.

use chrono::{Datelike, Duration, NaiveDate};

use crate::domain::{BackgroundFilter, DayNightFilter, Observation, Period, StationConfig, WindSector};
use crate::select::sun::{Daylight, daylight};

pub fn select_year(rows: &[Observation], year: i32) -> Vec<Observation> {
    rows.iter()
        .filter(|o| o.timestamp.year() == year)
        .copied()
        .collect()
}

/// Month or season of `year`. DJF takes December of `year` and January/February of `year + 1`.
pub fn select_period(rows: &[Observation], year: Option<i32>, period: Period) -> Vec<Observation> {
    rows.iter()
        .filter(|o| period.contains(year, &o.timestamp))
        .copied()
        .collect()
}

pub fn select_sector(rows: Vec<Observation>, sector: Option<WindSector>) -> Vec<Observation> {
    let Some(sector) = sector else {
        return rows;
    };
    rows.into_iter()
        .filter(|o| sector.contains(o.wind_direction))
        .collect()
}

/// Keep daytime or nighttime rows, with sunrise/sunset computed per calendar day (UTC).
pub fn select_day_night(rows: Vec<Observation>, filter: DayNightFilter, station: &StationConfig) -> Vec<Observation> {
    let want_day = match filter {
        DayNightFilter::Unfiltered => return rows,
        DayNightFilter::DayOnly => true,
        DayNightFilter::NightOnly => false,
    };

    let mut cached: Option<(NaiveDate, Daylight)> = None;
    rows.into_iter()
        .filter(|o| {
            let date = o.timestamp.date();
            let light = match cached {
                Some((d, light)) if d == date => light,
                _ => {
                    let light = daylight(date, station.latitude, station.longitude);
                    cached = Some((date, light));
                    light
                }
            };
            light.is_day(&o.timestamp) == want_day
        })
        .collect()
}

/// Background-state selection.
///
/// Non-background selection also applies the run-length rule: a row is kept only when the
/// gap to the previous row or to the next row of the selected subset exceeds `min_gap`.
pub fn select_background(rows: Vec<Observation>, filter: BackgroundFilter, min_gap: Duration) -> Vec<Observation> {
    match filter {
        BackgroundFilter::Unfiltered => rows,
        BackgroundFilter::BackgroundOnly => rows.into_iter().filter(|o| o.background == Some(true)).collect(),
        BackgroundFilter::NonBackgroundOnly => {
            let non_bkg: Vec<Observation> = rows.into_iter().filter(|o| o.background == Some(false)).collect();
            apply_run_length(&non_bkg, min_gap)
        }
    }
}

fn apply_run_length(rows: &[Observation], min_gap: Duration) -> Vec<Observation> {
    (0..rows.len())
        .filter(|&i| {
            let ts = rows[i].timestamp;
            let after_gap = i > 0 && ts - rows[i - 1].timestamp > min_gap;
            let before_gap = i + 1 < rows.len() && rows[i + 1].timestamp - ts > min_gap;
            after_gap || before_gap
        })
        .map(|i| rows[i])
        .collect()
}
