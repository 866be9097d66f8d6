//! Sunrise and sunset times (UTC) for a fixed site.
//!
//! Uses the almanac algorithm with the official zenith of 90°50' (refraction plus solar
//! radius). Accuracy is about a minute at mid latitudes, which is far finer than the hourly
//! data the day/night split is applied to.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};

const ZENITH_DEG: f64 = 90.833;

/// Daylight situation on a given date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Daylight {
    /// Regular day with sunrise and sunset (UTC, sunset after sunrise).
    Normal {
        sunrise: NaiveDateTime,
        sunset: NaiveDateTime,
    },
    /// Polar day: the sun never sets.
    AlwaysUp,
    /// Polar night: the sun never rises.
    AlwaysDown,
}

impl Daylight {
    /// Whether `ts` lies strictly between sunrise and sunset.
    pub fn is_day(&self, ts: &NaiveDateTime) -> bool {
        match *self {
            Daylight::Normal { sunrise, sunset } => *ts > sunrise && *ts < sunset,
            Daylight::AlwaysUp => true,
            Daylight::AlwaysDown => false,
        }
    }
}

enum Event {
    Rise,
    Set,
}

/// Compute the daylight situation at (`latitude`, `longitude`) in degrees (east positive).
pub fn daylight(date: NaiveDate, latitude: f64, longitude: f64) -> Daylight {
    let rise = event_hour(date, latitude, longitude, Event::Rise);
    let set = event_hour(date, latitude, longitude, Event::Set);
    match (rise, set) {
        (Ok(rise_h), Ok(set_h)) => {
            let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
            let sunrise = midnight + hours(rise_h);
            let mut sunset = midnight + hours(set_h);
            if sunset < sunrise {
                sunset += Duration::days(1);
            }
            Daylight::Normal { sunrise, sunset }
        }
        (Err(situation), _) | (_, Err(situation)) => situation,
    }
}

fn hours(h: f64) -> Duration {
    Duration::milliseconds((h * 3_600_000.0).round() as i64)
}

fn event_hour(date: NaiveDate, latitude: f64, longitude: f64, event: Event) -> Result<f64, Daylight> {
    let day_of_year = f64::from(date.ordinal());
    let lng_hour = longitude / 15.0;
    let t = match event {
        Event::Rise => day_of_year + (6.0 - lng_hour) / 24.0,
        Event::Set => day_of_year + (18.0 - lng_hour) / 24.0,
    };

    // Sun's mean anomaly and true longitude.
    let m = 0.9856 * t - 3.289;
    let l = normalize(
        m + 1.916 * sin_deg(m) + 0.020 * sin_deg(2.0 * m) + 282.634,
        360.0,
    );

    // Right ascension, in the same quadrant as L, in hours.
    let mut ra = normalize((0.91764 * tan_deg(l)).atan().to_degrees(), 360.0);
    let l_quadrant = (l / 90.0).floor() * 90.0;
    let ra_quadrant = (ra / 90.0).floor() * 90.0;
    ra = (ra + l_quadrant - ra_quadrant) / 15.0;

    let sin_dec = 0.39782 * sin_deg(l);
    let cos_dec = sin_dec.asin().cos();

    let cos_h = (cos_deg(ZENITH_DEG) - sin_dec * sin_deg(latitude)) / (cos_dec * cos_deg(latitude));
    if cos_h > 1.0 {
        return Err(Daylight::AlwaysDown);
    }
    if cos_h < -1.0 {
        return Err(Daylight::AlwaysUp);
    }

    let h = match event {
        Event::Rise => 360.0 - cos_h.acos().to_degrees(),
        Event::Set => cos_h.acos().to_degrees(),
    } / 15.0;

    let local_mean = h + ra - 0.06571 * t - 6.622;
    Ok(normalize(local_mean - lng_hour, 24.0))
}

fn normalize(value: f64, period: f64) -> f64 {
    value.rem_euclid(period)
}

fn sin_deg(d: f64) -> f64 {
    d.to_radians().sin()
}

fn cos_deg(d: f64) -> f64 {
    d.to_radians().cos()
}

fn tan_deg(d: f64) -> f64 {
    d.to_radians().tan()
}
