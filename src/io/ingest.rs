//! Station data ingest.
//!
//! Turns the ICOS L2 hourly tables of one station (CH4, CO, meteorology) and an optional
//! background-detection table into a merged `ObservationTable`.
//!
//! L2 tables are `;`-separated with a free-text preamble. Line 5 of the file announces the
//! number of header lines as its fourth space-separated token; the column header is the
//! last of those lines. Rows flagged `N` or `K`, or with a missing value, are dropped. The
//! tables are inner-joined on the timestamp.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use log::{info, warn};
use thiserror::Error;

use crate::domain::{BackgroundSpecies, DuplicateTimestamp, Observation, ObservationTable};

/// Data-quality flags marking an L2 row as unusable.
const INVALID_FLAGS: [&str; 2] = ["N", "K"];
const BACKGROUND_DATE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to read '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("'{}' is not an L2 table: {message}", .path.display())]
    Preamble { path: PathBuf, message: String },
    #[error("Missing required column `{column}` in '{}'.", .path.display())]
    MissingColumn { path: PathBuf, column: String },
    #[error("Failed to parse '{}': {message}", .path.display())]
    Csv { path: PathBuf, message: String },
    #[error("Duplicate timestamp {timestamp} in '{}'.", .path.display())]
    DuplicateRow { path: PathBuf, timestamp: NaiveDateTime },
    #[error(transparent)]
    Duplicate(#[from] DuplicateTimestamp),
    #[error("No observations left after merging the {station} tables.")]
    Empty { station: String },
}

/// Input files of one station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationFiles {
    pub ch4: PathBuf,
    pub co: PathBuf,
    pub met: PathBuf,
    pub background: Option<PathBuf>,
}

impl StationFiles {
    /// `<dir>/<prefix>.CH4`, `<dir>/<prefix>.CO` and `<dir>/<prefix>.MTO`.
    pub fn from_prefix(dir: &Path, prefix: &str, background: Option<PathBuf>) -> Self {
        Self {
            ch4: dir.join(format!("{prefix}.CH4")),
            co: dir.join(format!("{prefix}.CO")),
            met: dir.join(format!("{prefix}.MTO")),
            background,
        }
    }
}

/// Value and its standard deviation at one timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub value: f64,
    pub stdev: f64,
}

/// Row counts of one ingested table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    pub rows_read: usize,
    pub rows_dropped: usize,
}

#[derive(Debug, Clone)]
pub struct IngestedStation {
    pub table: ObservationTable,
    pub ch4: TableStats,
    pub co: TableStats,
    pub met: TableStats,
    /// Merged rows lost because one of the tables had no entry at that timestamp.
    pub unmatched: usize,
}

/// Load and merge all tables of a station.
pub fn load_station(
    station: &str,
    files: &StationFiles,
    species: BackgroundSpecies,
) -> Result<IngestedStation, IngestError> {
    let (ch4, ch4_stats) = read_l2_species(&files.ch4, "ch4")?;
    let (co, co_stats) = read_l2_species(&files.co, "co")?;
    let (wind, met_stats) = read_l2_wind(&files.met)?;
    let background = match &files.background {
        Some(path) => Some(read_background(path, species)?),
        None => None,
    };

    let mut rows = Vec::with_capacity(ch4.len());
    let mut unmatched = 0usize;
    for (ts, c) in &ch4 {
        let (Some(o), Some(wd)) = (co.get(ts), wind.get(ts)) else {
            unmatched += 1;
            continue;
        };
        let flag = match &background {
            Some(map) => match map.get(ts) {
                Some(b) => Some(*b),
                None => {
                    unmatched += 1;
                    continue;
                }
            },
            None => None,
        };
        rows.push(Observation {
            timestamp: *ts,
            co: o.value,
            ch4: c.value,
            co_stdev: o.stdev,
            ch4_stdev: c.stdev,
            wind_direction: *wd,
            background: flag,
        });
    }

    if rows.is_empty() {
        return Err(IngestError::Empty {
            station: station.to_string(),
        });
    }
    info!(
        "{station}: merged {} hourly rows (CH4 dropped {}, CO dropped {}, MET dropped {}, unmatched {unmatched})",
        rows.len(),
        ch4_stats.rows_dropped,
        co_stats.rows_dropped,
        met_stats.rows_dropped
    );

    Ok(IngestedStation {
        table: ObservationTable::new(rows)?,
        ch4: ch4_stats,
        co: co_stats,
        met: met_stats,
        unmatched,
    })
}

/// Read a species table; `column` is the value column (`ch4`, `co`).
pub fn read_l2_species(
    path: &Path,
    column: &str,
) -> Result<(BTreeMap<NaiveDateTime, Measurement>, TableStats), IngestError> {
    let body = l2_body(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());
    let columns = header_map(path, &mut reader)?;
    let value_idx = require(path, &columns, column)?;
    let stdev_idx = require(path, &columns, "stdev")?;
    let flag_idx = require(path, &columns, "flag")?;
    let time_idx = time_columns(path, &columns)?;

    let mut out = BTreeMap::new();
    let mut stats = TableStats::default();
    for result in reader.records() {
        stats.rows_read += 1;
        let record = result.map_err(|e| csv_err(path, e))?;
        let Some(ts) = parse_timestamp(&record, &time_idx) else {
            stats.rows_dropped += 1;
            continue;
        };
        let (Some(value), true) = (
            field_f64(&record, value_idx).filter(|v| *v >= 0.0),
            flag_ok(&record, flag_idx),
        ) else {
            stats.rows_dropped += 1;
            continue;
        };
        let stdev = field_f64(&record, stdev_idx)
            .filter(|v| *v >= 0.0)
            .unwrap_or(f64::NAN);
        if out.insert(ts, Measurement { value, stdev }).is_some() {
            return Err(IngestError::DuplicateRow {
                path: path.to_path_buf(),
                timestamp: ts,
            });
        }
    }
    warn_dropped(path, stats);
    Ok((out, stats))
}

/// Read wind direction (`WD`, `WD-Flag`) from a meteorological table.
pub fn read_l2_wind(path: &Path) -> Result<(BTreeMap<NaiveDateTime, f64>, TableStats), IngestError> {
    let body = l2_body(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());
    let columns = header_map(path, &mut reader)?;
    let wd_idx = require(path, &columns, "wd")?;
    let flag_idx = require(path, &columns, "wd-flag")?;
    let time_idx = time_columns(path, &columns)?;

    let mut out = BTreeMap::new();
    let mut stats = TableStats::default();
    for result in reader.records() {
        stats.rows_read += 1;
        let record = result.map_err(|e| csv_err(path, e))?;
        let ts = parse_timestamp(&record, &time_idx);
        let wd = field_f64(&record, wd_idx).filter(|v| (0.0..=360.0).contains(v));
        match (ts, wd) {
            (Some(ts), Some(wd)) if flag_ok(&record, flag_idx) => {
                if out.insert(ts, wd).is_some() {
                    return Err(IngestError::DuplicateRow {
                        path: path.to_path_buf(),
                        timestamp: ts,
                    });
                }
            }
            _ => stats.rows_dropped += 1,
        }
    }
    warn_dropped(path, stats);
    Ok((out, stats))
}

/// Read the background-detection table.
///
/// A row is background when every flag column of `species` is positive; `NA` counts as
/// not background.
pub fn read_background(path: &Path, species: BackgroundSpecies) -> Result<HashMap<NaiveDateTime, bool>, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| csv_err(path, e))?;
    let columns = header_map(path, &mut reader)?;
    let date_idx = require(path, &columns, "date")?;
    let flag_idx: Vec<usize> = species
        .flag_columns()
        .iter()
        .map(|c| require(path, &columns, c))
        .collect::<Result<_, _>>()?;

    let mut out = HashMap::new();
    for result in reader.records() {
        let record = result.map_err(|e| csv_err(path, e))?;
        let Some(ts) = record.get(date_idx).and_then(parse_background_date) else {
            continue;
        };
        let background = flag_idx
            .iter()
            .all(|&i| field_f64(&record, i).is_some_and(|v| v > 0.0));
        out.insert(ts, background);
    }
    Ok(out)
}

/// Text of an L2 file starting at its column header line.
fn l2_body(path: &Path) -> Result<String, IngestError> {
    let text = fs::read_to_string(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let preamble_err = |message: String| IngestError::Preamble {
        path: path.to_path_buf(),
        message,
    };
    let line5 = text
        .lines()
        .nth(4)
        .ok_or_else(|| preamble_err("fewer than 5 lines".to_string()))?;
    let header_lines = line5
        .split(' ')
        .nth(3)
        .and_then(|t| t.trim().parse::<usize>().ok())
        .filter(|n| *n >= 1)
        .ok_or_else(|| preamble_err(format!("cannot read the header line count from '{line5}'")))?;

    Ok(text.lines().skip(header_lines - 1).collect::<Vec<_>>().join("\n"))
}

fn header_map<R: std::io::Read>(
    path: &Path,
    reader: &mut csv::Reader<R>,
) -> Result<HashMap<String, usize>, IngestError> {
    let headers = reader.headers().map_err(|e| csv_err(path, e))?;
    Ok(headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase(), idx))
        .collect())
}

fn require(path: &Path, columns: &HashMap<String, usize>, name: &str) -> Result<usize, IngestError> {
    columns.get(name).copied().ok_or_else(|| IngestError::MissingColumn {
        path: path.to_path_buf(),
        column: name.to_string(),
    })
}

fn time_columns(path: &Path, columns: &HashMap<String, usize>) -> Result<[usize; 5], IngestError> {
    Ok([
        require(path, columns, "year")?,
        require(path, columns, "month")?,
        require(path, columns, "day")?,
        require(path, columns, "hour")?,
        require(path, columns, "minute")?,
    ])
}

fn parse_timestamp(record: &StringRecord, idx: &[usize; 5]) -> Option<NaiveDateTime> {
    let part = |i: usize| record.get(idx[i])?.trim().parse::<u32>().ok();
    let year = record.get(idx[0])?.trim().parse::<i32>().ok()?;
    NaiveDate::from_ymd_opt(year, part(1)?, part(2)?)?.and_hms_opt(part(3)?, part(4)?, 0)
}

fn parse_background_date(raw: &str) -> Option<NaiveDateTime> {
    BACKGROUND_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw.trim(), fmt).ok())
}

fn field_f64(record: &StringRecord, idx: usize) -> Option<f64> {
    record
        .get(idx)?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

fn flag_ok(record: &StringRecord, idx: usize) -> bool {
    record
        .get(idx)
        .map(str::trim)
        .is_some_and(|f| !INVALID_FLAGS.contains(&f))
}

fn csv_err(path: &Path, e: csv::Error) -> IngestError {
    IngestError::Csv {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

fn warn_dropped(path: &Path, stats: TableStats) {
    if stats.rows_dropped > 0 {
        warn!(
            "{}: dropped {} of {} rows (flagged or missing values)",
            path.display(),
            stats.rows_dropped,
            stats.rows_read
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    const PREAMBLE: &str = "# TITLE: test\n# FILE NAME: x\n# DATA VERSION: 1\n# CONTACT POINT: nobody\n# HEADER LINES: 6\n";

    fn species_file(column: &str, rows: &[(u32, f64, &str)]) -> String {
        let mut text = String::from(PREAMBLE);
        text.push_str(&format!(
            "#Site;SamplingHeight;Year;Month;Day;Hour;Minute;DecimalDate;{column};Stdev;NbPoints;Flag\n"
        ));
        for (hour, value, flag) in rows {
            text.push_str(&format!("CMN;8.0;2019;6;1;{hour};0;2019.41;{value};1.5;60;{flag}\n"));
        }
        text
    }

    fn met_file(rows: &[(u32, f64, &str)]) -> String {
        let mut text = String::from(PREAMBLE);
        text.push_str("#Site;SamplingHeight;Year;Month;Day;Hour;Minute;DecimalDate;WD;WD-Flag;WS;WS-Flag\n");
        for (hour, wd, flag) in rows {
            text.push_str(&format!("CMN;8.0;2019;6;1;{hour};0;2019.41;{wd};{flag};3.0;O\n"));
        }
        text
    }

    #[test]
    fn header_count_comes_from_line_five() {
        let dir = TempDir::new("ingest").unwrap();
        let path = dir.path().join("x.CO");
        fs::write(&path, species_file("co", &[(0, 120.0, "O"), (1, 121.0, "N"), (2, -999.99, "O")])).unwrap();

        let (rows, stats) = read_l2_species(&path, "co").unwrap();
        assert_eq!(stats.rows_read, 3);
        assert_eq!(stats.rows_dropped, 2);
        assert_eq!(rows.len(), 1);
        let m = rows.values().next().unwrap();
        assert_eq!(m.value, 120.0);
        assert_eq!(m.stdev, 1.5);
    }

    #[test]
    fn bad_preamble_is_rejected() {
        let dir = TempDir::new("ingest").unwrap();
        let path = dir.path().join("x.CO");
        fs::write(&path, "a\nb\nc\nd\n# HEADER LINES: many\n").unwrap();
        assert!(matches!(read_l2_species(&path, "co"), Err(IngestError::Preamble { .. })));
    }

    #[test]
    fn tables_are_inner_joined_with_background() {
        let dir = TempDir::new("ingest").unwrap();
        let files = StationFiles::from_prefix(dir.path(), "CMN_L2", Some(dir.path().join("bads.csv")));
        fs::write(&files.ch4, species_file("ch4", &[(0, 1950.0, "O"), (1, 1960.0, "O"), (2, 1970.0, "O")])).unwrap();
        fs::write(&files.co, species_file("co", &[(0, 120.0, "O"), (1, 125.0, "K"), (2, 130.0, "O")])).unwrap();
        fs::write(&files.met, met_file(&[(0, 200.0, "O"), (1, 210.0, "O"), (2, 220.0, "O")])).unwrap();
        fs::write(
            dir.path().join("bads.csv"),
            "date,co2_bg2,co_bg2,ch4_bg2\n2019-06-01 00:00:00,1,1,NA\n2019-06-01 02:00:00,NA,1,1\n",
        )
        .unwrap();

        let merged = load_station("CMN", &files, BackgroundSpecies::Co2).unwrap();
        let rows = merged.table.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].background, Some(true));
        assert_eq!(rows[1].background, Some(false));
        assert_eq!(rows[1].wind_direction, 220.0);

        let both = load_station("CMN", &files, BackgroundSpecies::CoCh4).unwrap();
        assert_eq!(both.table.rows()[0].background, Some(false));
        assert_eq!(both.table.rows()[1].background, Some(true));
    }

    #[test]
    fn nothing_to_merge_is_insufficient_data() {
        let dir = TempDir::new("ingest").unwrap();
        let files = StationFiles::from_prefix(dir.path(), "PUY_L2", None);
        fs::write(&files.ch4, species_file("ch4", &[(0, 1950.0, "O")])).unwrap();
        fs::write(&files.co, species_file("co", &[(1, 120.0, "O")])).unwrap();
        fs::write(&files.met, met_file(&[(0, 200.0, "O")])).unwrap();
        assert!(matches!(
            load_station("PUY", &files, BackgroundSpecies::Co2),
            Err(IngestError::Empty { .. })
        ));
    }
}
