//! Emission inventory tables (EDGAR, ISPRA, ...).
//!
//! Whitespace-separated text with a header line. Recognised columns:
//!
//! - `year` (required)
//! - `month` (optional): month number or English month name
//! - `species` (optional): defaults to the species the caller expects
//! - `emission_tonnes` or `emi[t]` (required)
//! - `emission_error_tonnes` or `emi_err[t]` (optional, defaults to 0)

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use csv::StringRecord;

use crate::domain::{InventoryRecord, month_from_name};
use crate::emission::EmissionError;

const EMISSION_COLUMNS: [&str; 2] = ["emission_tonnes", "emi[t]"];
const ERROR_COLUMNS: [&str; 2] = ["emission_error_tonnes", "emi_err[t]"];

/// Inventory entries of one file.
#[derive(Debug, Clone, PartialEq)]
pub struct Inventory {
    pub source: PathBuf,
    pub records: Vec<InventoryRecord>,
}

impl Inventory {
    pub fn new(source: impl Into<PathBuf>, records: Vec<InventoryRecord>) -> Self {
        Self {
            source: source.into(),
            records,
        }
    }

    pub fn find(&self, species: &str, year: i32, month: Option<u32>) -> Option<&InventoryRecord> {
        self.records
            .iter()
            .find(|r| r.year == year && r.month == month && r.species.eq_ignore_ascii_case(species))
    }

    /// Like `find`, but a missing entry is an error.
    pub fn require(&self, species: &str, year: i32, month: Option<u32>) -> Result<&InventoryRecord, EmissionError> {
        self.find(species, year, month)
            .ok_or_else(|| EmissionError::MissingInventory {
                species: species.to_string(),
                year,
                month,
            })
    }
}

/// Read an inventory file; rows without a `species` column get `default_species`.
pub fn read_inventory(path: &Path, default_species: &str) -> Result<Inventory, EmissionError> {
    let parse_err = |line: usize, message: String| EmissionError::Parse {
        path: path.to_path_buf(),
        line,
        message,
    };

    let text = fs::read_to_string(path).map_err(|source| EmissionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let body = normalize_whitespace(&text);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b' ')
        .from_reader(body.as_bytes());

    let headers = reader.headers().map_err(|e| parse_err(1, e.to_string()))?.clone();
    let columns = header_map(&headers);
    let year_idx = *columns
        .get("year")
        .ok_or_else(|| parse_err(1, "missing column `year`".to_string()))?;
    let emission_idx = first_present(&columns, &EMISSION_COLUMNS)
        .ok_or_else(|| parse_err(1, "missing column `emission_tonnes` (or `emi[t]`)".to_string()))?;
    let error_idx = first_present(&columns, &ERROR_COLUMNS);
    let month_idx = columns.get("month").copied();
    let species_idx = columns.get("species").copied();

    let mut records = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|e| parse_err(line, e.to_string()))?;
        let field = |i: usize| record.get(i).map(str::trim).filter(|s| !s.is_empty());

        let year = field(year_idx)
            .and_then(|s| s.parse::<i32>().ok())
            .ok_or_else(|| parse_err(line, "invalid `year`".to_string()))?;
        let month = match month_idx.and_then(field) {
            None => None,
            Some(raw) => Some(parse_month(raw).ok_or_else(|| parse_err(line, format!("invalid month '{raw}'")))?),
        };
        let emission_t = field(emission_idx)
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| parse_err(line, "invalid emission value".to_string()))?;
        let emission_err_t = match error_idx.and_then(field) {
            None => 0.0,
            Some(raw) => raw
                .parse::<f64>()
                .map_err(|_| parse_err(line, format!("invalid emission error '{raw}'")))?,
        };
        let species = species_idx
            .and_then(field)
            .unwrap_or(default_species)
            .to_string();

        records.push(InventoryRecord {
            year,
            month,
            species,
            emission_t,
            emission_err_t,
        });
    }

    Ok(Inventory::new(path, records))
}

/// Collapse every run of spaces or tabs into one space and drop blank lines.
///
/// Line numbers reported in errors count non-blank lines.
fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let mut tokens = line.split_whitespace().peekable();
        if tokens.peek().is_none() {
            continue;
        }
        out.push_str(&tokens.collect::<Vec<_>>().join(" "));
        out.push('\n');
    }
    out
}

fn header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase(), idx))
        .collect()
}

fn first_present(columns: &HashMap<String, usize>, names: &[&str]) -> Option<usize> {
    names.iter().find_map(|n| columns.get(*n).copied())
}

fn parse_month(raw: &str) -> Option<u32> {
    match raw.parse::<u32>() {
        Ok(m) if (1..=12).contains(&m) => Some(m),
        Ok(_) => None,
        Err(_) => month_from_name(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn reads_legacy_column_names() {
        let dir = TempDir::new("inventory").unwrap();
        let path = dir.path().join("predicted_ER_CO_yearly_emi.txt");
        fs::write(&path, "year emi[t] emi_err[t]\n2018 100.0 10.0\n2019 120.5 11.0\n").unwrap();

        let inv = read_inventory(&path, "CO").unwrap();
        assert_eq!(inv.records.len(), 2);
        let r = inv.find("co", 2019, None).unwrap();
        assert_eq!(r.emission_t, 120.5);
        assert_eq!(r.emission_err_t, 11.0);
        assert_eq!(r.species, "CO");
    }

    #[test]
    fn monthly_rows_accept_names_and_numbers() {
        let dir = TempDir::new("inventory").unwrap();
        let path = dir.path().join("monthly.txt");
        fs::write(
            &path,
            "year month species emission_tonnes emission_error_tonnes\n2019 March CO 8 1\n2019 4 CO 9 1\n",
        )
        .unwrap();

        let inv = read_inventory(&path, "CO").unwrap();
        assert!(inv.find("CO", 2019, Some(3)).is_some());
        assert!(inv.find("CO", 2019, Some(4)).is_some());
        assert!(inv.find("CO", 2019, None).is_none());
    }

    #[test]
    fn missing_year_is_a_distinct_error() {
        let inv = Inventory::new(
            "mem",
            vec![InventoryRecord {
                year: 2019,
                month: None,
                species: "CO".to_string(),
                emission_t: 100.0,
                emission_err_t: 10.0,
            }],
        );
        assert!(inv.require("CO", 2019, None).is_ok());
        match inv.require("CO", 2021, None) {
            Err(EmissionError::MissingInventory { species, year, month }) => {
                assert_eq!((species.as_str(), year, month), ("CO", 2021, None));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn tabs_aligned_columns_and_trailing_spaces_are_accepted() {
        let dir = TempDir::new("inventory").unwrap();
        let files = [
            ("tabs.txt", "year\temission_tonnes\temission_error_tonnes\n2019\t100\t10\n"),
            (
                "aligned.txt",
                "year   emission_tonnes   emission_error_tonnes\n2019         100.0                    10.0\n",
            ),
            ("trailing.txt", "year emission_tonnes emission_error_tonnes \n2019 100 10 \n\n"),
        ];
        for (name, content) in files {
            let path = dir.path().join(name);
            fs::write(&path, content).unwrap();
            let inv = read_inventory(&path, "CO").unwrap();
            assert_eq!(inv.records.len(), 1, "{name}");
            let r = inv.find("CO", 2019, None).unwrap();
            assert_eq!((r.emission_t, r.emission_err_t), (100.0, 10.0), "{name}");
        }
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = TempDir::new("inventory").unwrap();
        let path = dir.path().join("absent.txt");
        assert!(matches!(read_inventory(&path, "CO"), Err(EmissionError::Io { .. })));
    }

    #[test]
    fn missing_emission_column_is_rejected() {
        let dir = TempDir::new("inventory").unwrap();
        let path = dir.path().join("bad.txt");
        fs::write(&path, "year total\n2019 1\n").unwrap();
        assert!(matches!(read_inventory(&path, "CO"), Err(EmissionError::Parse { .. })));
    }
}
