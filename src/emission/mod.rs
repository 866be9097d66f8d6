//! Emission estimation from stored fits and inventories.
//!
//! Responsibilities:
//!
//! - read emission inventories (`inventory`)
//! - scale CO inventories by the fitted CH4:CO slopes (`estimate`)
//! - run multi-station comparison plans (`aggregate`)

pub mod aggregate;
pub mod estimate;
pub mod inventory;

pub use aggregate::*;
pub use estimate::*;
pub use inventory::*;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmissionError {
    #[error("No valid CH4:CO slope for {year} in the fit table.")]
    NoValidSlopes { year: i32 },
    #[error("No {species} inventory entry for {}.", period_text(.year, .month))]
    MissingInventory {
        species: String,
        year: i32,
        month: Option<u32>,
    },
    #[error("Failed to read '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed inventory '{}' (line {line}): {message}", .path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("Invalid compare plan '{}': {message}", .path.display())]
    Plan { path: PathBuf, message: String },
}

fn period_text(year: &i32, month: &Option<u32>) -> String {
    match month {
        Some(m) => format!("{year}-{m:02}"),
        None => year.to_string(),
    }
}
