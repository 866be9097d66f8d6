//! Multi-station comparison plans.
//!
//! A plan is a JSON document listing stations, each with its own partition shape, the
//! years considered valid, and the inventories to compare against:
//!
//! ```json
//! {
//!   "stations": [
//!     {
//!       "shape": { "station": "CMN", "period_mode": "season", "sector": "110-270" },
//!       "years": [2018, 2019, 2020],
//!       "inventories": [
//!         { "label": "EDGAR", "co_path": "inv/ER_CO.txt", "ch4_path": "inv/ER_CH4.txt" },
//!         { "label": "ISPRA", "co_path": "inv/ISPRA_CO.txt", "years": [2019, 2020] }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! Relative inventory paths are resolved against the plan file's directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{EstimatedEmission, FitRecord, PartitionShape};
use crate::emission::{EmissionError, Inventory, SlopeFilter, estimate_yearly};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparePlan {
    pub stations: Vec<StationPlan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationPlan {
    pub shape: PartitionShape,
    pub years: Vec<i32>,
    #[serde(default)]
    pub min_r2: Option<f64>,
    pub inventories: Vec<InventorySource>,
}

impl StationPlan {
    pub fn slope_filter(&self) -> SlopeFilter {
        SlopeFilter {
            positive_only: true,
            robust_only: self.shape.robust_only,
            min_r2: self.min_r2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventorySource {
    pub label: String,
    pub co_path: PathBuf,
    #[serde(default)]
    pub ch4_path: Option<PathBuf>,
    /// Inclusive year range covered by this inventory.
    #[serde(default)]
    pub years: Option<[i32; 2]>,
}

impl InventorySource {
    /// Station years this source can be compared on.
    pub fn applicable_years(&self, station_years: &[i32]) -> Vec<i32> {
        station_years
            .iter()
            .copied()
            .filter(|y| self.years.is_none_or(|[from, to]| (from..=to).contains(y)))
            .collect()
    }
}

/// Estimates of one station against one inventory source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceEstimate {
    pub station: String,
    pub table: String,
    pub source: String,
    pub estimates: Vec<EstimatedEmission>,
}

pub fn load_plan(path: &Path) -> Result<ComparePlan, EmissionError> {
    let text = fs::read_to_string(path).map_err(|source| EmissionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut plan: ComparePlan = serde_json::from_str(&text).map_err(|e| EmissionError::Plan {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let base = path.parent().unwrap_or(Path::new(""));
    for station in &mut plan.stations {
        for source in &mut station.inventories {
            source.co_path = resolve(base, &source.co_path);
            source.ch4_path = source.ch4_path.as_deref().map(|p| resolve(base, p));
        }
    }
    Ok(plan)
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Yearly estimates of one station against one inventory source.
pub fn estimate_source(
    station: &StationPlan,
    rows: &[FitRecord],
    source: &InventorySource,
    co_inventory: &Inventory,
    ch4_inventory: Option<&Inventory>,
) -> Result<SourceEstimate, EmissionError> {
    let years = source.applicable_years(&station.years);
    let estimates = estimate_yearly(rows, &years, co_inventory, ch4_inventory, &station.slope_filter())?;
    Ok(SourceEstimate {
        station: station.shape.station.clone(),
        table: station.shape.table_file_name(),
        source: source.label.clone(),
        estimates,
    })
}
