//! Typed partition descriptors and the names derived from them.
//!
//! A `PartitionShape` is everything that stays fixed while a run scans years and
//! sub-periods; it alone determines the fit-table file name. A `PartitionDescriptor` adds
//! the concrete year/period and determines the plot path and the human-readable title.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::{
    BackgroundFilter, BackgroundSpecies, DayNightFilter, Period, PeriodMode, RowKey, WindSector,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionShape {
    pub station: String,
    pub period_mode: PeriodMode,
    #[serde(default)]
    pub sector: Option<WindSector>,
    #[serde(default)]
    pub day_night: DayNightFilter,
    #[serde(default)]
    pub background: BackgroundFilter,
    #[serde(default)]
    pub background_species: BackgroundSpecies,
    /// Robustness mode: tables are kept apart and estimates use robust slopes only.
    #[serde(default)]
    pub robust_only: bool,
}

impl PartitionShape {
    pub fn new(station: impl Into<String>, period_mode: PeriodMode) -> Self {
        Self {
            station: station.into(),
            period_mode,
            sector: None,
            day_night: DayNightFilter::Unfiltered,
            background: BackgroundFilter::Unfiltered,
            background_species: BackgroundSpecies::Co2,
            robust_only: false,
        }
    }

    /// File name of the fit-result table, e.g. `fit_results_season_WD310-80_non-bkg_co2.txt`.
    pub fn table_file_name(&self) -> String {
        let mut name = String::from("fit_results");
        match self.period_mode {
            PeriodMode::Month => name.push_str("_monthly"),
            PeriodMode::Season => name.push_str("_season"),
            PeriodMode::Year => {}
        }
        if let Some(sector) = self.sector {
            name.push_str(&format!("_WD{sector}"));
        }
        if let Some(tag) = self.day_night.tag() {
            name.push('_');
            name.push_str(tag);
        }
        if let Some(tag) = self.background_tag() {
            name.push('_');
            name.push_str(&tag);
        }
        if self.robust_only {
            name.push_str("_robust");
        }
        name.push_str(".txt");
        name
    }

    fn background_tag(&self) -> Option<String> {
        let species = self.background_species.label();
        match self.background {
            BackgroundFilter::Unfiltered => None,
            BackgroundFilter::BackgroundOnly => Some(format!("bkg_{species}")),
            BackgroundFilter::NonBackgroundOnly => Some(format!("non-bkg_{species}")),
        }
    }

    pub fn describe(&self, year: Option<i32>, period: Option<Period>) -> PartitionDescriptor {
        PartitionDescriptor {
            shape: self.clone(),
            year,
            period,
        }
    }
}

/// A single analysis window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionDescriptor {
    pub shape: PartitionShape,
    pub year: Option<i32>,
    pub period: Option<Period>,
}

impl PartitionDescriptor {
    pub fn table_file_name(&self) -> String {
        self.shape.table_file_name()
    }

    /// Label in the `month` column of the fit table.
    pub fn row_label(&self) -> String {
        self.period.map(Period::label).unwrap_or_else(|| "-".to_string())
    }

    /// Fit-table key; whole-table partitions (no year) use year 0.
    pub fn row_key(&self) -> RowKey {
        RowKey {
            year: self.year.unwrap_or(0),
            label: self.row_label(),
        }
    }

    /// Human-readable summary of the active selections, used as plot title.
    pub fn title(&self) -> String {
        let shape = &self.shape;
        let mut parts = vec![shape.station.clone()];
        if let Some(year) = self.year {
            parts.push(year.to_string());
        }
        if let Some(period) = self.period {
            parts.push(period.label());
        }
        if let Some(sector) = shape.sector {
            parts.push(format!("WD {sector}°"));
        }
        if let Some(tag) = shape.day_night.tag() {
            parts.push(format!("{tag}time"));
        }
        let species = shape.background_species.label();
        match shape.background {
            BackgroundFilter::Unfiltered => {}
            BackgroundFilter::BackgroundOnly => parts.push(format!("BaDS bkg {species}")),
            BackgroundFilter::NonBackgroundOnly => parts.push(format!("BaDS non-bkg {species}")),
        }
        if shape.robust_only {
            parts.push("robust".to_string());
        }
        parts.join(", ")
    }

    /// Directory (relative to the output root) holding plot artifacts for this partition.
    pub fn plot_dir(&self) -> PathBuf {
        let shape = &self.shape;
        let mut dir = PathBuf::from(&shape.station);
        if let Some(year) = self.year {
            dir.push(year.to_string());
        }
        if let Some(sector) = shape.sector {
            dir.push(format!("WD{sector}"));
        }
        if let Some(tag) = shape.day_night.tag() {
            dir.push(tag);
        }
        dir
    }

    /// Plot file stem, e.g. `scatter_fit_2019_DJF_WD310-80_day_non-bkg_co2`.
    pub fn plot_file_stem(&self) -> String {
        let shape = &self.shape;
        let mut stem = String::from("scatter_fit");
        if let Some(year) = self.year {
            stem.push_str(&format!("_{year}"));
        }
        if let Some(period) = self.period {
            stem.push('_');
            stem.push_str(&period.token());
        }
        if let Some(sector) = shape.sector {
            stem.push_str(&format!("_WD{sector}"));
        }
        if let Some(tag) = shape.day_night.tag() {
            stem.push('_');
            stem.push_str(tag);
        }
        if let Some(tag) = shape.background_tag() {
            stem.push('_');
            stem.push_str(&tag);
        }
        if shape.robust_only {
            stem.push_str("_robust");
        }
        stem
    }

    pub fn plot_path(&self, extension: &str) -> PathBuf {
        self.plot_dir()
            .join(format!("{}.{extension}", self.plot_file_stem()))
    }
}
