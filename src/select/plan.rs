//! Partition scan order.
//!
//! A run walks the configured years and, inside each year, the months or seasons that the
//! station actually has data for. Stations with a late-starting year (`CoverageGap`) only
//! attempt the sub-periods that begin on or after the first available month, and never the
//! DJF season of that year.

use crate::domain::{PartitionDescriptor, PartitionShape, Period, PeriodMode, RowKey, Season, StationConfig};

/// Months attempted for `year` at `station`.
pub fn months_for(station: &StationConfig, year: i32) -> Vec<u32> {
    let first = station.coverage_gap(year).map_or(1, |g| g.first_month.clamp(1, 12));
    (first..=12).collect()
}

/// Seasons attempted for `year` at `station`, in scan order.
pub fn seasons_for(station: &StationConfig, year: i32) -> Vec<Season> {
    match station.coverage_gap(year) {
        None => Season::ALL.to_vec(),
        Some(gap) => Season::ALL
            .into_iter()
            .filter(|s| *s != Season::Djf && s.first_month() >= gap.first_month)
            .collect(),
    }
}

/// Enumerate candidate partitions for a run.
///
/// Without year selection the whole table is a single partition.
pub fn plan_partitions(
    shape: &PartitionShape,
    station: &StationConfig,
    years: &[i32],
    year_selection: bool,
) -> Vec<PartitionDescriptor> {
    if !year_selection {
        return vec![shape.describe(None, None)];
    }

    let mut out = Vec::new();
    for &year in years {
        match shape.period_mode {
            PeriodMode::Year => out.push(shape.describe(Some(year), None)),
            PeriodMode::Month => out.extend(
                months_for(station, year)
                    .into_iter()
                    .map(|m| shape.describe(Some(year), Some(Period::Month(m)))),
            ),
            PeriodMode::Season => out.extend(
                seasons_for(station, year)
                    .into_iter()
                    .map(|s| shape.describe(Some(year), Some(Period::Season(s)))),
            ),
        }
    }
    out
}

/// Key of the last partition a complete scan would write.
pub fn final_key(plan: &[PartitionDescriptor]) -> Option<RowKey> {
    plan.last().map(PartitionDescriptor::row_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmn_2018_skips_first_months_and_djf() {
        let cmn = StationConfig::known("CMN").unwrap();
        assert_eq!(months_for(&cmn, 2018), (5..=12).collect::<Vec<_>>());
        assert_eq!(seasons_for(&cmn, 2018), vec![Season::Jja, Season::Son]);
        assert_eq!(months_for(&cmn, 2019).len(), 12);
        assert_eq!(seasons_for(&cmn, 2019), Season::ALL.to_vec());
    }

    #[test]
    fn plan_never_attempts_djf_in_a_partial_year() {
        let cmn = StationConfig::known("CMN").unwrap();
        let shape = PartitionShape::new("CMN", PeriodMode::Season);
        let plan = plan_partitions(&shape, &cmn, &[2018, 2019], true);
        assert!(!plan
            .iter()
            .any(|d| d.year == Some(2018) && d.period == Some(Period::Season(Season::Djf))));
        assert_eq!(plan.len(), 2 + 4);
        assert_eq!(final_key(&plan).unwrap().to_string(), "2019 SON");
    }

    #[test]
    fn whole_table_when_year_selection_is_off() {
        let cmn = StationConfig::known("CMN").unwrap();
        let shape = PartitionShape::new("CMN", PeriodMode::Year);
        let plan = plan_partitions(&shape, &cmn, &[2019, 2020], false);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].year, None);
    }
}
