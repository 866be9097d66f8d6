//! Text layout of a fit-result table.
//!
//! ```text
//! year month slope slope_sd red_chi2 mean_slope_sub slope_sd_sub r2 robust
//! 2019 DJF 0.62 0.03 1.254 0.618 0.041 0.712 True
//! ```
//!
//! Columns are separated by a single space. Non-finite numbers are written `nan`/`inf`.

use std::collections::HashMap;

use csv::StringRecord;

use crate::domain::FitRecord;

pub const HEADER: &str = "year month slope slope_sd red_chi2 mean_slope_sub slope_sd_sub r2 robust";

const COLUMNS: [&str; 9] = [
    "year",
    "month",
    "slope",
    "slope_sd",
    "red_chi2",
    "mean_slope_sub",
    "slope_sd_sub",
    "r2",
    "robust",
];

/// Format `value` with `decimals` places; non-finite values use lowercase names.
pub fn fixed(value: f64, decimals: usize) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        let name = if value > 0.0 { "inf" } else { "-inf" };
        name.to_string()
    } else {
        format!("{value:.decimals$}")
    }
}

pub fn format_row(record: &FitRecord) -> String {
    format!(
        "{} {} {} {} {} {} {} {} {}",
        record.year,
        record.label,
        fixed(record.slope, 2),
        fixed(record.slope_sd, 2),
        fixed(record.red_chi2, 3),
        fixed(record.mean_slope_sub, 3),
        fixed(record.slope_sd_sub, 3),
        fixed(record.r2, 3),
        if record.robust { "True" } else { "False" },
    )
}

/// Column positions by name; a table must carry every column.
pub fn column_map(headers: &StringRecord) -> Result<HashMap<String, usize>, String> {
    let map: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim().to_ascii_lowercase(), idx))
        .collect();
    if let Some(missing) = COLUMNS.iter().find(|c| !map.contains_key(**c)) {
        return Err(format!("missing column `{missing}`"));
    }
    Ok(map)
}

pub fn parse_row(record: &StringRecord, columns: &HashMap<String, usize>) -> Result<FitRecord, String> {
    let field = |name: &str| -> Result<&str, String> {
        columns
            .get(name)
            .and_then(|idx| record.get(*idx))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| format!("missing value `{name}`"))
    };
    let number = |name: &str| -> Result<f64, String> {
        let raw = field(name)?;
        raw.parse::<f64>()
            .map_err(|_| format!("invalid number '{raw}' in `{name}`"))
    };

    let year_raw = field("year")?;
    let year = year_raw
        .parse::<i32>()
        .map_err(|_| format!("invalid year '{year_raw}'"))?;
    let robust = match field("robust")? {
        "True" | "true" | "1" => true,
        "False" | "false" | "0" => false,
        other => return Err(format!("invalid robust flag '{other}'")),
    };

    Ok(FitRecord {
        year,
        label: field("month")?.to_string(),
        slope: number("slope")?,
        slope_sd: number("slope_sd")?,
        red_chi2: number("red_chi2")?,
        mean_slope_sub: number("mean_slope_sub")?,
        slope_sd_sub: number("slope_sd_sub")?,
        r2: number("r2")?,
        robust,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> FitRecord {
        FitRecord {
            year: 2019,
            label: "DJF".to_string(),
            slope: 0.456789,
            slope_sd: 0.031,
            red_chi2: f64::NAN,
            mean_slope_sub: 0.4512,
            slope_sd_sub: 0.0409,
            r2: 0.71234,
            robust: true,
        }
    }

    #[test]
    fn row_uses_fixed_precision_and_nan() {
        assert_eq!(format_row(&record()), "2019 DJF 0.46 0.03 nan 0.451 0.041 0.712 True");
    }

    #[test]
    fn header_has_nine_columns() {
        assert_eq!(HEADER.split(' ').count(), COLUMNS.len());
        assert_eq!(HEADER.split(' ').collect::<Vec<_>>(), COLUMNS.to_vec());
    }

    #[test]
    fn parse_reads_back_the_written_precision() {
        let headers = StringRecord::from(HEADER.split(' ').collect::<Vec<_>>());
        let columns = column_map(&headers).unwrap();
        let row = StringRecord::from(format_row(&record()).split(' ').collect::<Vec<_>>());
        let parsed = parse_row(&row, &columns).unwrap();
        assert_eq!(parsed.label, "DJF");
        assert!((parsed.slope - 0.46).abs() < 1e-12);
        assert!(parsed.red_chi2.is_nan());
        assert!(parsed.robust);
    }

    #[test]
    fn parse_rejects_unknown_flags() {
        let headers = StringRecord::from(HEADER.split(' ').collect::<Vec<_>>());
        let columns = column_map(&headers).unwrap();
        let row = StringRecord::from(vec!["2019", "-", "1", "1", "1", "1", "1", "1", "maybe"]);
        assert!(parse_row(&row, &columns).is_err());
    }
}
