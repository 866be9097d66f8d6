//! Append-only fit-result tables, one per partition shape.
//!
//! Tables live at `<root>/<station>/res_fit/<table name>`. The header is written once when
//! a table is created; afterwards rows are only appended.

pub mod table;

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use thiserror::Error;

use crate::domain::{DedupMode, FitRecord, PartitionDescriptor, PartitionShape, RowKey};
use crate::select::final_key;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access fit table '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Fit table '{}' does not exist.", .path.display())]
    Missing { path: PathBuf },
    #[error("Malformed fit table '{}' (line {line}): {message}", .path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

/// Rule deciding whether a new row is a duplicate of what the table already holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendPolicy {
    /// Skip when a row with the same `(year, label)` exists.
    Keyed,
    /// Skip when the table's last row carries `final_key`, the last key of a full scan.
    ///
    /// This only detects a table left behind by a completed run: a partially written table
    /// gets every row again, and a table whose last row happens to match skips rows that
    /// are missing.
    TailLabel { final_key: Option<RowKey> },
}

impl AppendPolicy {
    pub fn for_run(mode: DedupMode, plan: &[PartitionDescriptor]) -> Self {
        match mode {
            DedupMode::Keyed => AppendPolicy::Keyed,
            DedupMode::TailLabel => AppendPolicy::TailLabel {
                final_key: final_key(plan),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    SkippedDuplicate,
}

#[derive(Debug, Clone)]
pub struct FitResultStore {
    root: PathBuf,
}

impl FitResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn table_path(&self, shape: &PartitionShape) -> PathBuf {
        self.root
            .join(&shape.station)
            .join("res_fit")
            .join(shape.table_file_name())
    }

    /// Remove the table for `shape`, if any. Returns whether a file was removed.
    pub fn reset(&self, shape: &PartitionShape) -> Result<bool, StoreError> {
        let path = self.table_path(shape);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Removed existing fit table {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    /// All rows of the table for `shape`.
    pub fn read_rows(&self, shape: &PartitionShape) -> Result<Vec<FitRecord>, StoreError> {
        let path = self.table_path(shape);
        if !path.exists() {
            return Err(StoreError::Missing { path });
        }
        read_table(&path)
    }

    /// Append `record` unless `policy` flags it as a duplicate.
    pub fn append(
        &self,
        shape: &PartitionShape,
        record: &FitRecord,
        policy: &AppendPolicy,
    ) -> Result<AppendOutcome, StoreError> {
        let path = self.table_path(shape);
        let existing = if path.exists() { read_table(&path)? } else { Vec::new() };
        let created = !path.exists();

        let duplicate = match policy {
            AppendPolicy::Keyed => {
                let key = record.key();
                existing.iter().any(|r| r.key() == key)
            }
            AppendPolicy::TailLabel { final_key } => match (existing.last(), final_key) {
                (Some(last), Some(final_key)) => last.key() == *final_key,
                _ => false,
            },
        };
        if duplicate {
            debug!("{}: row {} already present, skipping", path.display(), record.key());
            return Ok(AppendOutcome::SkippedDuplicate);
        }

        let io_err = |source: std::io::Error| StoreError::Io {
            path: path.clone(),
            source,
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        if created {
            writeln!(file, "{}", table::HEADER).map_err(io_err)?;
        }
        writeln!(file, "{}", table::format_row(record)).map_err(io_err)?;
        Ok(AppendOutcome::Appended)
    }
}

fn read_table(path: &Path) -> Result<Vec<FitRecord>, StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b' ')
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| StoreError::Parse {
            path: path.to_path_buf(),
            line: 0,
            message: e.to_string(),
        })?;

    let parse_err = |line: usize, message: String| StoreError::Parse {
        path: path.to_path_buf(),
        line,
        message,
    };

    let headers = reader.headers().map_err(|e| parse_err(1, e.to_string()))?.clone();
    let columns = table::column_map(&headers).map_err(|m| parse_err(1, m))?;

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|e| parse_err(line, e.to_string()))?;
        rows.push(table::parse_row(&record, &columns).map_err(|m| parse_err(line, m))?);
    }
    Ok(rows)
}
