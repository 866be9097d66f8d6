//! Reporting utilities: run tallies and formatted terminal output.

pub mod format;

pub use format::*;

use crate::app::pipeline::{FitRunOutput, PartitionStatus};
use crate::store::AppendOutcome;

/// How the partitions of a fit run ended up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub planned: usize,
    pub appended: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub failed: usize,
    pub robust: usize,
}

/// Tally partition outcomes of a fit run.
pub fn count_outcomes(run: &FitRunOutput) -> RunCounts {
    let mut counts = RunCounts {
        planned: run.partitions.len(),
        ..RunCounts::default()
    };
    for p in &run.partitions {
        match &p.status {
            PartitionStatus::Fitted { record, stored, .. } => {
                match stored {
                    AppendOutcome::Appended => counts.appended += 1,
                    AppendOutcome::SkippedDuplicate => counts.duplicates += 1,
                }
                if record.robust {
                    counts.robust += 1;
                }
            }
            PartitionStatus::Skipped { .. } => counts.skipped += 1,
            PartitionStatus::Failed { .. } => counts.failed += 1,
        }
    }
    counts
}
