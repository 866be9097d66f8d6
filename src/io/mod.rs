//! Input/output helpers.
//!
//! - station table ingest and merge (`ingest`)
//! - plot-data and estimate exports (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
