//! Mathematical utilities: least squares, straight-line estimators and summary statistics.

pub mod odr;
pub mod ols;
pub mod stats;
pub mod theil_sen;

pub use odr::*;
pub use ols::*;
pub use stats::*;
pub use theil_sen::*;
