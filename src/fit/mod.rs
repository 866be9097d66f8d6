//! Regression of CH4 against CO for selected partitions.
//!
//! Responsibilities:
//!
//! - fit OLS, ODR and Theil–Sen lines to a subset
//! - assess the OLS slope with the subsampling robustness test
//! - sample the fitted lines for plot-data export

pub mod engine;
pub mod robustness;

pub use engine::*;
pub use robustness::*;
