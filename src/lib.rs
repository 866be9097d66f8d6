//! `ch4co-emissions` library crate.
//!
//! Estimates CH4 emissions from the CH4:CO regression slope measured at monitoring
//! stations. The binary (`ch4co`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - selection, regression and estimation can be reused from other tools

pub mod app;
pub mod cli;
pub mod domain;
pub mod emission;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod report;
pub mod select;
pub mod store;
