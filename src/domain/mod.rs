//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - merged station observations (`Observation`, `ObservationTable`)
//! - selection enums and the typed partition descriptor (`PartitionShape`, `PartitionDescriptor`)
//! - run/station configuration (`RunConfig`, `StationConfig`, `EngineConfig`)
//! - fit-table rows and emission records (`FitRecord`, `InventoryRecord`, `EstimatedEmission`)

pub mod descriptor;
pub mod types;

pub use descriptor::*;
pub use types::*;
