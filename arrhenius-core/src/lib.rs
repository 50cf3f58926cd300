//! Core types for a latitude/longitude radiative energy-balance model
//!
//! The model asks how surface temperature responds when the CO2 content of the air changes,
//! following the calculation Svante Arrhenius published in 1896. This crate holds the pieces
//! that do not depend on where input data comes from:
//!
//! - [`grid`]: grid dimensions, cells and latitude/longitude grids
//! - [`transparency`]: how much long-wave radiation escapes a column
//! - [`multilayer`]: the radiative balance of a stack of layers
//! - [`configuration`]: validated run settings
//! - [`output`]: routing of reports to handlers
//! - [`statistics`]: summaries against reference data

pub mod configuration;
pub mod errors;
pub mod grid;
pub mod multilayer;
pub mod output;
pub mod statistics;
pub mod transparency;
