//! Latitude/longitude radiative energy-balance model after Arrhenius (1896)
//!
//! A run is described by a [`configuration::RunConfiguration`], reads its inputs through a
//! [`provider::ProviderRegistry`] and reports through an [`output::OutputSink`]:
//!
//! ```
//! use arrhenius::configuration::{RunConfiguration, RunSettings};
//! use arrhenius::grid::GridDimensions;
//! use arrhenius::output::default_output_config;
//! use arrhenius::provider::{ClimateVariable, ConstantSource, ProviderRegistry};
//! use arrhenius::runner::ModelRun;
//!
//! let config = RunConfiguration::from_settings(RunSettings {
//!     grid: GridDimensions::from_counts(3, 4).ok(),
//!     ..RunSettings::arrhenius_defaults()
//! })
//! .unwrap();
//!
//! let mut registry = ProviderRegistry::new();
//! registry
//!     .register(ClimateVariable::Temperature, "arrhenius", ConstantSource::new(14.85, &[1]))
//!     .register(ClimateVariable::Humidity, "arrhenius", ConstantSource::new(50.0, &[1]))
//!     .register(ClimateVariable::Albedo, "landmask", ConstantSource::new(0.3, &[]));
//!
//! let output = default_output_config();
//! let grids = ModelRun::new(&config, &output).run(&registry, None).unwrap();
//!
//! // Latitude aggregation happens after the run by default
//! let ground = &grids[0][0];
//! assert_eq!(ground.dimensions().dims_by_count(), (3, 1));
//! assert!(ground.iter().all(|cell| cell.temperature_change() > 0.0));
//! ```

pub mod provider;
pub mod runner;

pub use arrhenius_core::{
    configuration, errors, grid, multilayer, output, statistics, transparency,
};
