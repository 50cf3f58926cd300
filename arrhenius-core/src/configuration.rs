//! Run configuration
//!
//! A run is described in two steps. [`RunSettings`] is the wire form: every field is optional
//! so that it can be read from partial TOML or JSON documents and merged with defaults.
//! [`RunConfiguration::from_settings`] then validates the settings and freezes them. Nothing
//! downstream of a [`RunConfiguration`] can change it.
//!
//! ```rust
//! use arrhenius_core::configuration::{AbsorptionModel, RunConfiguration};
//!
//! let config = RunConfiguration::from_toml_str(r#"
//!     init_co2 = 1.0
//!     final_co2 = 2.0
//!     grid = { dims = [10, 20], repr = "width" }
//!     layers = 1
//!     iterations = 1
//!     temperature_provider = "arrhenius"
//!     humidity_provider = "arrhenius"
//!     albedo_provider = "landmask"
//!     model = "table"
//!     co2_weight = "closest"
//!     h2o_weight = "closest"
//! "#).unwrap();
//!
//! assert_eq!(config.model(), AbsorptionModel::Table);
//! assert_eq!(config.run_id().len(), 16);
//! ```

use crate::errors::{ArrheniusError, ArrheniusResult};
use crate::grid::GridDimensions;
use crate::transparency::tables::mean_path_co2_keys;
use crate::transparency::WeightingPolicy;
use serde::{Deserialize, Serialize};

/// When grids are collapsed along an axis
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMode {
    /// Aggregate the input before any physics runs
    Before,
    /// Aggregate the finished output
    After,
    #[default]
    None,
}

/// Which physics computes the new equilibrium temperatures
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbsorptionModel {
    /// Single slab, transparency from the 1896 tables
    Table,
    /// Single slab, transparency from the band model
    Modern,
    /// Ground plus stacked atmospheric layers, band-model transparency per layer
    Multilayer,
}

/// Data provider identifiers for each input variable
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderSelection {
    pub temperature: String,
    pub humidity: String,
    pub albedo: String,
    pub pressure: Option<String>,
}

/// Unvalidated run settings
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSettings {
    pub run_id: Option<String>,
    pub year: Option<u32>,
    pub init_co2: Option<f64>,
    pub final_co2: Option<f64>,
    pub grid: Option<GridDimensions>,
    pub layers: Option<usize>,
    #[serde(alias = "iters")]
    pub iterations: Option<usize>,
    pub aggregate_lat: Option<AggregationMode>,
    pub aggregate_level: Option<AggregationMode>,
    #[serde(alias = "temp_src")]
    pub temperature_provider: Option<String>,
    #[serde(alias = "humidity_src")]
    pub humidity_provider: Option<String>,
    #[serde(alias = "albedo_src")]
    pub albedo_provider: Option<String>,
    #[serde(alias = "pressure_src")]
    pub pressure_provider: Option<String>,
    #[serde(alias = "abs_src")]
    pub model: Option<AbsorptionModel>,
    #[serde(alias = "CO2_weight")]
    pub co2_weight: Option<WeightingPolicy>,
    #[serde(alias = "H2O_weight")]
    pub h2o_weight: Option<WeightingPolicy>,
}

impl RunSettings {
    /// Settings reproducing the 1896 calculation on a 10x20 degree grid
    pub fn arrhenius_defaults() -> Self {
        Self {
            run_id: None,
            year: Some(1895),
            init_co2: Some(1.0),
            final_co2: Some(2.0),
            grid: GridDimensions::from_widths(10.0, 20.0).ok(),
            layers: Some(1),
            iterations: Some(1),
            aggregate_lat: Some(AggregationMode::After),
            aggregate_level: Some(AggregationMode::None),
            temperature_provider: Some("arrhenius".to_string()),
            humidity_provider: Some("arrhenius".to_string()),
            albedo_provider: Some("landmask".to_string()),
            pressure_provider: None,
            model: Some(AbsorptionModel::Table),
            co2_weight: Some(WeightingPolicy::Closest),
            h2o_weight: Some(WeightingPolicy::Closest),
        }
    }

    pub fn from_toml_str(text: &str) -> ArrheniusResult<Self> {
        toml::from_str(text).map_err(|e| ArrheniusError::Configuration(e.to_string()))
    }

    pub fn from_json_str(text: &str) -> ArrheniusResult<Self> {
        serde_json::from_str(text).map_err(|e| ArrheniusError::Configuration(e.to_string()))
    }

    /// Fill every unset field from `defaults`
    pub fn or(self, defaults: RunSettings) -> RunSettings {
        RunSettings {
            run_id: self.run_id.or(defaults.run_id),
            year: self.year.or(defaults.year),
            init_co2: self.init_co2.or(defaults.init_co2),
            final_co2: self.final_co2.or(defaults.final_co2),
            grid: self.grid.or(defaults.grid),
            layers: self.layers.or(defaults.layers),
            iterations: self.iterations.or(defaults.iterations),
            aggregate_lat: self.aggregate_lat.or(defaults.aggregate_lat),
            aggregate_level: self.aggregate_level.or(defaults.aggregate_level),
            temperature_provider: self.temperature_provider.or(defaults.temperature_provider),
            humidity_provider: self.humidity_provider.or(defaults.humidity_provider),
            albedo_provider: self.albedo_provider.or(defaults.albedo_provider),
            pressure_provider: self.pressure_provider.or(defaults.pressure_provider),
            model: self.model.or(defaults.model),
            co2_weight: self.co2_weight.or(defaults.co2_weight),
            h2o_weight: self.h2o_weight.or(defaults.h2o_weight),
        }
    }
}

fn required<T>(value: Option<T>, field: &str) -> ArrheniusResult<T> {
    value.ok_or_else(|| {
        ArrheniusError::Configuration(format!("missing required field '{}'", field))
    })
}

fn provider_name(value: Option<String>, field: &str) -> ArrheniusResult<String> {
    let name = required(value, field)?;
    if name.trim().is_empty() {
        return Err(ArrheniusError::Configuration(format!(
            "'{}' must name a data provider",
            field
        )));
    }
    Ok(name)
}

/// Validated, immutable parameters of one model run
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunConfiguration {
    #[serde(skip)]
    run_id: String,
    year: Option<u32>,
    init_co2: f64,
    final_co2: f64,
    grid: GridDimensions,
    layers: usize,
    iterations: usize,
    aggregate_lat: AggregationMode,
    aggregate_level: AggregationMode,
    providers: ProviderSelection,
    model: AbsorptionModel,
    weights: Option<(WeightingPolicy, WeightingPolicy)>,
}

impl RunConfiguration {
    pub fn from_settings(settings: RunSettings) -> ArrheniusResult<Self> {
        let init_co2 = required(settings.init_co2, "init_co2")?;
        let final_co2 = required(settings.final_co2, "final_co2")?;
        let grid = required(settings.grid, "grid")?;
        let layers = required(settings.layers, "layers")?;
        let iterations = required(settings.iterations, "iterations")?;
        let model = required(settings.model, "model")?;
        let providers = ProviderSelection {
            temperature: provider_name(settings.temperature_provider, "temperature_provider")?,
            humidity: provider_name(settings.humidity_provider, "humidity_provider")?,
            albedo: provider_name(settings.albedo_provider, "albedo_provider")?,
            pressure: match settings.pressure_provider {
                Some(name) => Some(provider_name(Some(name), "pressure_provider")?),
                None => None,
            },
        };

        if init_co2 != 1.0 {
            return Err(ArrheniusError::Configuration(format!(
                "init_co2 must be 1, got {}",
                init_co2
            )));
        }
        if !final_co2.is_finite() || final_co2 < 0.0 {
            return Err(ArrheniusError::Configuration(format!(
                "final_co2 must be a non-negative number, got {}",
                final_co2
            )));
        }
        if layers == 0 {
            return Err(ArrheniusError::Configuration(
                "at least one atmosphere layer is required".to_string(),
            ));
        }

        let weights = match model {
            AbsorptionModel::Table => {
                if !mean_path_co2_keys().any(|key| key == final_co2) {
                    return Err(ArrheniusError::Configuration(format!(
                        "table mode has no mean path for final_co2 = {}; use one of {:?}",
                        final_co2,
                        mean_path_co2_keys().collect::<Vec<_>>()
                    )));
                }
                Some((
                    required(settings.co2_weight, "co2_weight")?,
                    required(settings.h2o_weight, "h2o_weight")?,
                ))
            }
            AbsorptionModel::Modern | AbsorptionModel::Multilayer => {
                if settings.co2_weight.is_some() || settings.h2o_weight.is_some() {
                    return Err(ArrheniusError::Configuration(
                        "weighting functions only apply to table mode".to_string(),
                    ));
                }
                None
            }
        };

        if layers > 1 && model != AbsorptionModel::Multilayer {
            return Err(ArrheniusError::Configuration(format!(
                "{} layers requested but only multilayer mode models more than one",
                layers
            )));
        }
        if model == AbsorptionModel::Multilayer && providers.pressure.is_none() {
            return Err(ArrheniusError::Configuration(
                "multilayer mode requires a pressure_provider".to_string(),
            ));
        }

        let mut config = Self {
            run_id: String::new(),
            year: settings.year,
            init_co2,
            final_co2,
            grid,
            layers,
            iterations,
            aggregate_lat: settings.aggregate_lat.unwrap_or_default(),
            aggregate_level: settings.aggregate_level.unwrap_or_default(),
            providers,
            model,
            weights,
        };
        config.run_id = match settings.run_id {
            Some(id) if !id.trim().is_empty() => id,
            Some(_) => {
                return Err(ArrheniusError::Configuration(
                    "run_id must not be blank".to_string(),
                ))
            }
            None => config.canonical_hash()?,
        };
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> ArrheniusResult<Self> {
        Self::from_settings(RunSettings::from_toml_str(text)?)
    }

    pub fn from_json_str(text: &str) -> ArrheniusResult<Self> {
        Self::from_settings(RunSettings::from_json_str(text)?)
    }

    /// FNV-1a digest of the canonical JSON form of every field except the run id
    fn canonical_hash(&self) -> ArrheniusResult<String> {
        const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;

        let canonical = serde_json::to_string(self)
            .map_err(|e| ArrheniusError::Configuration(e.to_string()))?;
        let digest = canonical.bytes().fold(OFFSET_BASIS, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(PRIME)
        });
        Ok(format!("{:016x}", digest))
    }

    /// Settings that rebuild this configuration
    pub fn to_settings(&self) -> RunSettings {
        RunSettings {
            run_id: Some(self.run_id.clone()),
            year: self.year,
            init_co2: Some(self.init_co2),
            final_co2: Some(self.final_co2),
            grid: Some(self.grid),
            layers: Some(self.layers),
            iterations: Some(self.iterations),
            aggregate_lat: Some(self.aggregate_lat),
            aggregate_level: Some(self.aggregate_level),
            temperature_provider: Some(self.providers.temperature.clone()),
            humidity_provider: Some(self.providers.humidity.clone()),
            albedo_provider: Some(self.providers.albedo.clone()),
            pressure_provider: self.providers.pressure.clone(),
            model: Some(self.model),
            co2_weight: self.weights.map(|w| w.0),
            h2o_weight: self.weights.map(|w| w.1),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn year(&self) -> Option<u32> {
        self.year
    }

    pub fn init_co2(&self) -> f64 {
        self.init_co2
    }

    pub fn final_co2(&self) -> f64 {
        self.final_co2
    }

    pub fn grid(&self) -> GridDimensions {
        self.grid
    }

    /// Number of atmospheric layers above the ground
    pub fn layers(&self) -> usize {
        self.layers
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn aggregate_lat(&self) -> AggregationMode {
        self.aggregate_lat
    }

    pub fn aggregate_level(&self) -> AggregationMode {
        self.aggregate_level
    }

    pub fn providers(&self) -> &ProviderSelection {
        &self.providers
    }

    pub fn model(&self) -> AbsorptionModel {
        self.model
    }

    /// `(co2, h2o)` weighting policies, present only in table mode
    pub fn weights(&self) -> Option<(WeightingPolicy, WeightingPolicy)> {
        self.weights
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_settings() -> RunSettings {
        RunSettings::arrhenius_defaults()
    }

    fn multilayer_settings() -> RunSettings {
        RunSettings {
            model: Some(AbsorptionModel::Multilayer),
            layers: Some(3),
            final_co2: Some(2.3),
            co2_weight: None,
            h2o_weight: None,
            pressure_provider: Some("standard".to_string()),
            ..RunSettings::arrhenius_defaults()
        }
    }

    #[test]
    fn defaults_are_valid() {
        let config = RunConfiguration::from_settings(table_settings()).unwrap();
        assert_eq!(config.year(), Some(1895));
        assert_eq!(config.grid().dims_by_count(), (18, 18));
        assert_eq!(config.aggregate_lat(), AggregationMode::After);
        assert_eq!(
            config.weights(),
            Some((WeightingPolicy::Closest, WeightingPolicy::Closest))
        );
        assert_eq!(config.providers().albedo, "landmask");
    }

    #[test]
    fn missing_fields_are_named() {
        let settings = RunSettings {
            iterations: None,
            ..table_settings()
        };
        match RunConfiguration::from_settings(settings) {
            Err(ArrheniusError::Configuration(message)) => assert!(message.contains("iterations")),
            other => panic!("expected a configuration error, got {:?}", other),
        }
        assert!(RunConfiguration::from_settings(RunSettings::default()).is_err());
    }

    #[test]
    fn initial_co2_must_be_one() {
        let settings = RunSettings {
            init_co2: Some(1.5),
            ..table_settings()
        };
        assert!(RunConfiguration::from_settings(settings).is_err());
    }

    #[test]
    fn out_of_range_values() {
        for settings in [
            RunSettings {
                final_co2: Some(-1.0),
                ..multilayer_settings()
            },
            RunSettings {
                final_co2: Some(f64::NAN),
                ..multilayer_settings()
            },
            RunSettings {
                layers: Some(0),
                ..multilayer_settings()
            },
            RunSettings {
                temperature_provider: Some("  ".to_string()),
                ..table_settings()
            },
            RunSettings {
                run_id: Some(String::new()),
                ..table_settings()
            },
        ] {
            assert!(matches!(
                RunConfiguration::from_settings(settings),
                Err(ArrheniusError::Configuration(_))
            ));
        }
    }

    #[test]
    fn table_mode_needs_a_tabulated_co2() {
        let settings = RunSettings {
            final_co2: Some(2.3),
            ..table_settings()
        };
        assert!(RunConfiguration::from_settings(settings).is_err());

        let settings = RunSettings {
            final_co2: Some(0.67),
            ..table_settings()
        };
        assert!(RunConfiguration::from_settings(settings).is_ok());
    }

    #[test]
    fn weights_only_in_table_mode() {
        let missing = RunSettings {
            h2o_weight: None,
            ..table_settings()
        };
        assert!(RunConfiguration::from_settings(missing).is_err());

        let extra = RunSettings {
            co2_weight: Some(WeightingPolicy::Lowest),
            ..multilayer_settings()
        };
        assert!(RunConfiguration::from_settings(extra).is_err());

        let modern = RunConfiguration::from_settings(RunSettings {
            model: Some(AbsorptionModel::Modern),
            layers: Some(1),
            ..multilayer_settings()
        })
        .unwrap();
        assert_eq!(modern.weights(), None);
        assert_eq!(modern.final_co2(), 2.3);
    }

    #[test]
    fn layer_count_and_mode_agree() {
        let settings = RunSettings {
            layers: Some(2),
            ..table_settings()
        };
        assert!(RunConfiguration::from_settings(settings).is_err());

        let settings = RunSettings {
            pressure_provider: None,
            ..multilayer_settings()
        };
        assert!(RunConfiguration::from_settings(settings).is_err());
        assert!(RunConfiguration::from_settings(multilayer_settings()).is_ok());
    }

    #[test]
    fn run_id_is_a_deterministic_hash() {
        let a = RunConfiguration::from_settings(table_settings()).unwrap();
        let b = RunConfiguration::from_settings(table_settings()).unwrap();
        assert_eq!(a.run_id(), b.run_id());
        assert_eq!(a.run_id().len(), 16);

        let c = RunConfiguration::from_settings(RunSettings {
            iterations: Some(4),
            ..table_settings()
        })
        .unwrap();
        assert_ne!(a.run_id(), c.run_id());

        let named = RunConfiguration::from_settings(RunSettings {
            run_id: Some("baseline".to_string()),
            ..table_settings()
        })
        .unwrap();
        assert_eq!(named.run_id(), "baseline");
    }

    #[test]
    fn historical_json_keys() {
        let json = r#"{
            "year": 1895,
            "init_co2": 1,
            "final_co2": 3,
            "grid": {"dims": [18, 36], "repr": "count"},
            "layers": 1,
            "iters": 2,
            "aggregate_lat": "before",
            "temp_src": "arrhenius",
            "humidity_src": "arrhenius",
            "albedo_src": "landmask",
            "abs_src": "table",
            "CO2_weight": "mean",
            "H2O_weight": "low"
        }"#;
        let config = RunConfiguration::from_json_str(json).unwrap();
        assert_eq!(config.iterations(), 2);
        assert_eq!(config.final_co2(), 3.0);
        assert_eq!(config.aggregate_level(), AggregationMode::None);
        assert_eq!(
            config.weights(),
            Some((WeightingPolicy::Proximity, WeightingPolicy::Lowest))
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = RunSettings::from_toml_str("iterations = 1\nwobble = true");
        assert!(matches!(result, Err(ArrheniusError::Configuration(_))));
    }

    #[test]
    fn partial_settings_merge_with_defaults() {
        let partial = RunSettings::from_toml_str("final_co2 = 3.0\niterations = 0").unwrap();
        let config =
            RunConfiguration::from_settings(partial.or(RunSettings::arrhenius_defaults())).unwrap();
        assert_eq!(config.final_co2(), 3.0);
        assert_eq!(config.iterations(), 0);
        assert_eq!(config.layers(), 1);
    }

    #[test]
    fn toml_round_trip() {
        let config = RunConfiguration::from_settings(multilayer_settings()).unwrap();
        let text = toml::to_string(&config.to_settings()).unwrap();
        let rebuilt = RunConfiguration::from_toml_str(&text).unwrap();
        assert_eq!(config, rebuilt);
    }
}
