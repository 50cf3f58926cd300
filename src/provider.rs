//! Input data for a model run
//!
//! Each input variable is read from a [`GriddedSource`] registered in a [`ProviderRegistry`]
//! under the identifier a run configuration refers to. Any closure
//! `Fn(&GridDimensions, Option<u32>) -> ArrheniusResult<ArrayD<f64>>` is a source, so dataset
//! readers living outside this crate plug in without wrappers.
//!
//! Accepted array shapes, with `(lat, lon)` matching the configured grid:
//!
//! | variable | shapes |
//! |---|---|
//! | temperature (C) | `(time, lat, lon)` or `(time, layer, lat, lon)` |
//! | relative humidity (%) | same shape as temperature |
//! | albedo | `(lat, lon)` or `(time, lat, lon)` |
//! | pressure (hPa) | `(layer,)`, one level per atmospheric layer |

use arrhenius_core::configuration::{AbsorptionModel, RunConfiguration};
use arrhenius_core::errors::{ArrheniusError, ArrheniusResult};
use arrhenius_core::grid::{GridDimensions, LatLongGrid};
use log::debug;
use ndarray::{s, Array3, Array4, ArrayD, Axis, Ix1, Ix3, Ix4, IxDyn};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ClimateVariable {
    Temperature,
    Humidity,
    Albedo,
    Pressure,
}

impl fmt::Display for ClimateVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClimateVariable::Temperature => "temperature",
            ClimateVariable::Humidity => "humidity",
            ClimateVariable::Albedo => "albedo",
            ClimateVariable::Pressure => "pressure",
        };
        f.write_str(name)
    }
}

/// Something that can produce an array for a grid and an optional year
pub trait GriddedSource: Send + Sync {
    fn load(&self, grid: &GridDimensions, year: Option<u32>) -> ArrheniusResult<ArrayD<f64>>;
}

impl<F> GriddedSource for F
where
    F: Fn(&GridDimensions, Option<u32>) -> ArrheniusResult<ArrayD<f64>> + Send + Sync,
{
    fn load(&self, grid: &GridDimensions, year: Option<u32>) -> ArrheniusResult<ArrayD<f64>> {
        self(grid, year)
    }
}

/// The same value everywhere
///
/// `leading` gives the axes in front of `(lat, lon)`, e.g. `[time]` or `[time, layer]`.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstantSource {
    value: f64,
    leading: Vec<usize>,
}

impl ConstantSource {
    pub fn new(value: f64, leading: &[usize]) -> Self {
        Self {
            value,
            leading: leading.to_vec(),
        }
    }
}

impl GriddedSource for ConstantSource {
    fn load(&self, grid: &GridDimensions, _year: Option<u32>) -> ArrheniusResult<ArrayD<f64>> {
        let (rows, columns) = grid.dims_by_count();
        let mut shape = self.leading.clone();
        shape.extend([rows, columns]);
        Ok(ArrayD::from_elem(IxDyn(&shape), self.value))
    }
}

/// An array loaded ahead of time, returned as is for every request
#[derive(Clone, Debug, PartialEq)]
pub struct ArraySource {
    data: ArrayD<f64>,
}

impl ArraySource {
    pub fn new<D: ndarray::Dimension>(data: ndarray::Array<f64, D>) -> Self {
        Self {
            data: data.into_dyn(),
        }
    }
}

impl GriddedSource for ArraySource {
    fn load(&self, _grid: &GridDimensions, _year: Option<u32>) -> ArrheniusResult<ArrayD<f64>> {
        Ok(self.data.clone())
    }
}

/// Grids ready for a run: `segments[time][layer]`, layer 0 being the ground
#[derive(Clone, Debug, PartialEq)]
pub struct GriddedData {
    pub segments: Vec<Vec<LatLongGrid>>,
    /// Pressure (hPa) at the top of each atmospheric layer, multilayer runs only
    pub pressures: Option<Vec<f64>>,
}

/// Named data sources for each input variable
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    sources: HashMap<(ClimateVariable, String), Arc<dyn GriddedSource>>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self
            .sources
            .keys()
            .map(|(variable, name)| format!("{}:{}", variable, name))
            .collect();
        names.sort();
        f.debug_struct("ProviderRegistry")
            .field("sources", &names)
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `source` for `variable` under `name`, replacing any previous source
    pub fn register(
        &mut self,
        variable: ClimateVariable,
        name: &str,
        source: impl GriddedSource + 'static,
    ) -> &mut Self {
        self.sources
            .insert((variable, name.to_string()), Arc::new(source));
        self
    }

    pub fn load(
        &self,
        variable: ClimateVariable,
        name: &str,
        grid: &GridDimensions,
        year: Option<u32>,
    ) -> ArrheniusResult<ArrayD<f64>> {
        let source = self
            .sources
            .get(&(variable, name.to_string()))
            .ok_or_else(|| ArrheniusError::UnknownProvider {
                variable: variable.to_string(),
                name: name.to_string(),
            })?;
        debug!("Loading {} from provider '{}' for a {} grid", variable, name, grid);
        source.load(grid, year)
    }

    /// Pull every input named by `config` and build the grids for the run
    pub fn assemble(&self, config: &RunConfiguration) -> ArrheniusResult<GriddedData> {
        let grid = config.grid();
        let year = config.year();
        let providers = config.providers();
        let (rows, columns) = grid.dims_by_count();
        let layers = match config.model() {
            AbsorptionModel::Multilayer => config.layers() + 1,
            AbsorptionModel::Table | AbsorptionModel::Modern => 1,
        };

        let temperature = layered(
            self.load(ClimateVariable::Temperature, &providers.temperature, &grid, year)?,
            ClimateVariable::Temperature,
            rows,
            columns,
        )?;
        let humidity = layered(
            self.load(ClimateVariable::Humidity, &providers.humidity, &grid, year)?,
            ClimateVariable::Humidity,
            rows,
            columns,
        )?;
        if humidity.dim() != temperature.dim() {
            return Err(shape_error(
                ClimateVariable::Humidity,
                format!("{:?} to match temperature", temperature.dim()),
                humidity.shape(),
            ));
        }

        let (steps, available_layers, _, _) = temperature.dim();
        if steps == 0 {
            return Err(shape_error(
                ClimateVariable::Temperature,
                "at least one time step".to_string(),
                temperature.shape(),
            ));
        }
        // Single-layer runs read the lowest layer; a multilayer column must match its pressures
        match config.model() {
            AbsorptionModel::Multilayer if available_layers != layers => {
                return Err(shape_error(
                    ClimateVariable::Temperature,
                    format!("exactly {} layers", layers),
                    temperature.shape(),
                ));
            }
            _ if available_layers < layers => {
                return Err(shape_error(
                    ClimateVariable::Temperature,
                    format!("at least {} layers", layers),
                    temperature.shape(),
                ));
            }
            _ => {}
        }

        let albedo = timed(
            self.load(ClimateVariable::Albedo, &providers.albedo, &grid, year)?,
            steps,
            rows,
            columns,
        )?;

        let pressures = match (config.model(), &providers.pressure) {
            (AbsorptionModel::Multilayer, Some(name)) => Some(levels(
                self.load(ClimateVariable::Pressure, name, &grid, year)?,
                config.layers(),
            )?),
            _ => None,
        };

        let segments = (0..steps)
            .map(|step| {
                (0..layers)
                    .map(|layer| {
                        LatLongGrid::from_arrays(
                            grid,
                            temperature.slice(s![step, layer, .., ..]),
                            humidity.slice(s![step, layer, .., ..]),
                            albedo.slice(s![step, .., ..]),
                        )
                    })
                    .collect::<ArrheniusResult<Vec<_>>>()
            })
            .collect::<ArrheniusResult<Vec<_>>>()?;

        Ok(GriddedData {
            segments,
            pressures,
        })
    }
}

fn shape_error(variable: ClimateVariable, expected: String, found: &[usize]) -> ArrheniusError {
    ArrheniusError::ShapeMismatch {
        variable: variable.to_string(),
        expected,
        found: found.to_vec(),
    }
}

/// Normalise to `(time, layer, lat, lon)`
fn layered(
    data: ArrayD<f64>,
    variable: ClimateVariable,
    rows: usize,
    columns: usize,
) -> ArrheniusResult<Array4<f64>> {
    let expected = || format!("(time, [layer,] {}, {})", rows, columns);
    let data = match data.ndim() {
        3 => data.insert_axis(Axis(1)),
        4 => data,
        _ => return Err(shape_error(variable, expected(), data.shape())),
    };
    let shape = data.shape().to_vec();
    if shape[2] != rows || shape[3] != columns {
        return Err(shape_error(variable, expected(), &shape));
    }
    data.into_dimensionality::<Ix4>()
        .map_err(|_| shape_error(variable, expected(), &shape))
}

/// Normalise albedo to `(time, lat, lon)`, repeating a single field over every step
fn timed(
    data: ArrayD<f64>,
    steps: usize,
    rows: usize,
    columns: usize,
) -> ArrheniusResult<Array3<f64>> {
    let variable = ClimateVariable::Albedo;
    let expected = || format!("({}, {}) or ({}, {}, {})", rows, columns, steps, rows, columns);
    let shape = data.shape().to_vec();
    let data = match data.ndim() {
        2 => data.insert_axis(Axis(0)),
        3 => data,
        _ => return Err(shape_error(variable, expected(), &shape)),
    };
    let data = data
        .into_dimensionality::<Ix3>()
        .map_err(|_| shape_error(variable, expected(), &shape))?;

    let (time, data_rows, data_columns) = data.dim();
    if data_rows != rows || data_columns != columns || (time != 1 && time != steps) {
        return Err(shape_error(variable, expected(), &shape));
    }
    if time == steps {
        return Ok(data);
    }
    data.broadcast((steps, rows, columns))
        .map(|view| view.to_owned())
        .ok_or_else(|| shape_error(variable, expected(), &shape))
}

fn levels(data: ArrayD<f64>, layers: usize) -> ArrheniusResult<Vec<f64>> {
    let shape = data.shape().to_vec();
    let data = data
        .into_dimensionality::<Ix1>()
        .map_err(|_| shape_error(ClimateVariable::Pressure, format!("({},)", layers), &shape))?;
    if data.len() != layers {
        return Err(shape_error(
            ClimateVariable::Pressure,
            format!("({},)", layers),
            &shape,
        ));
    }
    Ok(data.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrhenius_core::configuration::RunSettings;
    use ndarray::{array, Array1, Array2};

    fn table_config() -> RunConfiguration {
        RunConfiguration::from_settings(RunSettings {
            grid: GridDimensions::from_counts(2, 3).ok(),
            ..RunSettings::arrhenius_defaults()
        })
        .unwrap()
    }

    fn registry(temperature: impl GriddedSource + 'static) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry
            .register(ClimateVariable::Temperature, "arrhenius", temperature)
            .register(
                ClimateVariable::Humidity,
                "arrhenius",
                ConstantSource::new(50.0, &[2]),
            )
            .register(
                ClimateVariable::Albedo,
                "landmask",
                ConstantSource::new(0.3, &[]),
            );
        registry
    }

    #[test]
    fn assembles_one_grid_per_time_step() {
        let data = registry(ConstantSource::new(14.85, &[2]))
            .assemble(&table_config())
            .unwrap();
        assert_eq!(data.segments.len(), 2);
        assert_eq!(data.segments[0].len(), 1);
        assert_eq!(data.segments[1][0].len(), 6);
        assert!(data.pressures.is_none());
        assert_eq!(data.segments[1][0].get(2, 1).unwrap().albedo(), 0.3);
    }

    #[test]
    fn closures_are_sources() {
        let source = |grid: &GridDimensions, year: Option<u32>| -> ArrheniusResult<ArrayD<f64>> {
            assert_eq!(year, Some(1895));
            let (rows, columns) = grid.dims_by_count();
            Ok(Array2::from_shape_fn((rows, columns), |(row, _)| row as f64 * 10.0)
                .insert_axis(Axis(0))
                .into_dyn())
        };
        let mut registry = registry(source);
        registry.register(
            ClimateVariable::Humidity,
            "arrhenius",
            ConstantSource::new(50.0, &[1]),
        );

        let data = registry.assemble(&table_config()).unwrap();
        let grid = &data.segments[0][0];
        assert_eq!(grid.get(0, 0).unwrap().temperature(), 0.0);
        assert_eq!(grid.get(2, 1).unwrap().temperature(), 10.0);
    }

    #[test]
    fn unknown_provider() {
        let mut registry = ProviderRegistry::new();
        registry.register(
            ClimateVariable::Temperature,
            "berkeley",
            ConstantSource::new(10.0, &[1]),
        );
        assert_eq!(
            registry.assemble(&table_config()).unwrap_err(),
            ArrheniusError::UnknownProvider {
                variable: "temperature".to_string(),
                name: "arrhenius".to_string()
            }
        );
    }

    #[test]
    fn shapes_must_match_the_grid() {
        let wrong = ArraySource::new(Array2::<f64>::zeros((4, 4)).insert_axis(Axis(0)));
        assert!(matches!(
            registry(wrong).assemble(&table_config()),
            Err(ArrheniusError::ShapeMismatch { .. })
        ));

        let flat = ArraySource::new(Array1::<f64>::zeros(6));
        assert!(registry(flat).assemble(&table_config()).is_err());
    }

    #[test]
    fn invalid_values_are_domain_errors() {
        let result = registry(ConstantSource::new(-300.0, &[2])).assemble(&table_config());
        assert!(matches!(result, Err(ArrheniusError::Domain { .. })));
    }

    #[test]
    fn albedo_may_vary_in_time() {
        let mut registry = registry(ConstantSource::new(10.0, &[2]));
        registry.register(
            ClimateVariable::Albedo,
            "landmask",
            ArraySource::new(array![
                [[0.1, 0.1, 0.1], [0.1, 0.1, 0.1]],
                [[0.6, 0.6, 0.6], [0.6, 0.6, 0.6]]
            ]),
        );
        let data = registry.assemble(&table_config()).unwrap();
        assert_eq!(data.segments[0][0].get(0, 0).unwrap().albedo(), 0.1);
        assert_eq!(data.segments[1][0].get(0, 0).unwrap().albedo(), 0.6);
    }

    #[test]
    fn multilayer_needs_layers_and_pressures() {
        let config = RunConfiguration::from_settings(RunSettings {
            grid: GridDimensions::from_counts(2, 3).ok(),
            model: Some(AbsorptionModel::Multilayer),
            layers: Some(2),
            co2_weight: None,
            h2o_weight: None,
            pressure_provider: Some("standard".to_string()),
            ..RunSettings::arrhenius_defaults()
        })
        .unwrap();

        let mut registry = registry(ConstantSource::new(10.0, &[1, 3]));
        registry
            .register(
                ClimateVariable::Humidity,
                "arrhenius",
                ConstantSource::new(40.0, &[1, 3]),
            )
            .register(
                ClimateVariable::Pressure,
                "standard",
                ArraySource::new(array![700.0, 300.0]),
            );
        let data = registry.assemble(&config).unwrap();
        assert_eq!(data.segments[0].len(), 3);
        assert_eq!(data.pressures, Some(vec![700.0, 300.0]));

        registry.register(
            ClimateVariable::Pressure,
            "standard",
            ArraySource::new(array![700.0]),
        );
        assert!(registry.assemble(&config).is_err());

        registry
            .register(
                ClimateVariable::Temperature,
                "arrhenius",
                ConstantSource::new(10.0, &[1, 2]),
            )
            .register(
                ClimateVariable::Humidity,
                "arrhenius",
                ConstantSource::new(40.0, &[1, 2]),
            );
        assert!(registry.assemble(&config).is_err());
    }

    #[test]
    fn multilayer_rejects_surplus_layers() {
        let config = RunConfiguration::from_settings(RunSettings {
            grid: GridDimensions::from_counts(2, 3).ok(),
            model: Some(AbsorptionModel::Multilayer),
            layers: Some(1),
            co2_weight: None,
            h2o_weight: None,
            pressure_provider: Some("standard".to_string()),
            ..RunSettings::arrhenius_defaults()
        })
        .unwrap();

        let mut registry = registry(ConstantSource::new(10.0, &[1, 4]));
        registry
            .register(
                ClimateVariable::Humidity,
                "arrhenius",
                ConstantSource::new(40.0, &[1, 4]),
            )
            .register(
                ClimateVariable::Pressure,
                "standard",
                ArraySource::new(array![500.0]),
            );
        match registry.assemble(&config) {
            Err(ArrheniusError::ShapeMismatch { expected, found, .. }) => {
                assert_eq!(expected, "exactly 2 layers");
                assert_eq!(found, vec![1, 4, 2, 3]);
            }
            other => panic!("expected a shape mismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn single_layer_runs_read_the_lowest_layer() {
        let mut registry = registry(ConstantSource::new(10.0, &[1, 4]));
        registry.register(
            ClimateVariable::Humidity,
            "arrhenius",
            ConstantSource::new(40.0, &[1, 4]),
        );
        let data = registry.assemble(&table_config()).unwrap();
        assert_eq!(data.segments[0].len(), 1);
    }
}
