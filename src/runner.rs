//! Model run engine
//!
//! A [`ModelRun`] takes the grids assembled for a configuration and, for each time step,
//! computes the temperature every column reaches once the CO2 ratio moves from its initial to
//! its final value. Columns are independent of each other and are computed in parallel; the
//! results are then written back into the grids in cell order, which keeps the reported
//! notices in a fixed order.
//!
//! Single-layer runs (table or modern absorption) balance the ground against one atmosphere.
//! With `K` the calibrated constant, `w` the albedo weighting and `τ` the transparency:
//!
//! ```text
//! K = T⁴ (1 + w τ(init_co2, T))
//! T' = (K / (1 + w τ(final_co2, T')))^(1/4)
//! ```
//!
//! the second line being solved by fixed-point iteration. Multilayer runs solve the radiative
//! balance of the whole column, see [`arrhenius_core::multilayer`].

use crate::provider::{GriddedData, ProviderRegistry};
use arrhenius_core::configuration::{AbsorptionModel, AggregationMode, RunConfiguration};
use arrhenius_core::errors::{ArrheniusError, ArrheniusResult};
use arrhenius_core::grid::{CellVariable, GridCell, LatLongGrid};
use arrhenius_core::multilayer::{build_balance_matrix, calibrate, pressures_to_layers, solve};
use arrhenius_core::output::{
    AccuracyMetric, DebugReport, OutputSink, ReportKind, ReportPayload, SpecialReport,
    PRIMARY_OUTPUT,
};
use arrhenius_core::statistics::{band_table, deviations, summarize, with_deviations};
use arrhenius_core::transparency::{
    AtmosphereLayer, ModernTransparency, TableTransparency, TransparencyModel,
};
use log::{debug, info};
use ndarray::Array2;
use rayon::prelude::*;

/// Calibrated energy-balance constant of a single-layer column
///
/// `temperature` is in Kelvin, `weight` the albedo weighting applied to the transparency.
pub fn calibrate_constant(temperature: f64, weight: f64, transparency: f64) -> f64 {
    temperature.powi(4) * (1.0 + weight * transparency)
}

/// Temperature (K) of a single-layer column with calibrated `constant`
pub fn equilibrium_temperature(constant: f64, weight: f64, transparency: f64) -> f64 {
    (constant / (1.0 + weight * transparency)).powf(0.25)
}

/// English ordinal of a positive number: 1st, 2nd, 3rd, 4th, ..., 11th, 12th, 13th, 21st
pub fn ordinal(n: usize) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

/// How a cell's albedo scales the transparency term of the balance
#[derive(Copy, Clone, Debug, PartialEq)]
enum AlbedoWeighting {
    /// `1 - albedo`, the share of incoming radiation absorbed at the ground
    Absorbed,
    /// `albedo`
    Reflected,
}

impl AlbedoWeighting {
    fn weight(self, albedo: f64) -> f64 {
        match self {
            AlbedoWeighting::Absorbed => 1.0 - albedo,
            AlbedoWeighting::Reflected => albedo,
        }
    }
}

/// Everything a column computation needs, shared across worker threads
#[derive(Debug)]
struct ColumnPhysics {
    init_co2: f64,
    final_co2: f64,
    iterations: usize,
    weighting: AlbedoWeighting,
    model: Box<dyn TransparencyModel>,
}

impl ColumnPhysics {
    fn from_config(config: &RunConfiguration) -> ArrheniusResult<Self> {
        let model: Box<dyn TransparencyModel> = match config.model() {
            AbsorptionModel::Table => {
                let (co2_weight, h2o_weight) = config.weights().ok_or_else(|| {
                    ArrheniusError::Configuration(
                        "table absorption requires co2_weight and h2o_weight".to_string(),
                    )
                })?;
                Box::new(TableTransparency {
                    co2_weight,
                    h2o_weight,
                })
            }
            AbsorptionModel::Modern | AbsorptionModel::Multilayer => {
                Box::new(ModernTransparency::default())
            }
        };
        let weighting = match config.model() {
            AbsorptionModel::Table => AlbedoWeighting::Absorbed,
            AbsorptionModel::Modern | AbsorptionModel::Multilayer => AlbedoWeighting::Reflected,
        };
        Ok(Self {
            init_co2: config.init_co2(),
            final_co2: config.final_co2(),
            iterations: config.iterations(),
            weighting,
            model,
        })
    }

    fn single_layer(&self, cell: &GridCell) -> ArrheniusResult<ColumnOutcome> {
        let layer = AtmosphereLayer::full_column();
        let initial = cell.temperature_kelvin();
        let humidity = cell.relative_humidity();
        let weight = self.weighting.weight(cell.albedo());

        let initial_transparency = self
            .model
            .transparency(self.init_co2, initial, humidity, &layer)?;
        let constant = 1.0 + weight * initial_transparency;

        // Ratio form of `equilibrium_temperature`, exact when nothing changes
        let mut temperature = initial;
        let mut transparency = initial_transparency;
        for _ in 0..=self.iterations {
            transparency = self
                .model
                .transparency(self.final_co2, temperature, humidity, &layer)?;
            temperature = initial * (constant / (1.0 + weight * transparency)).powf(0.25);
        }

        Ok(ColumnOutcome {
            layers: vec![LayerOutcome {
                initial_temperature: initial,
                final_temperature: temperature,
                transparency_change: transparency - initial_transparency,
            }],
        })
    }

    /// Transparencies of a column, the ground's entry being its albedo
    fn column_transparencies(
        &self,
        co2: f64,
        column: &[&GridCell],
        temperatures: &[f64],
        layers: &[AtmosphereLayer],
    ) -> ArrheniusResult<Vec<f64>> {
        let mut transparencies = Vec::with_capacity(column.len());
        transparencies.push(column[0].albedo());
        for ((cell, temperature), layer) in
            column[1..].iter().zip(&temperatures[1..]).zip(layers)
        {
            transparencies.push(self.model.transparency(
                co2,
                *temperature,
                cell.relative_humidity(),
                layer,
            )?);
        }
        Ok(transparencies)
    }

    fn multilayer(
        &self,
        column: &[&GridCell],
        layers: &[AtmosphereLayer],
    ) -> ArrheniusResult<ColumnOutcome> {
        if column.len() != layers.len() + 1 {
            return Err(ArrheniusError::ShapeMismatch {
                variable: "atmospheric column".to_string(),
                expected: format!("{} layers", layers.len() + 1),
                found: vec![column.len()],
            });
        }

        let initial: Vec<f64> = column.iter().map(|cell| cell.temperature_kelvin()).collect();
        let initial_transparencies =
            self.column_transparencies(self.init_co2, column, &initial, layers)?;
        let constants = calibrate(&build_balance_matrix(&initial_transparencies)?, &initial)?;

        let mut temperatures = initial.clone();
        let mut transparencies = initial_transparencies.clone();
        for _ in 0..=self.iterations {
            transparencies =
                self.column_transparencies(self.final_co2, column, &temperatures, layers)?;
            temperatures = solve(&build_balance_matrix(&transparencies)?, &constants)?;
        }

        let layers = initial
            .iter()
            .zip(&temperatures)
            .zip(initial_transparencies.iter().zip(&transparencies))
            .map(|((initial, last), (before, after))| LayerOutcome {
                initial_temperature: *initial,
                final_temperature: *last,
                transparency_change: after - before,
            })
            .collect();
        Ok(ColumnOutcome { layers })
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct LayerOutcome {
    initial_temperature: f64,
    final_temperature: f64,
    transparency_change: f64,
}

/// Result for one column, ground first
#[derive(Clone, Debug, PartialEq)]
struct ColumnOutcome {
    layers: Vec<LayerOutcome>,
}

/// A single run of the model for one configuration
pub struct ModelRun<'a> {
    config: &'a RunConfiguration,
    output: &'a dyn OutputSink,
}

impl<'a> ModelRun<'a> {
    pub fn new(config: &'a RunConfiguration, output: &'a dyn OutputSink) -> Self {
        Self { config, output }
    }

    /// Load the inputs named by the configuration and run the model over them
    ///
    /// `expected` is a `(latitude band, time step)` table of reference temperature changes.
    /// When given, deviations from it are reported.
    ///
    /// Returns the final grids, `[time step][layer]` with the ground first.
    pub fn run(
        &self,
        registry: &ProviderRegistry,
        expected: Option<&Array2<f64>>,
    ) -> ArrheniusResult<Vec<Vec<LatLongGrid>>> {
        info!(
            "Starting model run {} ({:?} absorption, CO2 {} -> {}, {} grid)",
            self.config.run_id(),
            self.config.model(),
            self.config.init_co2(),
            self.config.final_co2(),
            self.config.grid()
        );
        let data = registry.assemble(self.config)?;
        self.run_with_data(data, expected)
    }

    /// Run the model over grids that were assembled elsewhere
    pub fn run_with_data(
        &self,
        data: GriddedData,
        expected: Option<&Array2<f64>>,
    ) -> ArrheniusResult<Vec<Vec<LatLongGrid>>> {
        let GriddedData {
            mut segments,
            mut pressures,
        } = data;

        if self.config.aggregate_lat() == AggregationMode::Before {
            segments = aggregate_latitude(&segments)?;
        }
        if self.config.aggregate_level() == AggregationMode::Before {
            segments = aggregate_levels(&segments)?;
            pressures = pressures.and_then(|levels| levels.last().map(|top| vec![*top]));
        }

        let physics = ColumnPhysics::from_config(self.config)?;
        let layers = match self.config.model() {
            AbsorptionModel::Multilayer => {
                let pressures = pressures.ok_or_else(|| {
                    ArrheniusError::Configuration(
                        "multilayer absorption requires layer pressures".to_string(),
                    )
                })?;
                Some(pressures_to_layers(&pressures)?)
            }
            AbsorptionModel::Table | AbsorptionModel::Modern => None,
        };

        for (index, segment) in segments.iter_mut().enumerate() {
            self.notice(|| format!("Preparing model run on {} grid", ordinal(index + 1)));
            match &layers {
                Some(layers) => self.compute_multilayer(&physics, segment, layers)?,
                None => match segment.first_mut() {
                    Some(ground) => self.compute_single_layer(&physics, ground)?,
                    None => {
                        return Err(ArrheniusError::ShapeMismatch {
                            variable: "grid".to_string(),
                            expected: "a ground layer".to_string(),
                            found: vec![0],
                        })
                    }
                },
            }
            debug!("Finished time step {} of {}", index + 1, self.config.run_id());
        }

        if self.config.aggregate_lat() == AggregationMode::After {
            segments = aggregate_latitude(&segments)?;
        }
        if self.config.aggregate_level() == AggregationMode::After {
            segments = aggregate_levels(&segments)?;
        }

        let ground: Vec<LatLongGrid> = segments
            .iter()
            .filter_map(|segment| segment.first().cloned())
            .collect();
        self.report(&ground, expected)?;
        if self.output.has_collection(&[PRIMARY_OUTPUT]) {
            self.output
                .submit_collection_output(&[PRIMARY_OUTPUT], &ReportPayload::Grids(ground))?;
        } else {
            debug!("no '{}' collection; final grids not submitted", PRIMARY_OUTPUT);
        }

        info!("Model run {} complete", self.config.run_id());
        Ok(segments)
    }

    fn notice(&self, message: impl FnOnce() -> String) {
        let kind = ReportKind::Debug(DebugReport::Notices);
        if self.output.accepts(kind) {
            self.output.submit_output(kind, &ReportPayload::Text(message()));
        }
    }

    fn compute_single_layer(
        &self,
        physics: &ColumnPhysics,
        grid: &mut LatLongGrid,
    ) -> ArrheniusResult<()> {
        let outcomes = grid
            .cells()
            .par_iter()
            .map(|cell| physics.single_layer(cell))
            .collect::<ArrheniusResult<Vec<_>>>()?;

        for (cell, outcome) in grid.iter_mut().zip(&outcomes) {
            self.apply(cell, &outcome.layers[0])?;
        }
        Ok(())
    }

    fn compute_multilayer(
        &self,
        physics: &ColumnPhysics,
        segment: &mut [LatLongGrid],
        layers: &[AtmosphereLayer],
    ) -> ArrheniusResult<()> {
        let cells = segment.first().map(LatLongGrid::len).unwrap_or_default();
        if segment.iter().any(|grid| grid.len() != cells) {
            return Err(ArrheniusError::ShapeMismatch {
                variable: "layer grids".to_string(),
                expected: format!("{} cells per layer", cells),
                found: segment.iter().map(LatLongGrid::len).collect(),
            });
        }

        let columns: &[LatLongGrid] = segment;
        let outcomes = (0..cells)
            .into_par_iter()
            .map(|index| {
                let column: Vec<&GridCell> =
                    columns.iter().map(|grid| &grid.cells()[index]).collect();
                physics.multilayer(&column, layers)
            })
            .collect::<ArrheniusResult<Vec<_>>>()?;

        for (index, outcome) in outcomes.iter().enumerate() {
            for (grid, layer) in segment.iter_mut().zip(&outcome.layers) {
                self.apply(&mut grid.cells_mut()[index], layer)?;
            }
        }
        Ok(())
    }

    /// Add the computed temperature change to a cell and report it
    fn apply(&self, cell: &mut GridCell, outcome: &LayerOutcome) -> ArrheniusResult<()> {
        let change = outcome.final_temperature - outcome.initial_temperature;
        cell.set_temperature(cell.temperature() + change)?;

        let kind = ReportKind::Debug(DebugReport::GridCellDeltaTemp);
        if self.output.accepts(kind) {
            let message = format!("{}  ~~~~  Delta T: {} K", cell, change);
            self.output.submit_output(kind, &ReportPayload::Text(message));
        }
        let kind = ReportKind::Debug(DebugReport::GridCellDeltaTransparency);
        if self.output.accepts(kind) {
            let message = format!(
                "{}  ~~~~  Delta Transparency: {}",
                cell, outcome.transparency_change
            );
            self.output.submit_output(kind, &ReportPayload::Text(message));
        }
        Ok(())
    }

    fn report(
        &self,
        ground: &[LatLongGrid],
        expected: Option<&Array2<f64>>,
    ) -> ArrheniusResult<()> {
        for variable in CellVariable::ALL {
            let kind = ReportKind::Variable(variable);
            if self.output.accepts(kind) {
                self.output
                    .submit_output(kind, &ReportPayload::Table(band_table(ground, variable)?));
            }
        }

        let Some(expected) = expected else {
            return Ok(());
        };
        let modelled = band_table(ground, CellVariable::TemperatureChange)?;
        let difference = deviations(expected, &modelled)?;
        let combined = with_deviations(&modelled, &difference)?;
        let summary = summarize(&difference)?;

        self.output.submit_output(
            ReportKind::Special(SpecialReport::DeltaTempDeviations),
            &ReportPayload::Table(difference),
        );
        self.output.submit_output(
            ReportKind::Special(SpecialReport::DeltaTempPlusDeviations),
            &ReportPayload::Table(combined),
        );
        for (metric, value) in [
            (AccuracyMetric::AverageDeviation, summary.mean),
            (AccuracyMetric::StandardDeviation, summary.std_dev),
            (AccuracyMetric::Variance, summary.variance),
        ] {
            self.output
                .submit_output(ReportKind::Accuracy(metric), &ReportPayload::Scalar(value));
        }
        Ok(())
    }
}

fn aggregate_latitude(segments: &[Vec<LatLongGrid>]) -> ArrheniusResult<Vec<Vec<LatLongGrid>>> {
    segments
        .iter()
        .map(|segment| {
            segment
                .iter()
                .map(LatLongGrid::latitude_bands)
                .collect::<ArrheniusResult<Vec<_>>>()
        })
        .collect()
}

/// Collapse every atmospheric layer into one, keeping the ground as is
fn aggregate_levels(segments: &[Vec<LatLongGrid>]) -> ArrheniusResult<Vec<Vec<LatLongGrid>>> {
    segments
        .iter()
        .map(|segment| match segment.as_slice() {
            [ground, atmosphere @ ..] if atmosphere.len() > 1 => {
                Ok(vec![ground.clone(), LatLongGrid::layer_mean(atmosphere)?])
            }
            _ => Ok(segment.to_vec()),
        })
        .collect()
}
