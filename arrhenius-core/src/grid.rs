//! Latitude/longitude grid types for the energy-balance model
//!
//! This module provides the containers the model mutates during a run:
//!
//! - [`GridDimensions`]: the shape of a grid, expressed either as a cell width in degrees or as
//!   a number of cells along each axis
//! - [`GridCell`]: the state of a single column (or a single layer of a column)
//! - [`LatLongGrid`]: a 2-D collection of cells with a fixed, deterministic iteration order
//!
//! Cells are stored band by band, starting at the southernmost band and moving west to east
//! within each band. All iteration over a grid follows this order.
//!
//! # Examples
//!
//! ```rust
//! use arrhenius_core::grid::{CellVariable, GridCell, GridDimensions, LatLongGrid};
//!
//! let dims = GridDimensions::from_widths(90.0, 180.0).unwrap();
//! assert_eq!(dims.dims_by_count(), (2, 2));
//!
//! let cell = GridCell::new(14.85, 50.0, 0.3).unwrap();
//! let grid = LatLongGrid::uniform(dims, cell);
//! assert_eq!(grid.len(), 4);
//!
//! // Collapse the longitude axis
//! let bands = grid.latitude_bands().unwrap();
//! assert_eq!(bands.dimensions().dims_by_count(), (2, 1));
//! assert_eq!(bands.global_mean(CellVariable::Albedo), 0.3);
//! ```

use crate::errors::{ArrheniusError, ArrheniusResult};
use is_close::is_close;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type FloatValue = f64;

/// Offset between degrees Celsius and Kelvin
pub const KELVIN_OFFSET: FloatValue = 273.15;

const LATITUDE_EXTENT: FloatValue = 180.0;
const LONGITUDE_EXTENT: FloatValue = 360.0;

/// How a pair of grid dimensions is written down
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridRepresentation {
    /// Degrees spanned by each cell
    Width,
    /// Number of cells along the axis
    Count,
}

/// Wire form of [`GridDimensions`], e.g. `{ dims = [10, 20], repr = "width" }`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub dims: Vec<FloatValue>,
    pub repr: GridRepresentation,
}

/// Immutable (latitude, longitude) extents of a grid
///
/// Widths must divide 180 degrees of latitude and 360 degrees of longitude exactly, so the two
/// representations always convert losslessly.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "GridSpec", into = "GridSpec")]
pub struct GridDimensions {
    latitude_count: usize,
    longitude_count: usize,
}

impl GridDimensions {
    /// Build dimensions from a `(latitude, longitude)` pair in either representation.
    ///
    /// Fails if `dims` does not contain exactly two values or if either value is invalid for
    /// the chosen representation.
    pub fn new(dims: &[FloatValue], repr: GridRepresentation) -> ArrheniusResult<Self> {
        let [latitude, longitude] = dims else {
            return Err(ArrheniusError::domain(
                "grid dimension count",
                dims.len() as FloatValue,
                "exactly two dimensions (latitude, longitude) are required",
            ));
        };

        match repr {
            GridRepresentation::Width => Self::from_widths(*latitude, *longitude),
            GridRepresentation::Count => Ok(Self {
                latitude_count: count_from_float(*latitude, "latitude cell count")?,
                longitude_count: count_from_float(*longitude, "longitude cell count")?,
            }),
        }
    }

    /// Dimensions from cell widths in degrees
    pub fn from_widths(latitude: FloatValue, longitude: FloatValue) -> ArrheniusResult<Self> {
        Ok(Self {
            latitude_count: count_for_width(latitude, LATITUDE_EXTENT, "latitude cell width")?,
            longitude_count: count_for_width(longitude, LONGITUDE_EXTENT, "longitude cell width")?,
        })
    }

    /// Dimensions from the number of cells along each axis
    pub fn from_counts(latitude: usize, longitude: usize) -> ArrheniusResult<Self> {
        if latitude == 0 {
            return Err(ArrheniusError::domain(
                "latitude cell count",
                0.0,
                "a grid needs at least one cell",
            ));
        }
        if longitude == 0 {
            return Err(ArrheniusError::domain(
                "longitude cell count",
                0.0,
                "a grid needs at least one cell",
            ));
        }
        Ok(Self {
            latitude_count: latitude,
            longitude_count: longitude,
        })
    }

    /// Cell widths in degrees as `(latitude, longitude)`
    pub fn dims_by_width(&self) -> (FloatValue, FloatValue) {
        (
            LATITUDE_EXTENT / self.latitude_count as FloatValue,
            LONGITUDE_EXTENT / self.longitude_count as FloatValue,
        )
    }

    /// Cell counts as `(latitude, longitude)`
    pub fn dims_by_count(&self) -> (usize, usize) {
        (self.latitude_count, self.longitude_count)
    }

    pub fn latitude_count(&self) -> usize {
        self.latitude_count
    }

    pub fn longitude_count(&self) -> usize {
        self.longitude_count
    }

    /// Total number of cells in a grid of these dimensions
    pub fn cell_count(&self) -> usize {
        self.latitude_count * self.longitude_count
    }
}

impl TryFrom<GridSpec> for GridDimensions {
    type Error = ArrheniusError;

    fn try_from(spec: GridSpec) -> Result<Self, Self::Error> {
        GridDimensions::new(&spec.dims, spec.repr)
    }
}

impl From<GridDimensions> for GridSpec {
    fn from(dims: GridDimensions) -> Self {
        GridSpec {
            dims: vec![
                dims.latitude_count as FloatValue,
                dims.longitude_count as FloatValue,
            ],
            repr: GridRepresentation::Count,
        }
    }
}

impl fmt::Display for GridDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.latitude_count, self.longitude_count)
    }
}

fn count_from_float(count: FloatValue, quantity: &'static str) -> ArrheniusResult<usize> {
    if !count.is_finite() || count < 1.0 {
        return Err(ArrheniusError::domain(
            quantity,
            count,
            "must be a positive whole number",
        ));
    }
    if count.fract() != 0.0 {
        return Err(ArrheniusError::domain(
            quantity,
            count,
            "must be a whole number of cells",
        ));
    }
    Ok(count as usize)
}

fn count_for_width(
    width: FloatValue,
    extent: FloatValue,
    quantity: &'static str,
) -> ArrheniusResult<usize> {
    if !width.is_finite() || width <= 0.0 {
        return Err(ArrheniusError::domain(quantity, width, "must be positive"));
    }
    if width > extent {
        return Err(ArrheniusError::domain(
            quantity,
            width,
            format!("must not exceed {} degrees", extent),
        ));
    }

    let count = extent / width;
    let rounded = count.round();
    if !is_close!(count, rounded) {
        return Err(ArrheniusError::domain(
            quantity,
            width,
            format!("must divide {} degrees evenly", extent),
        ));
    }
    Ok(rounded as usize)
}

/// Variables tracked by every grid cell
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellVariable {
    /// Temperature in degrees Celsius
    Temperature,
    /// Net temperature change since the cell was created
    TemperatureChange,
    /// Relative humidity in percent
    Humidity,
    /// Surface albedo as a fraction
    Albedo,
}

impl CellVariable {
    pub const ALL: [CellVariable; 4] = [
        CellVariable::Temperature,
        CellVariable::TemperatureChange,
        CellVariable::Humidity,
        CellVariable::Albedo,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CellVariable::Temperature => "temperature",
            CellVariable::TemperatureChange => "delta_t",
            CellVariable::Humidity => "humidity",
            CellVariable::Albedo => "albedo",
        }
    }
}

impl fmt::Display for CellVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn check_temperature(temperature: FloatValue) -> ArrheniusResult<()> {
    if !temperature.is_finite() || temperature + KELVIN_OFFSET < 0.0 {
        return Err(ArrheniusError::domain(
            "temperature",
            temperature,
            "must be at or above absolute zero (-273.15 C)",
        ));
    }
    Ok(())
}

fn check_humidity(relative_humidity: FloatValue) -> ArrheniusResult<()> {
    if !(0.0..=100.0).contains(&relative_humidity) {
        return Err(ArrheniusError::domain(
            "relative humidity",
            relative_humidity,
            "must be between 0 and 100 percent",
        ));
    }
    Ok(())
}

fn check_albedo(albedo: FloatValue) -> ArrheniusResult<()> {
    if !(0.0..=1.0).contains(&albedo) {
        return Err(ArrheniusError::domain(
            "albedo",
            albedo,
            "must be between 0 and 1",
        ));
    }
    Ok(())
}

/// State of one grid column, or of one layer within a column
///
/// Temperature is held in degrees Celsius. Every successful call to
/// [`set_temperature`](GridCell::set_temperature) adds `new - previous` to the accumulated
/// temperature change. A setter that fails validation leaves the cell untouched.
#[derive(Clone, Debug, PartialEq)]
pub struct GridCell {
    temperature: FloatValue,
    relative_humidity: FloatValue,
    albedo: FloatValue,
    temperature_change: FloatValue,
}

impl GridCell {
    pub fn new(
        temperature: FloatValue,
        relative_humidity: FloatValue,
        albedo: FloatValue,
    ) -> ArrheniusResult<Self> {
        check_temperature(temperature)?;
        check_humidity(relative_humidity)?;
        check_albedo(albedo)?;

        Ok(Self {
            temperature,
            relative_humidity,
            albedo,
            temperature_change: 0.0,
        })
    }

    pub fn temperature(&self) -> FloatValue {
        self.temperature
    }

    pub fn temperature_kelvin(&self) -> FloatValue {
        self.temperature + KELVIN_OFFSET
    }

    pub fn relative_humidity(&self) -> FloatValue {
        self.relative_humidity
    }

    pub fn albedo(&self) -> FloatValue {
        self.albedo
    }

    pub fn temperature_change(&self) -> FloatValue {
        self.temperature_change
    }

    pub fn set_temperature(&mut self, temperature: FloatValue) -> ArrheniusResult<()> {
        check_temperature(temperature)?;
        self.temperature_change += temperature - self.temperature;
        self.temperature = temperature;
        Ok(())
    }

    pub fn set_relative_humidity(&mut self, relative_humidity: FloatValue) -> ArrheniusResult<()> {
        check_humidity(relative_humidity)?;
        self.relative_humidity = relative_humidity;
        Ok(())
    }

    pub fn set_albedo(&mut self, albedo: FloatValue) -> ArrheniusResult<()> {
        check_albedo(albedo)?;
        self.albedo = albedo;
        Ok(())
    }

    pub fn value(&self, variable: CellVariable) -> FloatValue {
        match variable {
            CellVariable::Temperature => self.temperature,
            CellVariable::TemperatureChange => self.temperature_change,
            CellVariable::Humidity => self.relative_humidity,
            CellVariable::Albedo => self.albedo,
        }
    }

    /// Average every tracked variable, including the accumulated change.
    ///
    /// The mean of valid cells is itself valid, so this only fails for an empty slice.
    pub fn mean<'a>(cells: impl IntoIterator<Item = &'a GridCell>) -> ArrheniusResult<GridCell> {
        let mut count = 0usize;
        let mut sums = [0.0; 4];
        for cell in cells {
            count += 1;
            sums[0] += cell.temperature;
            sums[1] += cell.relative_humidity;
            sums[2] += cell.albedo;
            sums[3] += cell.temperature_change;
        }
        if count == 0 {
            return Err(ArrheniusError::domain(
                "cell count",
                0.0,
                "cannot average an empty set of cells",
            ));
        }

        let n = count as FloatValue;
        let mut cell = GridCell::new(sums[0] / n, sums[1] / n, sums[2] / n)?;
        cell.temperature_change = sums[3] / n;
        Ok(cell)
    }
}

impl fmt::Display for GridCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GridCell(temperature={:.3} C, humidity={:.1}%, albedo={:.3})",
            self.temperature, self.relative_humidity, self.albedo
        )
    }
}

/// A latitude/longitude grid of cells
///
/// `column` indexes longitude (west to east) and `row` indexes latitude (south to north).
#[derive(Clone, Debug, PartialEq)]
pub struct LatLongGrid {
    dimensions: GridDimensions,
    cells: Vec<GridCell>,
}

impl LatLongGrid {
    /// Build a grid from cells already laid out in south-to-north, west-to-east order
    pub fn from_cells(dimensions: GridDimensions, cells: Vec<GridCell>) -> ArrheniusResult<Self> {
        if cells.len() != dimensions.cell_count() {
            return Err(ArrheniusError::ShapeMismatch {
                variable: "grid cells".to_string(),
                expected: format!("{} cells for a {} grid", dimensions.cell_count(), dimensions),
                found: vec![cells.len()],
            });
        }
        Ok(Self { dimensions, cells })
    }

    /// Build a grid from `(latitude, longitude)` shaped arrays
    ///
    /// Row 0 of each array is the southernmost band.
    pub fn from_arrays<'a>(
        dimensions: GridDimensions,
        temperature: ArrayView2<'a, FloatValue>,
        relative_humidity: ArrayView2<'a, FloatValue>,
        albedo: ArrayView2<'a, FloatValue>,
    ) -> ArrheniusResult<Self> {
        let (rows, columns) = dimensions.dims_by_count();
        for (variable, view) in [
            ("temperature", &temperature),
            ("humidity", &relative_humidity),
            ("albedo", &albedo),
        ] {
            if view.dim() != (rows, columns) {
                return Err(ArrheniusError::ShapeMismatch {
                    variable: variable.to_string(),
                    expected: format!("({}, {})", rows, columns),
                    found: view.shape().to_vec(),
                });
            }
        }

        let mut cells = Vec::with_capacity(dimensions.cell_count());
        for row in 0..rows {
            for column in 0..columns {
                cells.push(GridCell::new(
                    temperature[[row, column]],
                    relative_humidity[[row, column]],
                    albedo[[row, column]],
                )?);
            }
        }
        Ok(Self { dimensions, cells })
    }

    /// A grid where every cell starts in the same state
    pub fn uniform(dimensions: GridDimensions, cell: GridCell) -> Self {
        Self {
            dimensions,
            cells: vec![cell; dimensions.cell_count()],
        }
    }

    pub fn dimensions(&self) -> GridDimensions {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn index(&self, column: usize, row: usize) -> ArrheniusResult<usize> {
        let (rows, columns) = self.dimensions.dims_by_count();
        if column >= columns || row >= rows {
            return Err(ArrheniusError::IndexOutOfBounds {
                column,
                row,
                columns,
                rows,
            });
        }
        Ok(row * columns + column)
    }

    pub fn get(&self, column: usize, row: usize) -> ArrheniusResult<&GridCell> {
        let index = self.index(column, row)?;
        Ok(&self.cells[index])
    }

    pub fn get_mut(&mut self, column: usize, row: usize) -> ArrheniusResult<&mut GridCell> {
        let index = self.index(column, row)?;
        Ok(&mut self.cells[index])
    }

    pub fn set(&mut self, column: usize, row: usize, cell: GridCell) -> ArrheniusResult<()> {
        let index = self.index(column, row)?;
        self.cells[index] = cell;
        Ok(())
    }

    /// Cells in iteration order
    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [GridCell] {
        &mut self.cells
    }

    pub fn iter(&self) -> impl Iterator<Item = &GridCell> {
        self.cells.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut GridCell> {
        self.cells.iter_mut()
    }

    /// Collapse the longitude axis, leaving one cell per latitude band
    pub fn latitude_bands(&self) -> ArrheniusResult<LatLongGrid> {
        let columns = self.dimensions.longitude_count();
        let bands = self
            .cells
            .chunks(columns)
            .map(GridCell::mean)
            .collect::<ArrheniusResult<Vec<_>>>()?;

        LatLongGrid::from_cells(
            GridDimensions::from_counts(self.dimensions.latitude_count(), 1)?,
            bands,
        )
    }

    /// Mean of `variable` in each latitude band, south to north
    pub fn band_means(&self, variable: CellVariable) -> Vec<FloatValue> {
        let columns = self.dimensions.longitude_count();
        self.cells
            .chunks(columns)
            .map(|band| {
                band.iter().map(|c| c.value(variable)).sum::<FloatValue>() / columns as FloatValue
            })
            .collect()
    }

    /// Unweighted mean of `variable` over every cell
    pub fn global_mean(&self, variable: CellVariable) -> FloatValue {
        self.cells.iter().map(|c| c.value(variable)).sum::<FloatValue>() / self.len() as FloatValue
    }

    /// `variable` as a `(latitude, longitude)` array
    pub fn values(&self, variable: CellVariable) -> Array2<FloatValue> {
        let (rows, columns) = self.dimensions.dims_by_count();
        Array2::from_shape_fn((rows, columns), |(row, column)| {
            self.cells[row * columns + column].value(variable)
        })
    }

    /// Cell-by-cell mean of several grids of the same dimensions
    pub fn layer_mean(grids: &[LatLongGrid]) -> ArrheniusResult<LatLongGrid> {
        let first = grids.first().ok_or_else(|| {
            ArrheniusError::domain("layer count", 0.0, "cannot average an empty set of grids")
        })?;
        if let Some(other) = grids.iter().find(|g| g.dimensions != first.dimensions) {
            return Err(ArrheniusError::ShapeMismatch {
                variable: "layer grid".to_string(),
                expected: first.dimensions.to_string(),
                found: vec![
                    other.dimensions.latitude_count(),
                    other.dimensions.longitude_count(),
                ],
            });
        }

        let cells = (0..first.len())
            .map(|index| GridCell::mean(grids.iter().map(|g| &g.cells[index])))
            .collect::<ArrheniusResult<Vec<_>>>()?;
        LatLongGrid::from_cells(first.dimensions, cells)
    }
}
