//! Atmospheric transparency to outgoing long-wave radiation
//!
//! The production path reproduces the 1896 calculation: the water vapor held by a column is
//! estimated from temperature and relative humidity, both absorber amounts are scaled by the
//! tabulated mean optical path, and the transparency is read off [`tables::TRANSPARENCY_PERCENT`]
//! using a [`WeightingPolicy`] on each axis.
//!
//! All temperatures in this module are in Kelvin.
//!
//! ```rust
//! use arrhenius_core::transparency::{transparency, WeightingPolicy};
//!
//! let value = transparency(1.0, 293.15, 78.0, WeightingPolicy::Closest, WeightingPolicy::Closest)
//!     .unwrap();
//! assert!((value - 0.199).abs() < 1e-12);
//! ```
//!
//! Band-model alternatives live in [`modern`]. Every formulation implements
//! [`TransparencyModel`] so that the run engine can treat them uniformly.

pub mod modern;
pub mod tables;
mod weighting;

pub use modern::{AngleIntegratedTransparency, ModernTransparency};
pub use weighting::WeightingPolicy;

use crate::errors::{ArrheniusError, ArrheniusResult};
use std::fmt;
use tables::{MEAN_PATH, TRANSPARENCY_CO2_KEYS, TRANSPARENCY_H2O_KEYS, TRANSPARENCY_PERCENT};

// Antoine equation constants for water, pressure in bar and temperature in Kelvin
const ANTOINE_A: f64 = 4.6543;
const ANTOINE_B: f64 = 1435.264;
const ANTOINE_C: f64 = -64.848;

const PASCALS_PER_BAR: f64 = 1e5;
/// Converts vapour pressure (Pa) over temperature (K) into absolute humidity (g/m^3)
const ABSOLUTE_HUMIDITY_FACTOR: f64 = 2.16679;
/// Absolute humidity (g/m^3) represented by one unit of vapor path
const GRAMS_PER_VAPOR_UNIT: f64 = 10.0;

/// Height of the single-slab atmosphere in km
pub const ATMOSPHERE_HEIGHT: f64 = 50.0;

/// Water vapor held in air at `temperature` (K) and `relative_humidity` (%)
///
/// The result is expressed in vapor-path units, where 1.0 is an absolute humidity of
/// 10 g/m^3. Saturation pressure comes from the Antoine equation, which is undefined at or
/// below 64.848 K; such temperatures are rejected along with negative ones.
pub fn water_vapor(temperature: f64, relative_humidity: f64) -> ArrheniusResult<f64> {
    if !(temperature > -ANTOINE_C) {
        return Err(ArrheniusError::domain(
            "temperature",
            temperature,
            format!(
                "saturation vapour pressure is only defined above {} K",
                -ANTOINE_C
            ),
        ));
    }
    if !(0.0..=100.0).contains(&relative_humidity) {
        return Err(ArrheniusError::domain(
            "relative humidity",
            relative_humidity,
            "must be between 0 and 100 percent",
        ));
    }

    let saturation_pressure =
        10f64.powf(ANTOINE_A - ANTOINE_B / (temperature + ANTOINE_C)) * PASCALS_PER_BAR;
    let vapour_pressure = relative_humidity / 100.0 * saturation_pressure;
    let absolute_humidity = ABSOLUTE_HUMIDITY_FACTOR * vapour_pressure / temperature;

    Ok(absolute_humidity / GRAMS_PER_VAPOR_UNIT)
}

/// Mean optical path multiplier for a column
///
/// `co2` must be one of the tabulated ratios exactly. Within that row the entry with the
/// nearest water-vapor key is used, the first key winning a tie.
pub fn mean_path(co2: f64, water_vapor: f64) -> ArrheniusResult<f64> {
    if !(co2 >= 0.0) {
        return Err(ArrheniusError::domain("CO2 amount", co2, "must not be negative"));
    }
    if !(water_vapor >= 0.0) {
        return Err(ArrheniusError::domain(
            "water vapor amount",
            water_vapor,
            "must not be negative",
        ));
    }

    let row = MEAN_PATH.iter().find(|row| row.co2 == co2).ok_or_else(|| {
        ArrheniusError::domain(
            "CO2 amount",
            co2,
            "no mean path is tabulated for this CO2 ratio",
        )
    })?;

    let mut nearest = row.entries[0];
    for &entry in &row.entries[1..] {
        if (entry.0 - water_vapor).abs() < (nearest.0 - water_vapor).abs() {
            nearest = entry;
        }
    }
    Ok(nearest.1)
}

/// Indexes of the keys either side of `value`
///
/// The lower index is the largest key strictly below `value`. Values outside the table clamp
/// to the boundary key on both sides.
fn bracket(keys: &[f64], value: f64) -> (usize, usize) {
    let last = keys.len() - 1;
    match keys.iter().rposition(|&key| key < value) {
        None => (0, 0),
        Some(index) if index == last => (last, last),
        Some(index) => (index, index + 1),
    }
}

/// Fraction of long-wave radiation that escapes through a column, from the 1896 tables
pub fn transparency(
    co2: f64,
    temperature: f64,
    relative_humidity: f64,
    co2_weight: WeightingPolicy,
    h2o_weight: WeightingPolicy,
) -> ArrheniusResult<f64> {
    let vapor = water_vapor(temperature, relative_humidity)?;
    let path = mean_path(co2, vapor)?;
    let co2_path = path * co2;
    let h2o_path = path * vapor;

    let (co2_lower, co2_upper) = bracket(&TRANSPARENCY_CO2_KEYS, co2_path);
    let (h2o_lower, h2o_upper) = bracket(&TRANSPARENCY_H2O_KEYS, h2o_path);

    let (co2_lower_weight, co2_upper_weight) = co2_weight.weights(
        TRANSPARENCY_CO2_KEYS[co2_lower],
        TRANSPARENCY_CO2_KEYS[co2_upper],
        co2_path,
    );
    let (h2o_lower_weight, h2o_upper_weight) = h2o_weight.weights(
        TRANSPARENCY_H2O_KEYS[h2o_lower],
        TRANSPARENCY_H2O_KEYS[h2o_upper],
        h2o_path,
    );

    let percent = co2_lower_weight * h2o_lower_weight * TRANSPARENCY_PERCENT[co2_lower][h2o_lower]
        + co2_upper_weight * h2o_lower_weight * TRANSPARENCY_PERCENT[co2_upper][h2o_lower]
        + co2_lower_weight * h2o_upper_weight * TRANSPARENCY_PERCENT[co2_lower][h2o_upper]
        + co2_upper_weight * h2o_upper_weight * TRANSPARENCY_PERCENT[co2_upper][h2o_upper];

    Ok(percent / 100.0)
}

/// Vertical extent of the air a transparency is evaluated for
///
/// Heights are in km above the surface. Pressure, when known, is in hPa at the layer centre.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AtmosphereLayer {
    midpoint: f64,
    thickness: f64,
    pressure: Option<f64>,
}

impl AtmosphereLayer {
    pub fn new(midpoint: f64, thickness: f64) -> ArrheniusResult<Self> {
        if !(thickness > 0.0) || !thickness.is_finite() {
            return Err(ArrheniusError::domain(
                "layer thickness",
                thickness,
                "must be positive",
            ));
        }
        if !(midpoint >= 0.0) || !midpoint.is_finite() {
            return Err(ArrheniusError::domain(
                "layer midpoint",
                midpoint,
                "must not be below the surface",
            ));
        }
        Ok(Self {
            midpoint,
            thickness,
            pressure: None,
        })
    }

    /// Layer described by the height of its top and its depth
    pub fn from_top(top: f64, depth: f64) -> ArrheniusResult<Self> {
        Self::new(top - depth / 2.0, depth)
    }

    /// The whole atmosphere treated as one slab
    pub fn full_column() -> Self {
        Self {
            midpoint: ATMOSPHERE_HEIGHT / 2.0,
            thickness: ATMOSPHERE_HEIGHT,
            pressure: None,
        }
    }

    pub fn with_pressure(self, pressure: f64) -> ArrheniusResult<Self> {
        if !(pressure > 0.0) || !pressure.is_finite() {
            return Err(ArrheniusError::domain("pressure", pressure, "must be positive"));
        }
        Ok(Self {
            pressure: Some(pressure),
            ..self
        })
    }

    pub fn midpoint(&self) -> f64 {
        self.midpoint
    }

    pub fn thickness(&self) -> f64 {
        self.thickness
    }

    pub fn pressure(&self) -> Option<f64> {
        self.pressure
    }

    pub fn bottom(&self) -> f64 {
        (self.midpoint - self.thickness / 2.0).max(0.0)
    }

    pub fn top(&self) -> f64 {
        self.midpoint + self.thickness / 2.0
    }
}

/// A formulation of atmospheric transparency
pub trait TransparencyModel: fmt::Debug + Send + Sync {
    /// Unique name for this formulation, used in logs
    fn name(&self) -> &'static str;

    /// Transparency of `layer` given a CO2 ratio, temperature (K) and relative humidity (%)
    fn transparency(
        &self,
        co2: f64,
        temperature: f64,
        relative_humidity: f64,
        layer: &AtmosphereLayer,
    ) -> ArrheniusResult<f64>;
}

/// Table lookup with a weighting policy per axis. Layer geometry is ignored.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TableTransparency {
    pub co2_weight: WeightingPolicy,
    pub h2o_weight: WeightingPolicy,
}

impl TransparencyModel for TableTransparency {
    fn name(&self) -> &'static str {
        "table"
    }

    fn transparency(
        &self,
        co2: f64,
        temperature: f64,
        relative_humidity: f64,
        _layer: &AtmosphereLayer,
    ) -> ArrheniusResult<f64> {
        transparency(
            co2,
            temperature,
            relative_humidity,
            self.co2_weight,
            self.h2o_weight,
        )
    }
}
