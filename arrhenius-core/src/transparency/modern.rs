//! Band-model transparency
//!
//! Instead of reading the 1896 tables these models split the long-wave spectrum into a few
//! grey bands, each absorbing in proportion to the CO2 and water-vapor paths through a layer.
//!
//! - [`ModernTransparency`] uses the diffusivity approximation: flux through a slab of optical
//!   depth `d` is transmitted as `exp(-1.66 d)`.
//! - [`AngleIntegratedTransparency`] integrates the transmission over zenith angle with
//!   Gauss-Legendre quadrature. It is experimental and is never selected by a run
//!   configuration.
//!
//! Absorber paths are measured in the same units as the table model: a CO2 ratio of 1.0 across
//! the full column is one unit of CO2 path, and one unit of vapor path is 10 g/m^3.

use super::{water_vapor, AtmosphereLayer, TransparencyModel};
use crate::errors::{ArrheniusError, ArrheniusResult};
use serde::{Deserialize, Serialize};

/// A spectral interval with its share of emitted flux and grey absorption coefficients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbsorptionBand {
    pub fraction: f64,
    pub co2_coefficient: f64,
    pub h2o_coefficient: f64,
}

/// Parameters shared by the band models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandModelParameters {
    /// Spectral bands; their fractions should sum to 1
    /// default: window, CO2 15 micron, water vapor rotation and a shared wing
    pub bands: Vec<AbsorptionBand>,
    /// Diffusivity factor converting vertical into mean slant path
    /// unit: dimensionless
    /// default: 1.66
    pub diffusivity_factor: f64,
    /// e-folding height of the CO2 column
    /// unit: km
    /// default: 8.0
    pub co2_scale_height: f64,
    /// e-folding height of water vapor
    /// unit: km
    /// default: 2.0
    pub vapor_scale_height: f64,
    /// Pressure at which the absorption coefficients apply
    /// unit: hPa
    /// default: 1013.25
    pub reference_pressure: f64,
}

impl Default for BandModelParameters {
    fn default() -> Self {
        Self {
            bands: vec![
                AbsorptionBand {
                    fraction: 0.30,
                    co2_coefficient: 0.0,
                    h2o_coefficient: 0.05,
                },
                AbsorptionBand {
                    fraction: 0.20,
                    co2_coefficient: 2.5,
                    h2o_coefficient: 0.1,
                },
                AbsorptionBand {
                    fraction: 0.35,
                    co2_coefficient: 0.02,
                    h2o_coefficient: 3.0,
                },
                AbsorptionBand {
                    fraction: 0.15,
                    co2_coefficient: 0.4,
                    h2o_coefficient: 0.6,
                },
            ],
            diffusivity_factor: 1.66,
            co2_scale_height: 8.0,
            vapor_scale_height: 2.0,
            reference_pressure: 1013.25,
        }
    }
}

impl BandModelParameters {
    /// Vertical optical depth of each band through `layer`
    fn optical_depths(
        &self,
        co2: f64,
        temperature: f64,
        relative_humidity: f64,
        layer: &AtmosphereLayer,
    ) -> ArrheniusResult<Vec<f64>> {
        if !(co2 >= 0.0) {
            return Err(ArrheniusError::domain("CO2 amount", co2, "must not be negative"));
        }
        let vapor = water_vapor(temperature, relative_humidity)?;

        let co2_path = co2
            * ((-layer.bottom() / self.co2_scale_height).exp()
                - (-layer.top() / self.co2_scale_height).exp());
        let h2o_path = vapor * (1.0 - (-layer.thickness() / self.vapor_scale_height).exp());
        let broadening = layer
            .pressure()
            .map_or(1.0, |pressure| (pressure / self.reference_pressure).sqrt());

        Ok(self
            .bands
            .iter()
            .map(|band| {
                (band.co2_coefficient * co2_path + band.h2o_coefficient * h2o_path) * broadening
            })
            .collect())
    }
}

/// Four-band grey transparency using the diffusivity approximation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModernTransparency {
    parameters: BandModelParameters,
}

impl ModernTransparency {
    pub fn from_parameters(parameters: BandModelParameters) -> Self {
        Self { parameters }
    }
}

impl TransparencyModel for ModernTransparency {
    fn name(&self) -> &'static str {
        "modern"
    }

    fn transparency(
        &self,
        co2: f64,
        temperature: f64,
        relative_humidity: f64,
        layer: &AtmosphereLayer,
    ) -> ArrheniusResult<f64> {
        let depths = self
            .parameters
            .optical_depths(co2, temperature, relative_humidity, layer)?;

        Ok(self
            .parameters
            .bands
            .iter()
            .zip(depths)
            .map(|(band, depth)| {
                band.fraction * (-self.parameters.diffusivity_factor * depth).exp()
            })
            .sum())
    }
}

// Positive half of the 8-point Gauss-Legendre rule on [-1, 1]
const GAUSS_LEGENDRE_NODES: [f64; 4] = [
    0.183_434_642_495_649_8,
    0.525_532_409_916_329_0,
    0.796_666_477_413_626_7,
    0.960_289_856_497_536_3,
];
const GAUSS_LEGENDRE_WEIGHTS: [f64; 4] = [
    0.362_683_783_378_362_0,
    0.313_706_645_877_887_3,
    0.222_381_034_453_374_5,
    0.101_228_536_290_376_3,
];

/// Band transparency with the flux transmission integrated over zenith angle
///
/// Computes `2 * integral_0^1 mu * exp(-d / mu) dmu` for each band with an 8-point
/// Gauss-Legendre rule mapped onto `mu` in `[0, 1]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AngleIntegratedTransparency {
    parameters: BandModelParameters,
}

impl AngleIntegratedTransparency {
    pub fn from_parameters(parameters: BandModelParameters) -> Self {
        Self { parameters }
    }

    fn flux_transmission(depth: f64) -> f64 {
        GAUSS_LEGENDRE_NODES
            .iter()
            .zip(GAUSS_LEGENDRE_WEIGHTS.iter())
            .flat_map(|(&node, &weight)| {
                [((1.0 + node) / 2.0, weight), ((1.0 - node) / 2.0, weight)]
            })
            .map(|(cosine, weight)| weight * cosine * (-depth / cosine).exp())
            .sum()
    }
}

impl TransparencyModel for AngleIntegratedTransparency {
    fn name(&self) -> &'static str {
        "angle-integrated"
    }

    fn transparency(
        &self,
        co2: f64,
        temperature: f64,
        relative_humidity: f64,
        layer: &AtmosphereLayer,
    ) -> ArrheniusResult<f64> {
        let depths = self
            .parameters
            .optical_depths(co2, temperature, relative_humidity, layer)?;

        Ok(self
            .parameters
            .bands
            .iter()
            .zip(depths)
            .map(|(band, depth)| band.fraction * Self::flux_transmission(depth))
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn band_fractions_cover_the_spectrum() {
        let total: f64 = BandModelParameters::default()
            .bands
            .iter()
            .map(|b| b.fraction)
            .sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn clear_air_is_transparent() {
        let layer = AtmosphereLayer::full_column();
        let modern = ModernTransparency::default();
        let angle = AngleIntegratedTransparency::default();

        assert_relative_eq!(
            modern.transparency(0.0, 288.15, 0.0, &layer).unwrap(),
            1.0,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            angle.transparency(0.0, 288.15, 0.0, &layer).unwrap(),
            1.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn modern_reference_column() {
        let value = ModernTransparency::default()
            .transparency(1.0, 288.15, 50.0, &AtmosphereLayer::full_column())
            .unwrap();
        assert_relative_eq!(value, 0.343, epsilon = 1e-3);
    }

    #[test]
    fn modern_decreases_with_co2() {
        let model = ModernTransparency::default();
        let layer = AtmosphereLayer::full_column();
        let mut previous = f64::INFINITY;
        for co2 in [0.0, 0.5, 1.0, 2.0, 4.0, 8.0] {
            let value = model.transparency(co2, 288.15, 50.0, &layer).unwrap();
            assert!(value < previous, "co2={} gave {}", co2, value);
            assert!(value > 0.0 && value <= 1.0);
            previous = value;
        }
    }

    #[test]
    fn lower_pressure_absorbs_less() {
        let model = ModernTransparency::default();
        let surface = AtmosphereLayer::new(1.0, 2.0).unwrap();
        let thin = surface.with_pressure(500.0).unwrap();
        assert!(
            model.transparency(1.0, 280.0, 60.0, &thin).unwrap()
                > model.transparency(1.0, 280.0, 60.0, &surface).unwrap()
        );
    }

    #[test]
    fn angle_integration_agrees_with_diffusivity_approximation() {
        let modern = ModernTransparency::default();
        let angle = AngleIntegratedTransparency::default();
        let layer = AtmosphereLayer::full_column();

        for co2 in [0.5, 1.0, 2.0, 4.0] {
            for (temperature, humidity) in [(288.15, 50.0), (250.0, 30.0), (300.0, 80.0)] {
                let a = modern.transparency(co2, temperature, humidity, &layer).unwrap();
                let b = angle.transparency(co2, temperature, humidity, &layer).unwrap();
                assert!(
                    (a - b).abs() < 0.02,
                    "co2={} T={} rh={}: {} vs {}",
                    co2,
                    temperature,
                    humidity,
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn domain_errors_propagate() {
        let layer = AtmosphereLayer::full_column();
        let model = ModernTransparency::default();
        assert!(model.transparency(-1.0, 288.15, 50.0, &layer).is_err());
        assert!(model.transparency(1.0, 288.15, 150.0, &layer).is_err());
        assert!(AngleIntegratedTransparency::default()
            .transparency(1.0, -3.0, 50.0, &layer)
            .is_err());
    }

    #[test]
    fn parameters_deserialize_with_defaults() {
        let parameters: BandModelParameters = toml::from_str("diffusivity_factor = 2.0").unwrap();
        assert_eq!(parameters.diffusivity_factor, 2.0);
        assert_eq!(parameters.bands.len(), 4);
        assert_eq!(parameters.co2_scale_height, 8.0);
    }
}
