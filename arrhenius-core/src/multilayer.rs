//! Radiative balance of a column of stacked layers
//!
//! A column is described by one transparency per layer, ordered from the ground (index 0) up
//! through the atmosphere. Each layer radiates as a grey body with absorptivity
//! `1 - transparency`. The balance matrix `M` relates the fourth powers of the layer
//! temperatures to the net energy each layer must shed:
//!
//! ```text
//! M . T^4 = c
//! ```
//!
//! Calibrating against an observed temperature profile fixes `c`. Solving the same system with
//! a perturbed set of transparencies then gives the new equilibrium profile.
//!
//! ```rust
//! use arrhenius_core::multilayer::{build_balance_matrix, calibrate, solve};
//!
//! let temperatures = [288.0, 255.0];
//! let before = build_balance_matrix(&[0.3, 0.4]).unwrap();
//! let constants = calibrate(&before, &temperatures).unwrap();
//!
//! let after = build_balance_matrix(&[0.3, 0.35]).unwrap();
//! let warmer = solve(&after, &constants).unwrap();
//! assert!(warmer[0] > temperatures[0]);
//! ```

use crate::errors::{ArrheniusError, ArrheniusResult};
use crate::transparency::AtmosphereLayer;
use nalgebra::{DMatrix, DVector};

/// Specific gas constant of dry air, J/(kg K)
const GAS_CONSTANT_DRY_AIR: f64 = 287.053;
/// Temperature of the reference atmosphere, K
const REFERENCE_TEMPERATURE: f64 = 288.15;
/// Standard gravity, m/s^2
const GRAVITY: f64 = 9.80665;
/// Sea level pressure, Pa
const REFERENCE_PRESSURE: f64 = 101_325.0;
const PASCALS_PER_HECTOPASCAL: f64 = 100.0;

/// Build the balance matrix for a column of `transparencies`
///
/// Entry `[i][j]` for `i != j` is minus the fraction of layer `j`'s emission absorbed by layer
/// `i`. The diagonal holds everything layer `i` emits: the part escaping to space plus the parts
/// absorbed by every other layer.
pub fn build_balance_matrix(transparencies: &[f64]) -> ArrheniusResult<DMatrix<f64>> {
    if transparencies.is_empty() {
        return Err(ArrheniusError::Solvability(
            "a column needs at least one layer".to_string(),
        ));
    }
    if let Some(&bad) = transparencies.iter().find(|t| !(0.0..=1.0).contains(*t)) {
        return Err(ArrheniusError::domain(
            "transparency",
            bad,
            "must be between 0 and 1",
        ));
    }

    let size = transparencies.len();
    let top = size - 1;
    let absorptivities: Vec<f64> = transparencies.iter().map(|t| 1.0 - t).collect();

    // path[(a, b)] is the fraction of radiation leaving layer a that reaches layer b
    let mut path = DMatrix::<f64>::zeros(size, size);
    for b in 1..size {
        for a in 0..size {
            path[(a, b)] = path[(a, b - 1)] * transparencies[b - 1];
        }
        path[(b - 1, b)] = 1.0;
    }

    let to_space: Vec<f64> = (0..size)
        .map(|a| {
            let reaching = if a == top { 1.0 } else { path[(a, top)] * transparencies[top] };
            reaching * absorptivities[a]
        })
        .collect();

    let exchange =
        DMatrix::from_fn(size, size, |a, b| path[(a, b)] * absorptivities[a] * absorptivities[b]);

    Ok(DMatrix::from_fn(size, size, |i, j| {
        if i == j {
            let upward: f64 = (i + 1..size).map(|k| exchange[(i, k)]).sum();
            let downward: f64 = (0..i).map(|k| exchange[(k, i)]).sum();
            to_space[i] + upward + downward
        } else if j < i {
            -exchange[(j, i)]
        } else {
            -exchange[(i, j)]
        }
    }))
}

/// Balance constants implied by an observed temperature profile (K)
pub fn calibrate(matrix: &DMatrix<f64>, temperatures: &[f64]) -> ArrheniusResult<DVector<f64>> {
    if !matrix.is_square() || matrix.ncols() != temperatures.len() {
        return Err(ArrheniusError::ShapeMismatch {
            variable: "temperature profile".to_string(),
            expected: format!(
                "one temperature per row of a {}x{} matrix",
                matrix.nrows(),
                matrix.ncols()
            ),
            found: vec![temperatures.len()],
        });
    }

    let fourth_powers =
        DVector::from_iterator(temperatures.len(), temperatures.iter().map(|t| t.powi(4)));
    Ok(matrix * fourth_powers)
}

/// Temperatures (K) that balance `constants` under `matrix`
pub fn solve(matrix: &DMatrix<f64>, constants: &DVector<f64>) -> ArrheniusResult<Vec<f64>> {
    if matrix.nrows() != constants.len() || !matrix.is_square() {
        return Err(ArrheniusError::Solvability(format!(
            "a {}x{} balance matrix cannot be solved against {} constants",
            matrix.nrows(),
            matrix.ncols(),
            constants.len()
        )));
    }

    let fourth_powers = matrix.clone().lu().solve(constants).ok_or_else(|| {
        ArrheniusError::Solvability("balance matrix is singular".to_string())
    })?;

    fourth_powers
        .iter()
        .map(|&x| {
            if x.is_finite() && x >= 0.0 {
                Ok(x.powf(0.25))
            } else {
                Err(ArrheniusError::Solvability(format!(
                    "balance has no physical solution (T^4 = {})",
                    x
                )))
            }
        })
        .collect()
}

/// Height in km at which the reference atmosphere reaches `pressure` (hPa)
pub fn hypsometric_elevation(pressure: f64) -> f64 {
    let scale_height = GAS_CONSTANT_DRY_AIR * REFERENCE_TEMPERATURE / GRAVITY;
    -scale_height * (pressure * PASCALS_PER_HECTOPASCAL / REFERENCE_PRESSURE).ln() / 1000.0
}

/// Convert the pressures (hPa) at the top of each atmospheric layer into layer geometry
///
/// Pressures must fall strictly with height and stay below sea-level pressure so that every
/// layer has a positive depth. The first layer starts at the surface.
pub fn pressures_to_layers(pressures: &[f64]) -> ArrheniusResult<Vec<AtmosphereLayer>> {
    let mut floor = 0.0;
    let mut layers = Vec::with_capacity(pressures.len());

    for &pressure in pressures {
        if !(pressure > 0.0) || !pressure.is_finite() {
            return Err(ArrheniusError::domain("pressure", pressure, "must be positive"));
        }
        let elevation = hypsometric_elevation(pressure);
        if elevation <= floor {
            return Err(ArrheniusError::domain(
                "pressure",
                pressure,
                "layer pressures must decrease with height and stay below 1013.25 hPa",
            ));
        }

        layers.push(
            AtmosphereLayer::from_top(elevation, elevation - floor)?.with_pressure(pressure)?,
        );
        floor = elevation;
    }
    Ok(layers)
}
