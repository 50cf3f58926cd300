//! Measured absorption tables from Arrhenius (1896)
//!
//! Keys are stored in ascending order. Bracket searches and nearest-key matching rely on it.

/// CO2 path keys of [`TRANSPARENCY_PERCENT`], in units of the 1896 reference path
pub const TRANSPARENCY_CO2_KEYS: [f64; 11] =
    [1.0, 1.2, 1.5, 2.0, 2.5, 3.0, 4.0, 6.0, 10.0, 20.0, 40.0];

/// Water-vapor path keys of [`TRANSPARENCY_PERCENT`]; 1.0 corresponds to 10 g/m^3
pub const TRANSPARENCY_H2O_KEYS: [f64; 9] = [0.3, 0.5, 1.0, 1.5, 2.0, 3.0, 4.0, 6.0, 10.0];

/// Atmospheric transparency in percent, indexed `[co2][h2o]`
pub const TRANSPARENCY_PERCENT: [[f64; 9]; 11] = [
    [37.2, 35.0, 30.7, 26.9, 23.9, 19.3, 16.0, 10.7, 8.9],
    [34.7, 32.7, 28.6, 25.1, 22.2, 17.8, 14.7, 9.7, 8.0],
    [31.5, 29.6, 25.9, 22.6, 19.9, 15.9, 13.0, 8.4, 6.9],
    [27.0, 25.3, 21.9, 19.1, 16.7, 13.1, 10.5, 6.6, 5.3],
    [23.5, 22.0, 19.0, 16.6, 14.4, 11.0, 8.7, 5.3, 4.2],
    [20.1, 18.8, 16.3, 14.2, 12.3, 9.3, 7.4, 4.2, 3.3],
    [15.8, 14.7, 12.7, 10.8, 9.3, 7.1, 5.6, 3.1, 2.0],
    [10.9, 10.2, 8.7, 7.3, 6.3, 4.8, 3.7, 1.9, 0.93],
    [6.6, 6.1, 5.2, 4.3, 3.5, 2.4, 1.8, 1.0, 0.26],
    [2.9, 2.5, 2.2, 1.8, 1.5, 1.0, 0.75, 0.39, 0.07],
    [0.88, 0.81, 0.67, 0.56, 0.46, 0.32, 0.24, 0.12, 0.02],
];

/// One CO2 row of the mean-path table: `(water vapor, mean path)` pairs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeanPathRow {
    pub co2: f64,
    pub entries: &'static [(f64, f64)],
}

/// Mean optical path multipliers, keyed by CO2 ratio then water vapor
///
/// The 3.5 row was never measured at a water-vapor amount of 3.0.
pub const MEAN_PATH: [MeanPathRow; 7] = [
    MeanPathRow {
        co2: 0.67,
        entries: &[(0.3, 1.69), (0.5, 1.68), (1.0, 1.64), (2.0, 1.57), (3.0, 1.53)],
    },
    MeanPathRow {
        co2: 1.0,
        entries: &[(0.3, 1.66), (0.5, 1.65), (1.0, 1.61), (2.0, 1.55), (3.0, 1.51)],
    },
    MeanPathRow {
        co2: 1.5,
        entries: &[(0.3, 1.62), (0.5, 1.61), (1.0, 1.57), (2.0, 1.51), (3.0, 1.47)],
    },
    MeanPathRow {
        co2: 2.0,
        entries: &[(0.3, 1.58), (0.5, 1.57), (1.0, 1.52), (2.0, 1.46), (3.0, 1.43)],
    },
    MeanPathRow {
        co2: 2.5,
        entries: &[(0.3, 1.56), (0.5, 1.54), (1.0, 1.50), (2.0, 1.45), (3.0, 1.41)],
    },
    MeanPathRow {
        co2: 3.0,
        entries: &[(0.3, 1.52), (0.5, 1.51), (1.0, 1.47), (2.0, 1.44), (3.0, 1.4)],
    },
    MeanPathRow {
        co2: 3.5,
        entries: &[(0.3, 1.48), (0.5, 1.48), (1.0, 1.45), (2.0, 1.42)],
    },
];

/// CO2 ratios for which a mean path is tabulated
pub fn mean_path_co2_keys() -> impl Iterator<Item = f64> {
    MEAN_PATH.iter().map(|row| row.co2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_strictly_ascending() {
        assert!(TRANSPARENCY_CO2_KEYS.windows(2).all(|w| w[0] < w[1]));
        assert!(TRANSPARENCY_H2O_KEYS.windows(2).all(|w| w[0] < w[1]));
        assert!(MEAN_PATH.windows(2).all(|w| w[0].co2 < w[1].co2));
        for row in MEAN_PATH.iter() {
            assert!(row.entries.windows(2).all(|w| w[0].0 < w[1].0));
        }
    }

    #[test]
    fn transparency_falls_with_absorber() {
        for row in TRANSPARENCY_PERCENT.iter() {
            assert!(row.windows(2).all(|w| w[0] > w[1]));
        }
        for column in 0..TRANSPARENCY_H2O_KEYS.len() {
            assert!(TRANSPARENCY_PERCENT
                .windows(2)
                .all(|w| w[0][column] > w[1][column]));
        }
    }
}
