//! Summaries of model output against reference data
//!
//! Tables are `(latitude band, time step)` arrays: one row per band from south to north, one
//! column per time step.

use crate::errors::{ArrheniusError, ArrheniusResult};
use crate::grid::{CellVariable, LatLongGrid};
use ndarray::{concatenate, Array2, Axis};

/// Band means of `variable` for each grid in a time sequence
pub fn band_table(grids: &[LatLongGrid], variable: CellVariable) -> ArrheniusResult<Array2<f64>> {
    let first = grids.first().ok_or_else(|| ArrheniusError::ShapeMismatch {
        variable: variable.to_string(),
        expected: "at least one time step".to_string(),
        found: vec![0],
    })?;
    let bands = first.dimensions().latitude_count();

    let mut table = Array2::zeros((bands, grids.len()));
    for (step, grid) in grids.iter().enumerate() {
        if grid.dimensions().latitude_count() != bands {
            return Err(ArrheniusError::ShapeMismatch {
                variable: variable.to_string(),
                expected: format!("{} latitude bands", bands),
                found: vec![grid.dimensions().latitude_count()],
            });
        }
        for (band, mean) in grid.band_means(variable).into_iter().enumerate() {
            table[[band, step]] = mean;
        }
    }
    Ok(table)
}

/// `expected - modelled`, element by element
pub fn deviations(expected: &Array2<f64>, modelled: &Array2<f64>) -> ArrheniusResult<Array2<f64>> {
    if expected.dim() != modelled.dim() {
        return Err(ArrheniusError::ShapeMismatch {
            variable: "expected temperature change".to_string(),
            expected: format!("{:?}", modelled.dim()),
            found: expected.shape().to_vec(),
        });
    }
    Ok(expected - modelled)
}

/// Modelled values with the deviations appended along the time axis
pub fn with_deviations(
    modelled: &Array2<f64>,
    deviations: &Array2<f64>,
) -> ArrheniusResult<Array2<f64>> {
    concatenate(Axis(1), &[modelled.view(), deviations.view()]).map_err(|e| {
        ArrheniusError::ShapeMismatch {
            variable: format!("deviations ({})", e),
            expected: format!("{} rows", modelled.nrows()),
            found: deviations.shape().to_vec(),
        }
    })
}

/// Mean, population variance and standard deviation of a table
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DeviationSummary {
    pub mean: f64,
    pub variance: f64,
    pub std_dev: f64,
}

pub fn summarize(values: &Array2<f64>) -> ArrheniusResult<DeviationSummary> {
    let mean = values.mean().ok_or_else(|| ArrheniusError::ShapeMismatch {
        variable: "deviations".to_string(),
        expected: "at least one value".to_string(),
        found: values.shape().to_vec(),
    })?;
    let variance = values
        .mapv(|v| (v - mean).powi(2))
        .mean()
        .unwrap_or_default();
    Ok(DeviationSummary {
        mean,
        variance,
        std_dev: variance.sqrt(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{GridCell, GridDimensions};
    use approx::assert_relative_eq;
    use ndarray::array;

    fn banded_grid(south: f64, north: f64) -> LatLongGrid {
        let dims = GridDimensions::from_counts(2, 2).unwrap();
        let cells = vec![
            GridCell::new(south, 50.0, 0.3).unwrap(),
            GridCell::new(south + 2.0, 50.0, 0.3).unwrap(),
            GridCell::new(north, 50.0, 0.3).unwrap(),
            GridCell::new(north, 50.0, 0.3).unwrap(),
        ];
        LatLongGrid::from_cells(dims, cells).unwrap()
    }

    #[test]
    fn band_table_is_latitude_by_time() {
        let table = band_table(
            &[banded_grid(0.0, 10.0), banded_grid(4.0, 20.0)],
            CellVariable::Temperature,
        )
        .unwrap();
        assert_eq!(table, array![[1.0, 5.0], [10.0, 20.0]]);
    }

    #[test]
    fn band_table_needs_grids() {
        assert!(band_table(&[], CellVariable::Albedo).is_err());
    }

    #[test]
    fn deviation_statistics() {
        let expected = array![[2.0, 4.0], [4.0, 6.0]];
        let modelled = array![[1.0, 1.0], [1.0, 1.0]];
        let diff = deviations(&expected, &modelled).unwrap();
        assert_eq!(diff, array![[1.0, 3.0], [3.0, 5.0]]);

        let summary = summarize(&diff).unwrap();
        assert_relative_eq!(summary.mean, 3.0);
        assert_relative_eq!(summary.variance, 2.0);
        assert_relative_eq!(summary.std_dev, 2.0_f64.sqrt());
    }

    #[test]
    fn mismatched_shapes() {
        let expected = array![[1.0, 2.0, 3.0]];
        let modelled = array![[1.0], [2.0]];
        assert!(matches!(
            deviations(&expected, &modelled),
            Err(ArrheniusError::ShapeMismatch { .. })
        ));
        assert!(with_deviations(&expected, &modelled).is_err());
    }

    #[test]
    fn deviations_follow_the_modelled_columns() {
        let modelled = array![[1.0], [2.0]];
        let diff = array![[0.5], [-0.5]];
        assert_eq!(
            with_deviations(&modelled, &diff).unwrap(),
            array![[1.0, 0.5], [2.0, -0.5]]
        );
    }

    #[test]
    fn empty_tables_have_no_summary() {
        let empty = Array2::<f64>::zeros((0, 3));
        assert!(summarize(&empty).is_err());
    }
}
