use thiserror::Error;

/// Error type for invalid model operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArrheniusError {
    /// A physical precondition was violated, e.g. a negative CO2 ratio or a
    /// relative humidity outside of 0 to 100 percent.
    #[error("Invalid {quantity} value {value}: {reason}")]
    Domain {
        quantity: &'static str,
        value: f64,
        reason: String,
    },
    #[error("Invalid run configuration: {0}")]
    Configuration(String),
    #[error("Radiative balance could not be solved: {0}")]
    Solvability(String),
    #[error("Grid index (column={column}, row={row}) is outside of a {columns}x{rows} grid")]
    IndexOutOfBounds {
        column: usize,
        row: usize,
        columns: usize,
        rows: usize,
    },
    #[error("Data for {variable} has shape {found:?}, expected {expected}")]
    ShapeMismatch {
        variable: String,
        expected: String,
        found: Vec<usize>,
    },
    #[error("No {variable} provider is registered under the name '{name}'")]
    UnknownProvider { variable: String, name: String },
    #[error("Output error: {0}")]
    Output(String),
}

impl ArrheniusError {
    pub fn domain(quantity: &'static str, value: f64, reason: impl Into<String>) -> Self {
        ArrheniusError::Domain {
            quantity,
            value,
            reason: reason.into(),
        }
    }
}

/// Convenience type for `Result<T, ArrheniusError>`.
pub type ArrheniusResult<T> = Result<T, ArrheniusError>;
