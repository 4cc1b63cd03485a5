use crate::solver::newton::AttemptOutcome;

use serde::Serialize;

/// Error returned from [crate::ParameterFitter]
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FitError {
    #[error("technology label {0:?} does not match any known cell technology")]
    UnknownTechnology(String),

    #[error("invalid data sheet: {0}")]
    InvalidDatasheet(#[from] DatasheetError),

    #[error("no physically sane root after {attempts} attempts{}", describe_last(.last))]
    SolveFailed {
        attempts: usize,
        /// `None` if there was no initial guess to start from
        last: Option<AttemptOutcome>,
    },
}

fn describe_last(last: &Option<AttemptOutcome>) -> String {
    match last {
        Some(outcome) => format!(", last attempt: {outcome}"),
        None => String::new(),
    }
}

impl FitError {
    /// Status code reported through [crate::fit]
    pub fn status(&self) -> i32 {
        match self {
            Self::UnknownTechnology(_) => 1,
            Self::InvalidDatasheet(_) | Self::SolveFailed { .. } => 2,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DatasheetError {
    #[error("{name} must be finite, got {value}")]
    NonFinite { name: &'static str, value: f64 },

    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    #[error("maximum-power current {imp} must be smaller than short-circuit current {isc}")]
    CurrentOrder { imp: f64, isc: f64 },

    #[error("maximum-power voltage {vmp} must be smaller than open-circuit voltage {voc}")]
    VoltageOrder { vmp: f64, voc: f64 },

    #[error("number of cells in series must be positive, got {0}")]
    SeriesCells(i32),

    #[error("open-circuit voltage extrapolated to {temperature} K is not positive: {voc}")]
    ElevatedVoc { temperature: f64, voc: f64 },
}

/// Failure to evaluate the governing equations at some parameter vector
#[derive(Debug, thiserror::Error, PartialEq, Clone, Copy, Serialize)]
pub enum ResidualError {
    #[error("exponent argument {0} overflows")]
    ExponentOverflow(f64),

    #[error("residual of equation {0} is not finite")]
    NonFiniteResidual(usize),

    #[error("jacobian entry ({row}, {column}) is not finite")]
    NonFiniteJacobian { row: usize, column: usize },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum LinearSolveError {
    #[error("matrix must be square, got {rows}x{columns}")]
    NotSquare { rows: usize, columns: usize },

    #[error("right-hand side has {actual} rows, {expected} expected")]
    DimensionMismatch { actual: usize, expected: usize },

    #[error("matrix is singular at column {column}")]
    Singular { column: usize },
}
