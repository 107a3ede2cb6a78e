//! Error types for structured error handling.
//!
//! This module provides:
//! - `ValidationError`: Malformed inputs rejected before any iteration begins
//! - `SolverError`: Failures of the damped normal-equation solve
//!
//! Non-convergence is deliberately absent: the Furness balancer and the
//! calibrator report it as a flag on their results.

use thiserror::Error;

/// Input validation errors.
///
/// Raised eagerly, before balancing or calibration starts. Every variant
/// carries enough context (zone indices, parameter names, totals) to locate
/// the offending input.
///
/// # Examples
///
/// ```
/// use gravity_core::types::ValidationError;
///
/// let err = ValidationError::NanCost { origin: 3, destination: 7 };
/// assert!(format!("{}", err).contains("origin zone 3"));
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Cost matrix cell is NaN.
    #[error("NaN cost between origin zone {origin} and destination zone {destination}")]
    NanCost {
        /// Origin (row) index
        origin: usize,
        /// Destination (column) index
        destination: usize,
    },

    /// A value that must be non-negative is negative.
    #[error("Negative {what} at index {index}: {value}")]
    NegativeValue {
        /// Which input the value belongs to
        what: &'static str,
        /// Flat index of the value
        index: usize,
        /// The offending value
        value: f64,
    },

    /// A value that must be finite is infinite or NaN.
    #[error("Non-finite {what} at index {index}")]
    NonFiniteValue {
        /// Which input the value belongs to
        what: &'static str,
        /// Flat index of the value
        index: usize,
    },

    /// Dimensions of two inputs disagree.
    #[error("Shape mismatch for {what}: expected {expected}, got {got}")]
    ShapeMismatch {
        /// Which input has the wrong shape
        what: &'static str,
        /// Expected length
        expected: usize,
        /// Actual length
        got: usize,
    },

    /// Row and column marginal totals differ by more than the tolerance.
    #[error("Marginal totals differ: rows sum to {row_total}, columns sum to {col_total}")]
    MarginalMismatch {
        /// Sum of row targets
        row_total: f64,
        /// Sum of column targets
        col_total: f64,
    },

    /// Deterrence parameter outside its valid domain.
    #[error("Parameter {name} = {value} outside valid domain [{min}, {max}]")]
    InvalidParameter {
        /// Parameter name
        name: &'static str,
        /// Supplied value
        value: f64,
        /// Lower bound
        min: f64,
        /// Upper bound
        max: f64,
    },

    /// Wrong number of parameters for a deterrence function.
    #[error("Expected {expected} parameters, got {got}")]
    ParameterCount {
        /// Parameters required by the function family
        expected: usize,
        /// Parameters supplied
        got: usize,
    },

    /// Cost bands are empty, overlapping, unordered, or have bad shares.
    #[error("Invalid cost bands: {0}")]
    InvalidBands(String),

    /// Required input is empty.
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Zone index outside the matrix.
    #[error("Zone index {zone} out of range for {n_zones} zones")]
    ZoneOutOfRange {
        /// The index requested
        zone: usize,
        /// Number of zones available
        n_zones: usize,
    },

    /// Zone listed twice in one vector.
    #[error("Duplicate zone {0}")]
    DuplicateZone(String),

    /// Trip-end tags (kind, area, segment) or zone lists disagree.
    #[error("Inconsistent {what}: expected {expected}, got {got}")]
    Inconsistent {
        /// Which tag disagrees
        what: &'static str,
        /// Expected value
        expected: String,
        /// Actual value
        got: String,
    },

    /// A numeric setting is outside its allowed range.
    #[error("Invalid setting {name}: {reason}")]
    InvalidSetting {
        /// Setting name
        name: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

impl ValidationError {
    /// Create a shape mismatch error.
    pub fn shape_mismatch(what: &'static str, expected: usize, got: usize) -> Self {
        Self::ShapeMismatch {
            what,
            expected,
            got,
        }
    }

    /// Create an invalid bands error.
    pub fn invalid_bands(message: impl Into<String>) -> Self {
        Self::InvalidBands(message.into())
    }

    /// Create an empty input error.
    pub fn empty_input(message: impl Into<String>) -> Self {
        Self::EmptyInput(message.into())
    }

    /// Create an invalid setting error.
    pub fn invalid_setting(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            name,
            reason: reason.into(),
        }
    }

    /// Create an inconsistency error.
    pub fn inconsistent(
        what: &'static str,
        expected: impl ToString,
        got: impl ToString,
    ) -> Self {
        Self::Inconsistent {
            what,
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }

    /// Check if this is a NaN cost error.
    pub fn is_nan_cost(&self) -> bool {
        matches!(self, Self::NanCost { .. })
    }

    /// Check if this is a marginal mismatch error.
    pub fn is_marginal_mismatch(&self) -> bool {
        matches!(self, Self::MarginalMismatch { .. })
    }

    /// Check if this is a parameter domain error.
    pub fn is_invalid_parameter(&self) -> bool {
        matches!(
            self,
            Self::InvalidParameter { .. } | Self::ParameterCount { .. }
        )
    }
}

/// Checks that every value is finite and non-negative.
pub(crate) fn check_non_negative(what: &'static str, values: &[f64]) -> Result<(), ValidationError> {
    for (index, &value) in values.iter().enumerate() {
        if !value.is_finite() {
            return Err(ValidationError::NonFiniteValue { what, index });
        }
        if value < 0.0 {
            return Err(ValidationError::NegativeValue { what, index, value });
        }
    }
    Ok(())
}

/// Errors from the damped normal-equation solver.
///
/// # Examples
/// ```
/// use gravity_core::types::SolverError;
///
/// let err = SolverError::NotPositiveDefinite;
/// assert!(format!("{}", err).contains("positive definite"));
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    /// The damped system matrix is not positive definite.
    #[error("Normal equations are not positive definite")]
    NotPositiveDefinite,

    /// No parameters or no residuals.
    #[error("Empty system: {0}")]
    EmptySystem(String),

    /// Jacobian and residual dimensions disagree.
    #[error("Dimension mismatch: jacobian has {jacobian_rows} rows, residuals have {residuals}")]
    DimensionMismatch {
        /// Rows in the Jacobian
        jacobian_rows: usize,
        /// Length of the residual vector
        residuals: usize,
    },
}
