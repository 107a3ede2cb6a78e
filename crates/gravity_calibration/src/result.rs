//! Calibration results.

use crate::state::CalibrationState;
use gravity_core::math::{AchievedDistribution, DeterrenceParameters};
use gravity_core::types::OdMatrix;
use std::fmt;

/// Terminal status of a calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalibrationStatus {
    /// Achieved distribution matched the target within tolerance.
    Converged,
    /// Budget exhausted after the fallback attempt, or cancelled. The result
    /// still carries the best parameters and matrix found.
    Failed,
}

impl fmt::Display for CalibrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationStatus::Converged => write!(f, "converged"),
            CalibrationStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of calibrating one area. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationResult {
    pub(crate) parameters: DeterrenceParameters,
    pub(crate) matrix: OdMatrix,
    pub(crate) achieved: AchievedDistribution,
    pub(crate) target_shares: Vec<f64>,
    pub(crate) target_mean_cost: f64,
    pub(crate) status: CalibrationStatus,
    pub(crate) iterations: usize,
    pub(crate) evaluations: usize,
    pub(crate) residual_error: f64,
    pub(crate) r_squared: f64,
    pub(crate) used_fallback: bool,
    pub(crate) cancelled: bool,
    pub(crate) furness_converged: bool,
    pub(crate) overflow_clips: usize,
    pub(crate) state_trace: Vec<CalibrationState>,
}

impl CalibrationResult {
    /// Calibrated (or best-found) parameters.
    #[inline]
    pub fn parameters(&self) -> &DeterrenceParameters {
        &self.parameters
    }

    /// Balanced OD matrix for [`Self::parameters`].
    #[inline]
    pub fn matrix(&self) -> &OdMatrix {
        &self.matrix
    }

    /// Consumes the result, returning the matrix.
    pub fn into_matrix(self) -> OdMatrix {
        self.matrix
    }

    /// Achieved cost distribution of [`Self::matrix`].
    #[inline]
    pub fn achieved(&self) -> &AchievedDistribution {
        &self.achieved
    }

    /// Target band shares.
    #[inline]
    pub fn target_shares(&self) -> &[f64] {
        &self.target_shares
    }

    /// Share-weighted mean band midpoint of the target.
    #[inline]
    pub fn target_mean_cost(&self) -> f64 {
        self.target_mean_cost
    }

    /// Converged or failed.
    #[inline]
    pub fn status(&self) -> CalibrationStatus {
        self.status
    }

    /// Returns `true` if the calibration converged.
    #[inline]
    pub fn is_converged(&self) -> bool {
        self.status == CalibrationStatus::Converged
    }

    /// Parameter updates proposed, across both attempts.
    #[inline]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Full seed-balance-evaluate runs, including Jacobian columns.
    #[inline]
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Sum of squared band-share differences.
    #[inline]
    pub fn residual_error(&self) -> f64 {
        self.residual_error
    }

    /// R² of achieved against target shares.
    #[inline]
    pub fn r_squared(&self) -> f64 {
        self.r_squared
    }

    /// Whether the fallback attempt ran.
    #[inline]
    pub fn used_fallback(&self) -> bool {
        self.used_fallback
    }

    /// Whether the run stopped on cancellation.
    #[inline]
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    /// Whether the Furness balance behind [`Self::matrix`] converged.
    #[inline]
    pub fn furness_converged(&self) -> bool {
        self.furness_converged
    }

    /// Overflow clips summed over every balance in the run.
    #[inline]
    pub fn overflow_clips(&self) -> usize {
        self.overflow_clips
    }

    /// States visited, in order.
    #[inline]
    pub fn state_trace(&self) -> &[CalibrationState] {
        &self.state_trace
    }

    /// Number of times `state` was entered.
    pub fn visits(&self, state: CalibrationState) -> usize {
        self.state_trace.iter().filter(|&&s| s == state).count()
    }
}
