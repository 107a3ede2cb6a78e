//! Doubly-constrained Furness balancing.
//!
//! This module provides the [`FurnessBalancer`] for fitting a non-negative
//! seed matrix to row and column marginals by iterative proportional fitting.
//!
//! # Algorithm
//!
//! Each iteration rescales every row to its target, then every column:
//!
//! ```text
//! T_ij <- T_ij * R_i / sum_j T_ij
//! T_ij <- T_ij * C_j / sum_i T_ij
//! ```
//!
//! until the largest absolute marginal difference is within tolerance or the
//! iteration budget runs out. Running out is reported through
//! [`FurnessResult::converged`], never as an error.
//!
//! # Example
//!
//! ```
//! use gravity_core::math::furness::balance;
//! use gravity_core::types::OdMatrix;
//!
//! let seed = OdMatrix::filled(3, 3, 1.0);
//! let result = balance(seed, &[10.0, 20.0, 30.0], &[15.0, 15.0, 30.0], 50, 1e-6).unwrap();
//!
//! assert!(result.converged);
//! assert!((result.matrix.get(2, 2) - 15.0).abs() < 1e-9);
//! ```

use crate::types::error::check_non_negative;
use crate::types::{OdMatrix, ValidationError};
use tracing::{debug, warn};

/// Configuration for the Furness balancer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FurnessConfig {
    /// Maximum number of row+column sweeps.
    pub max_iterations: usize,
    /// Convergence tolerance on the largest absolute marginal difference.
    pub tolerance: f64,
    /// Rescaled cells above this value are clipped to it.
    pub overflow_ceiling: f64,
    /// Value placed in empty rows/columns that have a positive target.
    pub infill_floor: f64,
}

impl Default for FurnessConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3000,
            tolerance: 1e-6,
            overflow_ceiling: 1e250,
            infill_floor: 1e-8,
        }
    }
}

impl FurnessConfig {
    /// Create a configuration with the given budget and tolerance.
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
            ..Default::default()
        }
    }
}

/// Diagnostics collected during one balance call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FurnessDiagnostics {
    /// Number of cell rescalings clipped at the overflow ceiling.
    pub overflow_clips: usize,
    /// Number of cells set to the infill floor, before or during the sweeps.
    pub infilled_cells: usize,
    /// Largest absolute marginal difference on exit.
    pub max_marginal_error: f64,
}

/// Result of a Furness balance.
#[derive(Debug, Clone, PartialEq)]
pub struct FurnessResult {
    /// Balanced matrix.
    pub matrix: OdMatrix,
    /// Whether the marginals are within tolerance.
    pub converged: bool,
    /// Number of sweeps performed.
    pub iterations: usize,
    /// Overflow, infill, and error diagnostics.
    pub diagnostics: FurnessDiagnostics,
}

/// Iterative proportional fitting to row and column targets.
#[derive(Debug, Clone, Default)]
pub struct FurnessBalancer {
    config: FurnessConfig,
}

impl FurnessBalancer {
    /// Create a balancer with the given configuration.
    pub fn new(config: FurnessConfig) -> Self {
        Self { config }
    }

    /// Get the balancer configuration.
    pub fn config(&self) -> &FurnessConfig {
        &self.config
    }

    /// Balance `seed` to the given marginals.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if shapes disagree, any seed cell or target
    /// is negative or non-finite, or the row and column totals differ by more
    /// than the tolerance.
    pub fn balance(
        &self,
        seed: OdMatrix,
        row_targets: &[f64],
        col_targets: &[f64],
    ) -> Result<FurnessResult, ValidationError> {
        let (n_rows, n_cols) = seed.shape();
        if row_targets.len() != n_rows {
            return Err(ValidationError::shape_mismatch("row targets", n_rows, row_targets.len()));
        }
        if col_targets.len() != n_cols {
            return Err(ValidationError::shape_mismatch("column targets", n_cols, col_targets.len()));
        }
        check_non_negative("seed cell", seed.as_slice())?;
        check_non_negative("row target", row_targets)?;
        check_non_negative("column target", col_targets)?;

        let row_total: f64 = row_targets.iter().sum();
        let col_total: f64 = col_targets.iter().sum();
        let allowed = self.config.tolerance.max(1e-9 * row_total.max(col_total));
        if (row_total - col_total).abs() > allowed {
            return Err(ValidationError::MarginalMismatch {
                row_total,
                col_total,
            });
        }

        let mut matrix = seed;
        let mut diagnostics = FurnessDiagnostics {
            infilled_cells: infill_empty(&mut matrix, row_targets, col_targets, self.config.infill_floor),
            ..Default::default()
        };

        let mut error = marginal_error(&matrix, row_targets, col_targets);
        let mut iterations = 0;
        while error > self.config.tolerance && iterations < self.config.max_iterations {
            // Column scaling can empty a row whose mass sat in zero-target columns
            if iterations > 0 {
                diagnostics.infilled_cells +=
                    infill_empty(&mut matrix, row_targets, col_targets, self.config.infill_floor);
            }
            diagnostics.overflow_clips += scale_rows(&mut matrix, row_targets, self.config.overflow_ceiling);
            diagnostics.overflow_clips += scale_cols(&mut matrix, col_targets, self.config.overflow_ceiling);
            iterations += 1;
            error = marginal_error(&matrix, row_targets, col_targets);
        }
        diagnostics.max_marginal_error = error;

        if diagnostics.overflow_clips > 0 {
            warn!(
                clips = diagnostics.overflow_clips,
                ceiling = self.config.overflow_ceiling,
                "Furness rescaling clipped at overflow ceiling"
            );
        }
        let converged = error <= self.config.tolerance;
        debug!(iterations, error, converged, "Furness balance finished");

        Ok(FurnessResult {
            matrix,
            converged,
            iterations,
            diagnostics,
        })
    }
}

/// Balance `seed` with the default ceiling and infill floor.
pub fn balance(
    seed: OdMatrix,
    row_targets: &[f64],
    col_targets: &[f64],
    max_iterations: usize,
    tolerance: f64,
) -> Result<FurnessResult, ValidationError> {
    FurnessBalancer::new(FurnessConfig::new(max_iterations, tolerance)).balance(seed, row_targets, col_targets)
}

/// Puts `floor` into empty rows and columns that have a positive target,
/// on cells whose opposite marginal is positive.
fn infill_empty(matrix: &mut OdMatrix, row_targets: &[f64], col_targets: &[f64], floor: f64) -> usize {
    let mut filled = 0;
    let row_sums = matrix.row_sums();
    for (i, (&sum, &target)) in row_sums.iter().zip(row_targets).enumerate() {
        if sum > 0.0 || target <= 0.0 {
            continue;
        }
        for (cell, &col_target) in matrix.row_mut(i).iter_mut().zip(col_targets) {
            if col_target > 0.0 {
                *cell = floor;
                filled += 1;
            }
        }
    }
    let col_sums = matrix.col_sums();
    for (j, (&sum, &target)) in col_sums.iter().zip(col_targets).enumerate() {
        if sum > 0.0 || target <= 0.0 {
            continue;
        }
        for (i, &row_target) in row_targets.iter().enumerate() {
            if row_target > 0.0 {
                matrix.set(i, j, floor);
                filled += 1;
            }
        }
    }
    filled
}

/// Clips cells above `ceiling`, returning clip count.
#[inline]
fn clip_line<'a>(cells: impl Iterator<Item = &'a mut f64>, ceiling: f64) -> usize {
    let mut clips = 0;
    for v in cells {
        if *v > ceiling {
            *v = ceiling;
            clips += 1;
        }
    }
    clips
}

/// Rescales one line of cells from `sum` to `target`, returning clip count.
#[inline]
fn rescale<'a>(cells: impl Iterator<Item = &'a mut f64>, sum: f64, target: f64, ceiling: f64) -> usize {
    let mut clips = 0;
    if target == 0.0 {
        cells.for_each(|v| *v = 0.0);
        return 0;
    }
    if sum <= 0.0 || !sum.is_finite() {
        return 0;
    }
    let factor = target / sum;
    for v in cells {
        // Tiny sums can push the common factor to infinity
        let scaled = if factor.is_finite() { *v * factor } else { target * (*v / sum) };
        *v = if scaled > ceiling {
            clips += 1;
            ceiling
        } else {
            scaled
        };
    }
    clips
}

fn scale_rows(matrix: &mut OdMatrix, targets: &[f64], ceiling: f64) -> usize {
    let mut clips = 0;
    for (i, &target) in targets.iter().enumerate() {
        let row = matrix.row_mut(i);
        let mut sum: f64 = row.iter().sum();
        if !sum.is_finite() {
            clips += clip_line(row.iter_mut(), ceiling);
            sum = row.iter().sum();
        }
        clips += rescale(row.iter_mut(), sum, target, ceiling);
    }
    clips
}

fn scale_cols(matrix: &mut OdMatrix, targets: &[f64], ceiling: f64) -> usize {
    let n_cols = matrix.cols();
    if n_cols == 0 {
        return 0;
    }
    let sums = matrix.col_sums();
    let mut clips = 0;
    for (j, (&target, &sum)) in targets.iter().zip(&sums).enumerate() {
        let mut sum = sum;
        if !sum.is_finite() {
            clips += clip_line(matrix.as_mut_slice().iter_mut().skip(j).step_by(n_cols), ceiling);
            sum = matrix.as_slice().iter().skip(j).step_by(n_cols).sum();
        }
        let column = matrix.as_mut_slice().iter_mut().skip(j).step_by(n_cols);
        clips += rescale(column, sum, target, ceiling);
    }
    clips
}

/// Largest absolute difference between achieved and target marginals.
pub fn marginal_error(matrix: &OdMatrix, row_targets: &[f64], col_targets: &[f64]) -> f64 {
    let rows = matrix.row_sums().iter().zip(row_targets).map(|(a, t)| (a - t).abs()).fold(0.0, f64::max);
    let cols = matrix.col_sums().iter().zip(col_targets).map(|(a, t)| (a - t).abs()).fold(0.0, f64::max);
    rows.max(cols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // ========================================
    // FurnessConfig Tests
    // ========================================

    #[test]
    fn test_config_default() {
        let config = FurnessConfig::default();
        assert_eq!(config.max_iterations, 3000);
        assert!((config.tolerance - 1e-6).abs() < 1e-18);
        assert!(config.overflow_ceiling > 1e200);
    }

    #[test]
    fn test_config_new() {
        let config = FurnessConfig::new(50, 1e-3);
        assert_eq!(config.max_iterations, 50);
        assert_eq!(config.infill_floor, FurnessConfig::default().infill_floor);
    }

    // ========================================
    // Balance Tests
    // ========================================

    #[test]
    fn test_three_zone_exact_marginals() {
        let seed = OdMatrix::filled(3, 3, 1.0);
        let p = [10.0, 20.0, 30.0];
        let a = [15.0, 15.0, 30.0];
        let result = balance(seed, &p, &a, 50, 1e-6).unwrap();

        assert!(result.converged);
        assert_eq!(result.iterations, 1);
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(result.matrix.get(i, j), p[i] * a[j] / 60.0, epsilon = 1e-12);
            }
        }
        for (s, t) in result.matrix.row_sums().iter().zip(&p) {
            assert_relative_eq!(s, t, epsilon = 1e-9);
        }
        for (s, t) in result.matrix.col_sums().iter().zip(&a) {
            assert_relative_eq!(s, t, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_non_uniform_seed_converges() {
        let seed = OdMatrix::from_rows(&[vec![5.0, 1.0, 0.2], vec![1.0, 4.0, 1.0], vec![0.1, 2.0, 6.0]]).unwrap();
        let result = balance(seed, &[100.0, 50.0, 25.0], &[40.0, 60.0, 75.0], 500, 1e-8).unwrap();
        assert!(result.converged);
        assert!(result.diagnostics.max_marginal_error <= 1e-8);
    }

    #[test]
    fn test_zero_row_target_zeroes_row() {
        let seed = OdMatrix::filled(2, 2, 3.0);
        let result = balance(seed, &[0.0, 10.0], &[4.0, 6.0], 100, 1e-9).unwrap();
        assert_eq!(result.matrix.row(0), &[0.0, 0.0]);
        assert!(result.converged);
    }

    #[test]
    fn test_zero_column_target_zeroes_column() {
        let seed = OdMatrix::filled(2, 2, 3.0);
        let result = balance(seed, &[4.0, 6.0], &[10.0, 0.0], 100, 1e-9).unwrap();
        assert_eq!(result.matrix.get(0, 1), 0.0);
        assert_eq!(result.matrix.get(1, 1), 0.0);
    }

    #[test]
    fn test_budget_exhaustion_is_not_an_error() {
        let seed = OdMatrix::from_rows(&[vec![1.0, 100.0], vec![100.0, 1.0]]).unwrap();
        let result = balance(seed, &[1.0, 99.0], &[99.0, 1.0], 1, 1e-12).unwrap();
        assert!(!result.converged);
        assert_eq!(result.iterations, 1);
    }

    #[test]
    fn test_zero_budget_reports_error_only() {
        let seed = OdMatrix::filled(2, 2, 1.0);
        let result = balance(seed.clone(), &[3.0, 1.0], &[2.0, 2.0], 0, 1e-6).unwrap();
        assert!(!result.converged);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.matrix, seed);
        assert_relative_eq!(result.diagnostics.max_marginal_error, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_row_with_positive_target_is_infilled() {
        let seed = OdMatrix::from_rows(&[vec![0.0, 0.0], vec![1.0, 1.0]]).unwrap();
        let result = balance(seed, &[5.0, 5.0], &[5.0, 5.0], 100, 1e-9).unwrap();
        assert_eq!(result.diagnostics.infilled_cells, 2);
        assert!(result.converged);
        assert_relative_eq!(result.matrix.row_sums()[0], 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_overflow_is_clipped_and_counted() {
        let seed = OdMatrix::from_rows(&[vec![1.0, 1.0], vec![1.0, 1.0]]).unwrap();
        let config = FurnessConfig {
            overflow_ceiling: 10.0,
            ..FurnessConfig::new(5, 1e-9)
        };
        let result = FurnessBalancer::new(config).balance(seed, &[100.0, 100.0], &[100.0, 100.0]).unwrap();
        assert!(result.diagnostics.overflow_clips > 0);
        assert!(result.matrix.as_slice().iter().all(|&v| v <= 10.0));
        assert!(!result.converged);
    }

    #[test]
    fn test_overflowing_row_sum_is_clipped_not_zeroed() {
        let seed = OdMatrix::from_rows(&[vec![1e308, 1e308], vec![1.0, 1.0]]).unwrap();
        let result = balance(seed, &[1.0, 1.0], &[1.0, 1.0], 3000, 1e-9).unwrap();

        assert!(result.converged);
        assert_eq!(result.diagnostics.overflow_clips, 2);
        for &v in result.matrix.as_slice() {
            assert_relative_eq!(v, 0.5, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_row_emptied_by_zero_columns_is_refilled() {
        let seed = OdMatrix::from_rows(&[vec![0.0, 5.0], vec![5.0, 5.0]]).unwrap();
        let result = balance(seed, &[5.0, 5.0], &[10.0, 0.0], 100, 1e-9).unwrap();

        assert!(result.converged);
        assert!(result.diagnostics.infilled_cells > 0);
        assert_relative_eq!(result.matrix.get(0, 0), 5.0, epsilon = 1e-9);
        assert_relative_eq!(result.matrix.get(1, 0), 5.0, epsilon = 1e-9);
        assert_eq!(result.matrix.get(0, 1), 0.0);
        assert_eq!(result.matrix.get(1, 1), 0.0);
    }

    // ========================================
    // Validation Tests
    // ========================================

    #[test]
    fn test_marginal_mismatch_rejected() {
        let err = balance(OdMatrix::filled(2, 2, 1.0), &[10.0, 10.0], &[10.0, 5.0], 10, 1e-6).unwrap_err();
        assert!(err.is_marginal_mismatch());
    }

    #[test]
    fn test_negative_target_rejected() {
        let err = balance(OdMatrix::filled(2, 2, 1.0), &[-1.0, 1.0], &[0.0, 0.0], 10, 1e-6).unwrap_err();
        assert!(matches!(err, ValidationError::NegativeValue { what: "row target", .. }));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let err = balance(OdMatrix::filled(2, 3, 1.0), &[1.0, 1.0], &[1.0, 1.0], 10, 1e-6).unwrap_err();
        assert_eq!(err, ValidationError::shape_mismatch("column targets", 3, 2));
    }

    #[test]
    fn test_marginal_error() {
        let m = OdMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_relative_eq!(marginal_error(&m, &[3.0, 7.0], &[4.0, 6.0]), 0.0);
        assert_relative_eq!(marginal_error(&m, &[3.0, 7.0], &[4.0, 8.5]), 2.5);
    }
}
