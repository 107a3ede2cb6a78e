//! Trip-length (cost) distribution of an OD matrix.
//!
//! [`BandIndex`] precomputes which band every cell of a cost matrix falls in,
//! so repeated evaluations during calibration are a single pass over the
//! matrix. It depends only on the cost matrix and the band edges, never on
//! deterrence parameters, and can be shared read-only between workers.

use crate::types::{CostMatrix, OdMatrix, TargetDistribution, ValidationError};

/// Band membership of every cell of a cost matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct BandIndex {
    n_zones: usize,
    bands: Vec<u32>,
    midpoints: Vec<f64>,
}

impl BandIndex {
    /// Assigns every cell of `cost` to a band of `target`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NanCost`] naming the first NaN cell.
    pub fn build(cost: &CostMatrix, target: &TargetDistribution) -> Result<Self, ValidationError> {
        let n = cost.n_zones();
        let mut bands = Vec::with_capacity(n * n);
        for i in 0..n {
            for (j, c) in cost.row(i).enumerate() {
                if c.is_nan() {
                    return Err(ValidationError::NanCost {
                        origin: i,
                        destination: j,
                    });
                }
                bands.push(target.band_for(c) as u32);
            }
        }
        Ok(Self {
            n_zones: n,
            bands,
            midpoints: target.bands().iter().map(|b| b.midpoint()).collect(),
        })
    }

    /// Number of zones covered.
    #[inline]
    pub fn n_zones(&self) -> usize {
        self.n_zones
    }

    /// Number of bands.
    #[inline]
    pub fn n_bands(&self) -> usize {
        self.midpoints.len()
    }

    /// Band of cell `(i, j)`.
    #[inline]
    pub fn band_of(&self, i: usize, j: usize) -> usize {
        self.bands[i * self.n_zones + j] as usize
    }

    /// Trips per band.
    ///
    /// # Errors
    ///
    /// Returns a shape error if `matrix` is not `n_zones × n_zones`.
    pub fn band_totals(&self, matrix: &OdMatrix) -> Result<Vec<f64>, ValidationError> {
        if matrix.shape() != (self.n_zones, self.n_zones) {
            return Err(ValidationError::shape_mismatch(
                "matrix for band index",
                self.n_zones * self.n_zones,
                matrix.rows() * matrix.cols(),
            ));
        }
        let mut totals = vec![0.0; self.n_bands()];
        for (&band, &trips) in self.bands.iter().zip(matrix.as_slice()) {
            totals[band as usize] += trips;
        }
        Ok(totals)
    }

    /// Achieved distribution of `matrix` on these bands.
    pub fn evaluate(&self, matrix: &OdMatrix) -> Result<AchievedDistribution, ValidationError> {
        let trips = self.band_totals(matrix)?;
        let total_trips: f64 = trips.iter().sum();
        let shares: Vec<f64> = if total_trips > 0.0 {
            trips.iter().map(|t| t / total_trips).collect()
        } else {
            vec![0.0; trips.len()]
        };
        let mean_cost = shares.iter().zip(&self.midpoints).map(|(s, m)| s * m).sum();
        Ok(AchievedDistribution {
            shares,
            trips,
            total_trips,
            mean_cost,
        })
    }
}

/// Cost distribution produced by a matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct AchievedDistribution {
    /// Share of trips per band. All zero if the matrix is empty.
    pub shares: Vec<f64>,
    /// Trips per band.
    pub trips: Vec<f64>,
    /// Total trips in the matrix.
    pub total_trips: f64,
    /// Share-weighted mean of band midpoints.
    pub mean_cost: f64,
}

/// Evaluates the cost distribution of `matrix` against `target`'s bands.
///
/// # Examples
///
/// ```
/// use gravity_core::math::distribution::evaluate;
/// use gravity_core::types::{CostMatrix, OdMatrix, TargetDistribution};
///
/// let cost = CostMatrix::from_rows(&[vec![2.5, 7.5], vec![7.5, 2.5]]).unwrap();
/// let target = TargetDistribution::from_triples(&[(0.0, 5.0, 0.5), (5.0, 10.0, 0.5)]).unwrap();
/// let matrix = OdMatrix::filled(2, 2, 1.0);
///
/// let achieved = evaluate(&matrix, &cost, &target).unwrap();
/// assert_eq!(achieved.shares, vec![0.5, 0.5]);
/// ```
pub fn evaluate(
    matrix: &OdMatrix,
    cost: &CostMatrix,
    target: &TargetDistribution,
) -> Result<AchievedDistribution, ValidationError> {
    BandIndex::build(cost, target)?.evaluate(matrix)
}

/// Sum of squared differences between achieved and target shares.
pub fn squared_share_error(achieved: &[f64], target: &[f64]) -> f64 {
    achieved.iter().zip(target).map(|(a, t)| (a - t) * (a - t)).sum()
}

/// Coefficient of determination of achieved against target shares, floored
/// at zero.
///
/// A flat target has no variance; it scores 1 when matched exactly and 0
/// otherwise.
pub fn r_squared(achieved: &[f64], target: &[f64]) -> f64 {
    if target.is_empty() {
        return 0.0;
    }
    let mean = target.iter().sum::<f64>() / target.len() as f64;
    let ss_tot: f64 = target.iter().map(|t| (t - mean) * (t - mean)).sum();
    let ss_res = squared_share_error(achieved, target);
    if ss_tot <= 0.0 {
        return if ss_res <= f64::EPSILON { 1.0 } else { 0.0 };
    }
    (1.0 - ss_res / ss_tot).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_bands() -> TargetDistribution {
        TargetDistribution::from_triples(&[(0.0, 5.0, 0.5), (5.0, 10.0, 0.5)]).unwrap()
    }

    // ========================================
    // Evaluate Tests
    // ========================================

    #[test]
    fn test_midpoint_costs_even_mass() {
        let cost = CostMatrix::from_rows(&[vec![2.5, 7.5], vec![7.5, 2.5]]).unwrap();
        let matrix = OdMatrix::filled(2, 2, 4.0);
        let achieved = evaluate(&matrix, &cost, &two_bands()).unwrap();
        assert_eq!(achieved.shares, vec![0.5, 0.5]);
        assert_eq!(achieved.trips, vec![8.0, 8.0]);
        assert_relative_eq!(achieved.mean_cost, 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_costs_are_valid() {
        let cost = CostMatrix::new(2, vec![0.0; 4]).unwrap();
        let achieved = evaluate(&OdMatrix::filled(2, 2, 1.0), &cost, &two_bands()).unwrap();
        assert_eq!(achieved.shares, vec![1.0, 0.0]);
    }

    #[test]
    fn test_costs_beyond_last_band_land_in_last_band() {
        let cost = CostMatrix::from_rows(&[vec![1.0, 50.0], vec![50.0, 1.0]]).unwrap();
        let achieved = evaluate(&OdMatrix::filled(2, 2, 1.0), &cost, &two_bands()).unwrap();
        assert_eq!(achieved.shares, vec![0.5, 0.5]);
    }

    #[test]
    fn test_empty_matrix_gives_zero_shares() {
        let cost = CostMatrix::from_rows(&[vec![1.0, 6.0], vec![6.0, 1.0]]).unwrap();
        let achieved = evaluate(&OdMatrix::zeros(2, 2), &cost, &two_bands()).unwrap();
        assert_eq!(achieved.shares, vec![0.0, 0.0]);
        assert_eq!(achieved.total_trips, 0.0);
    }

    #[test]
    fn test_shape_mismatch() {
        let cost = CostMatrix::from_rows(&[vec![1.0, 6.0], vec![6.0, 1.0]]).unwrap();
        let err = evaluate(&OdMatrix::zeros(3, 3), &cost, &two_bands()).unwrap_err();
        assert!(matches!(err, ValidationError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_band_index_on_view() {
        let cost = CostMatrix::from_rows(&[
            vec![0.0, 1.0, 9.0],
            vec![1.0, 0.0, 6.0],
            vec![9.0, 6.0, 0.0],
        ])
        .unwrap();
        let view = cost.select(&[0, 2]).unwrap();
        let index = BandIndex::build(&view, &two_bands()).unwrap();
        assert_eq!(index.n_zones(), 2);
        assert_eq!(index.band_of(0, 1), 1);
        assert_eq!(index.band_of(1, 1), 0);
    }

    // ========================================
    // Error Metric Tests
    // ========================================

    #[test]
    fn test_squared_share_error() {
        assert_relative_eq!(squared_share_error(&[0.6, 0.4], &[0.5, 0.5]), 0.02, epsilon = 1e-12);
        assert_eq!(squared_share_error(&[0.5, 0.5], &[0.5, 0.5]), 0.0);
    }

    #[test]
    fn test_r_squared() {
        assert_relative_eq!(r_squared(&[0.2, 0.3, 0.5], &[0.2, 0.3, 0.5]), 1.0);
        let r2 = r_squared(&[0.25, 0.3, 0.45], &[0.2, 0.3, 0.5]);
        assert!(r2 > 0.5 && r2 < 1.0);
        assert_eq!(r_squared(&[1.0, 0.0, 0.0], &[0.0, 0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_r_squared_flat_target() {
        assert_eq!(r_squared(&[0.5, 0.5], &[0.5, 0.5]), 1.0);
        assert_eq!(r_squared(&[0.6, 0.4], &[0.5, 0.5]), 0.0);
    }
}
