//! Immutable zone-to-zone travel cost matrix.
//!
//! A [`CostMatrix`] owns a reference-counted buffer, so clones and area
//! slices made with [`CostMatrix::select`] share storage instead of copying
//! it. Values are validated once, at construction: NaN, infinite, and
//! negative costs are rejected with the offending zone indices.

use super::error::ValidationError;
use std::fmt;
use std::sync::Arc;

/// Square, non-negative, NaN-free travel cost matrix.
///
/// # Examples
///
/// ```
/// use gravity_core::types::CostMatrix;
///
/// let cost = CostMatrix::from_rows(&[
///     vec![0.0, 4.0, 9.0],
///     vec![4.0, 0.0, 6.0],
///     vec![9.0, 6.0, 0.0],
/// ]).unwrap();
///
/// // Zero-copy view over zones 0 and 2
/// let view = cost.select(&[0, 2]).unwrap();
/// assert_eq!(view.n_zones(), 2);
/// assert_eq!(view.get(0, 1), 9.0);
/// assert!(view.shares_buffer(&cost));
/// ```
#[derive(Clone)]
pub struct CostMatrix {
    buffer: Arc<[f64]>,
    /// Zones in the underlying buffer.
    stride: usize,
    /// Buffer indices of this view's zones; `None` means all of them in order.
    zones: Option<Arc<[usize]>>,
}

impl CostMatrix {
    /// Creates an `n × n` cost matrix from row-major data.
    pub fn new(n: usize, data: Vec<f64>) -> Result<Self, ValidationError> {
        Self::from_shared(Arc::from(data), n)
    }

    /// Creates a cost matrix from nested rows.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, ValidationError> {
        let n = rows.len();
        let mut data = Vec::with_capacity(n * n);
        for row in rows {
            if row.len() != n {
                return Err(ValidationError::shape_mismatch("cost matrix row", n, row.len()));
            }
            data.extend_from_slice(row);
        }
        Self::new(n, data)
    }

    /// Wraps an existing shared buffer without copying it.
    pub fn from_shared(buffer: Arc<[f64]>, n: usize) -> Result<Self, ValidationError> {
        if buffer.len() != n * n {
            return Err(ValidationError::shape_mismatch("cost matrix", n * n, buffer.len()));
        }
        validate_costs(&buffer, n)?;
        Ok(Self {
            buffer,
            stride: n,
            zones: None,
        })
    }

    /// Number of zones in this matrix (or view).
    #[inline]
    pub fn n_zones(&self) -> usize {
        match &self.zones {
            Some(z) => z.len(),
            None => self.stride,
        }
    }

    #[inline]
    fn buffer_index(&self, i: usize) -> usize {
        match &self.zones {
            Some(z) => z[i],
            None => i,
        }
    }

    /// Cost from zone `i` to zone `j`, in this matrix's own indexing.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.buffer[self.buffer_index(i) * self.stride + self.buffer_index(j)]
    }

    /// Iterates the costs of row `i`.
    pub fn row(&self, i: usize) -> impl Iterator<Item = f64> + '_ {
        let base = self.buffer_index(i) * self.stride;
        (0..self.n_zones()).map(move |j| self.buffer[base + self.buffer_index(j)])
    }

    /// Zero-copy view over a subset of zones.
    ///
    /// `zones` are indices into this matrix; selecting from a view composes
    /// the selections so the result still points into the original buffer.
    pub fn select(&self, zones: &[usize]) -> Result<Self, ValidationError> {
        let n = self.n_zones();
        if zones.is_empty() {
            return Err(ValidationError::empty_input("zone selection"));
        }
        let mut mapped = Vec::with_capacity(zones.len());
        for &z in zones {
            if z >= n {
                return Err(ValidationError::ZoneOutOfRange {
                    zone: z,
                    n_zones: n,
                });
            }
            mapped.push(self.buffer_index(z));
        }
        Ok(Self {
            buffer: Arc::clone(&self.buffer),
            stride: self.stride,
            zones: Some(Arc::from(mapped)),
        })
    }

    /// Returns a copy whose zero intrazonal costs are replaced by
    /// `factor` times the smallest positive off-diagonal cost in the row.
    ///
    /// Rows with no positive off-diagonal cost keep their diagonal.
    pub fn with_intrazonal_infill(&self, factor: f64) -> Result<Self, ValidationError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(ValidationError::invalid_setting(
                "intrazonal_cost_infill",
                format!("must be positive and finite, got {}", factor),
            ));
        }
        let n = self.n_zones();
        let mut data = self.to_vec();
        for i in 0..n {
            if data[i * n + i] > 0.0 {
                continue;
            }
            let nearest = (0..n)
                .filter(|&j| j != i)
                .map(|j| data[i * n + j])
                .filter(|&c| c > 0.0)
                .fold(f64::INFINITY, f64::min);
            if nearest.is_finite() {
                data[i * n + i] = factor * nearest;
            }
        }
        Self::new(n, data)
    }

    /// Dense row-major copy of this matrix (or view).
    pub fn to_vec(&self) -> Vec<f64> {
        let n = self.n_zones();
        let mut out = Vec::with_capacity(n * n);
        for i in 0..n {
            out.extend(self.row(i));
        }
        out
    }

    /// Largest cost in the matrix.
    pub fn max_cost(&self) -> f64 {
        (0..self.n_zones())
            .flat_map(|i| self.row(i))
            .fold(0.0, f64::max)
    }

    /// The shared buffer backing this matrix.
    #[inline]
    pub fn buffer(&self) -> &Arc<[f64]> {
        &self.buffer
    }

    /// Returns `true` if this matrix is a zone selection of a larger buffer.
    #[inline]
    pub fn is_view(&self) -> bool {
        self.zones.is_some()
    }

    /// Returns `true` if both matrices read from the same allocation.
    #[inline]
    pub fn shares_buffer(&self, other: &CostMatrix) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }

    /// Returns `true` if both matrices are the same view of the same allocation.
    pub fn same_view(&self, other: &CostMatrix) -> bool {
        if !self.shares_buffer(other) {
            return false;
        }
        match (&self.zones, &other.zones) {
            (None, None) => true,
            (Some(a), Some(b)) => a[..] == b[..],
            _ => false,
        }
    }
}

impl fmt::Debug for CostMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CostMatrix")
            .field("n_zones", &self.n_zones())
            .field("buffer_zones", &self.stride)
            .field("is_view", &self.is_view())
            .finish()
    }
}

fn validate_costs(data: &[f64], n: usize) -> Result<(), ValidationError> {
    for (index, &c) in data.iter().enumerate() {
        if c.is_nan() {
            return Err(ValidationError::NanCost {
                origin: index / n,
                destination: index % n,
            });
        }
        if !c.is_finite() {
            return Err(ValidationError::NonFiniteValue { what: "cost", index });
        }
        if c < 0.0 {
            return Err(ValidationError::NegativeValue {
                what: "cost",
                index,
                value: c,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_zone() -> CostMatrix {
        CostMatrix::from_rows(&[
            vec![0.0, 4.0, 9.0],
            vec![4.0, 0.0, 6.0],
            vec![9.0, 6.0, 0.0],
        ])
        .unwrap()
    }

    // ========================================
    // Validation Tests
    // ========================================

    #[test]
    fn test_nan_reported_with_zone_indices() {
        let err = CostMatrix::new(2, vec![0.0, 1.0, f64::NAN, 0.0]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::NanCost {
                origin: 1,
                destination: 0
            }
        );
    }

    #[test]
    fn test_negative_cost_rejected() {
        let err = CostMatrix::new(2, vec![0.0, -1.0, 1.0, 0.0]).unwrap_err();
        assert!(matches!(err, ValidationError::NegativeValue { index: 1, .. }));
    }

    #[test]
    fn test_infinite_cost_rejected() {
        let err = CostMatrix::new(1, vec![f64::INFINITY]).unwrap_err();
        assert!(matches!(err, ValidationError::NonFiniteValue { .. }));
    }

    #[test]
    fn test_non_square_rows_rejected() {
        let err = CostMatrix::from_rows(&[vec![0.0, 1.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, ValidationError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_zero_costs_accepted() {
        let cost = CostMatrix::new(2, vec![0.0; 4]).unwrap();
        assert_eq!(cost.max_cost(), 0.0);
    }

    // ========================================
    // View Tests
    // ========================================

    #[test]
    fn test_select_shares_buffer() {
        let cost = three_zone();
        let view = cost.select(&[2, 1]).unwrap();
        assert!(view.is_view());
        assert!(view.shares_buffer(&cost));
        assert_eq!(view.get(0, 0), 0.0);
        assert_eq!(view.get(0, 1), 6.0);
        assert_eq!(view.to_vec(), vec![0.0, 6.0, 6.0, 0.0]);
    }

    #[test]
    fn test_select_composes() {
        let cost = three_zone();
        let outer = cost.select(&[1, 2]).unwrap();
        let inner = outer.select(&[1]).unwrap();
        assert_eq!(inner.n_zones(), 1);
        assert!(inner.shares_buffer(&cost));
        assert_eq!(inner.get(0, 0), 0.0);
        let pair = outer.select(&[0, 1]).unwrap();
        assert!(pair.same_view(&outer));
    }

    #[test]
    fn test_select_out_of_range() {
        let err = three_zone().select(&[0, 3]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::ZoneOutOfRange {
                zone: 3,
                n_zones: 3
            }
        );
    }

    #[test]
    fn test_same_view_distinguishes_selections() {
        let cost = three_zone();
        let a = cost.select(&[0, 1]).unwrap();
        let b = cost.select(&[1, 0]).unwrap();
        assert!(!a.same_view(&b));
        assert!(cost.same_view(&cost.clone()));
    }

    // ========================================
    // Intrazonal Infill Tests
    // ========================================

    #[test]
    fn test_intrazonal_infill() {
        let infilled = three_zone().with_intrazonal_infill(0.5).unwrap();
        assert_eq!(infilled.get(0, 0), 2.0);
        assert_eq!(infilled.get(1, 1), 2.0);
        assert_eq!(infilled.get(2, 2), 3.0);
        assert_eq!(infilled.get(0, 2), 9.0);
    }

    #[test]
    fn test_intrazonal_infill_rejects_bad_factor() {
        assert!(three_zone().with_intrazonal_infill(0.0).is_err());
        assert!(three_zone().with_intrazonal_infill(f64::NAN).is_err());
    }
}
