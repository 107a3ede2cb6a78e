//! Dense origin-destination matrix.
//!
//! [`OdMatrix`] is the Furness balancer's working state and the calibrator's
//! final output. Storage is row-major so that row rescaling walks contiguous
//! memory.

use super::error::{check_non_negative, ValidationError};
use serde::{Deserialize, Serialize};

/// Dense, row-major, non-negative zone-by-zone matrix.
///
/// # Examples
///
/// ```
/// use gravity_core::types::OdMatrix;
///
/// let m = OdMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
/// assert_eq!(m.row_sums(), vec![3.0, 7.0]);
/// assert_eq!(m.col_sums(), vec![4.0, 6.0]);
/// assert_eq!(m.total(), 10.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl OdMatrix {
    /// Creates a matrix of zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, 0.0)
    }

    /// Creates a matrix with every cell set to `value`.
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Creates a matrix from row-major data, validating shape and values.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, ValidationError> {
        if data.len() != rows * cols {
            return Err(ValidationError::shape_mismatch(
                "matrix data",
                rows * cols,
                data.len(),
            ));
        }
        check_non_negative("matrix cell", &data)?;
        Ok(Self { rows, cols, data })
    }

    /// Creates a matrix from nested rows.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, ValidationError> {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(n_rows * n_cols);
        for row in rows {
            if row.len() != n_cols {
                return Err(ValidationError::shape_mismatch("matrix row", n_cols, row.len()));
            }
            data.extend_from_slice(row);
        }
        Self::from_vec(n_rows, n_cols, data)
    }

    /// Number of rows (origins).
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns (destinations).
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns `(rows, cols)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Returns `true` if the matrix is square.
    #[inline]
    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Cell value at `(i, j)`.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.cols + j]
    }

    /// Sets the cell at `(i, j)`.
    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.cols + j] = value;
    }

    /// Row `i` as a slice.
    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Row `i` as a mutable slice.
    #[inline]
    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// All cells, row-major.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// All cells, row-major, mutable.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Consumes the matrix and returns the row-major cells.
    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// Sum of each row.
    pub fn row_sums(&self) -> Vec<f64> {
        if self.cols == 0 {
            return vec![0.0; self.rows];
        }
        self.data.chunks(self.cols).map(|r| r.iter().sum()).collect()
    }

    /// Sum of each column.
    pub fn col_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.cols];
        if self.cols == 0 {
            return sums;
        }
        for row in self.data.chunks(self.cols) {
            for (s, &v) in sums.iter_mut().zip(row) {
                *s += v;
            }
        }
        sums
    }

    /// Sum of all cells.
    pub fn total(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Nested-row copy, for serialisation to reporting collaborators.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        if self.cols == 0 {
            return vec![Vec::new(); self.rows];
        }
        self.data.chunks(self.cols).map(<[f64]>::to_vec).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros_and_filled() {
        let z = OdMatrix::zeros(2, 3);
        assert_eq!(z.shape(), (2, 3));
        assert_eq!(z.total(), 0.0);

        let f = OdMatrix::filled(3, 3, 1.0);
        assert!(f.is_square());
        assert_eq!(f.total(), 9.0);
    }

    #[test]
    fn test_from_vec_shape_mismatch() {
        let err = OdMatrix::from_vec(2, 2, vec![1.0; 3]).unwrap_err();
        assert_eq!(err, ValidationError::shape_mismatch("matrix data", 4, 3));
    }

    #[test]
    fn test_from_vec_rejects_negative() {
        let err = OdMatrix::from_vec(1, 2, vec![1.0, -1.0]).unwrap_err();
        assert!(matches!(err, ValidationError::NegativeValue { index: 1, .. }));
    }

    #[test]
    fn test_from_rows_ragged() {
        let err = OdMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(matches!(err, ValidationError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_row_access() {
        let mut m = OdMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(m.row(1), &[3.0, 4.0]);
        m.row_mut(0)[1] = 5.0;
        assert_eq!(m.get(0, 1), 5.0);
        m.set(1, 0, 0.0);
        assert_eq!(m.row_sums(), vec![6.0, 4.0]);
        assert_eq!(m.col_sums(), vec![1.0, 9.0]);
    }

    #[test]
    fn test_to_rows_roundtrip_shape() {
        let m = OdMatrix::filled(2, 3, 2.0);
        let rows = m.to_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 3);
    }
}
