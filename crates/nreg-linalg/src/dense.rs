use std::ops::{Index, IndexMut};

use faer::{Mat, MatRef};

use crate::error::LinalgError;

/// A small dense matrix of `f64` backed by [`faer::Mat`].
///
/// Element access is by `(row, col)`. The decompositions of this crate run
/// their own loops over the elements; products, transposes and
/// matrix-vector products go through faer.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix {
    inner: Mat<f64>,
}

impl DenseMatrix {
    /// Create a zero-filled matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            inner: Mat::zeros(rows, cols),
        }
    }

    /// Create the identity matrix of size `n`.
    pub fn identity(n: usize) -> Self {
        Self {
            inner: Mat::identity(n, n),
        }
    }

    /// Create a matrix from row-major data.
    ///
    /// # Errors
    ///
    /// Returns [`LinalgError::DimensionMismatch`] if `data.len() != rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, LinalgError> {
        if data.len() != rows * cols {
            return Err(LinalgError::DimensionMismatch(rows * cols, data.len()));
        }
        Ok(Self {
            inner: Mat::from_fn(rows, cols, |i, j| data[i * cols + j]),
        })
    }

    /// Create a matrix from a slice of equally sized rows.
    pub fn from_rows<const N: usize>(rows: &[[f64; N]]) -> Self {
        Self {
            inner: Mat::from_fn(rows.len(), N, |i, j| rows[i][j]),
        }
    }

    /// Wrap a faer matrix.
    pub fn from_faer(inner: Mat<f64>) -> Self {
        Self { inner }
    }

    /// Borrow the faer storage.
    #[inline]
    pub fn as_faer(&self) -> MatRef<'_, f64> {
        self.inner.as_ref()
    }

    /// Number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.inner.nrows()
    }

    /// Number of columns.
    #[inline]
    pub fn cols(&self) -> usize {
        self.inner.ncols()
    }

    /// Whether the matrix is square.
    #[inline]
    pub fn is_square(&self) -> bool {
        self.rows() == self.cols()
    }

    /// Largest absolute entry of row `r`.
    pub fn row_max_abs(&self, r: usize) -> f64 {
        (0..self.cols()).fold(0.0, |acc, c| acc.max(self.inner.read(r, c).abs()))
    }

    /// Largest absolute entry.
    pub fn max_abs(&self) -> f64 {
        (0..self.rows()).fold(0.0, |acc, r| acc.max(self.row_max_abs(r)))
    }

    /// Whether every entry is finite.
    pub fn is_finite(&self) -> bool {
        (0..self.cols()).all(|c| (0..self.rows()).all(|r| self.inner.read(r, c).is_finite()))
    }

    /// Copy with column `j` multiplied by `factors[j]`, i.e. `self * diag(factors)`.
    ///
    /// # Panics
    ///
    /// Panics if `factors` is shorter than the number of columns.
    pub fn scale_columns(&self, factors: &[f64]) -> Self {
        Self {
            inner: Mat::from_fn(self.rows(), self.cols(), |i, j| {
                self.inner.read(i, j) * factors[j]
            }),
        }
    }

    /// Transposed copy.
    pub fn transpose(&self) -> Self {
        Self {
            inner: self.inner.transpose().to_owned(),
        }
    }

    /// Matrix product `self * rhs`.
    ///
    /// # Errors
    ///
    /// Returns [`LinalgError::DimensionMismatch`] if the inner dimensions differ.
    pub fn matmul(&self, rhs: &DenseMatrix) -> Result<DenseMatrix, LinalgError> {
        if self.cols() != rhs.rows() {
            return Err(LinalgError::DimensionMismatch(self.cols(), rhs.rows()));
        }
        Ok(Self {
            inner: self.as_faer() * rhs.as_faer(),
        })
    }

    /// Matrix-vector product `self * v`.
    ///
    /// # Errors
    ///
    /// Returns [`LinalgError::DimensionMismatch`] if `v.len() != self.cols()`.
    pub fn mul_vec(&self, v: &[f64]) -> Result<Vec<f64>, LinalgError> {
        if v.len() != self.cols() {
            return Err(LinalgError::DimensionMismatch(self.cols(), v.len()));
        }
        let out = self.as_faer() * faer::col::from_slice(v);
        Ok((0..out.nrows()).map(|i| out.read(i)).collect())
    }

    /// Largest absolute difference between two matrices, infinite if the shapes differ.
    pub fn max_abs_diff(&self, other: &DenseMatrix) -> f64 {
        if self.rows() != other.rows() || self.cols() != other.cols() {
            return f64::INFINITY;
        }
        (&self.inner - &other.inner).norm_max()
    }
}

impl Index<(usize, usize)> for DenseMatrix {
    type Output = f64;

    #[inline]
    fn index(&self, index: (usize, usize)) -> &f64 {
        &self.inner[index]
    }
}

impl IndexMut<(usize, usize)> for DenseMatrix {
    #[inline]
    fn index_mut(&mut self, index: (usize, usize)) -> &mut f64 {
        &mut self.inner[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec_checks_length() {
        assert_eq!(
            DenseMatrix::from_vec(2, 2, vec![1.0; 3]),
            Err(LinalgError::DimensionMismatch(4, 3))
        );
        let a = DenseMatrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(a[(0, 2)], 3.0);
        assert_eq!(a[(1, 0)], 4.0);
    }

    #[test]
    fn test_matmul() -> Result<(), LinalgError> {
        let a = DenseMatrix::from_rows(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let b = DenseMatrix::from_rows(&[[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]);
        let c = a.matmul(&b)?;
        assert!(c.max_abs_diff(&DenseMatrix::from_rows(&[[4.0, 5.0], [10.0, 11.0]])) < 1e-12);
        assert!(b.matmul(&b).is_err());
        Ok(())
    }

    #[test]
    fn test_transpose_and_mul_vec() -> Result<(), LinalgError> {
        let a = DenseMatrix::from_rows(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
        let t = a.transpose();
        assert_eq!(t.rows(), 2);
        assert_eq!(t[(1, 2)], 6.0);
        assert_eq!(a.mul_vec(&[1.0, -1.0])?, vec![-1.0, -1.0, -1.0]);
        assert!(a.mul_vec(&[1.0]).is_err());
        Ok(())
    }

    #[test]
    fn test_scale_columns_and_norms() {
        let a = DenseMatrix::from_rows(&[[1.0, -2.0], [3.0, 4.0]]);
        let s = a.scale_columns(&[2.0, 0.5]);
        assert_eq!(s, DenseMatrix::from_rows(&[[2.0, -1.0], [6.0, 2.0]]));
        assert_eq!(a.row_max_abs(0), 2.0);
        assert_eq!(a.max_abs(), 4.0);
        assert!(a.is_finite());

        let mut b = a.clone();
        b[(1, 1)] = f64::NAN;
        assert!(!b.is_finite());
        assert_eq!(a.max_abs_diff(&DenseMatrix::zeros(3, 2)), f64::INFINITY);
    }
}
