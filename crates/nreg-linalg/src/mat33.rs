//! 3x3 helpers on top of [`glam::DMat3`].
//!
//! glam stores matrices column-major; the helpers here take and return
//! row-major `m[row][col]` arrays where the mathematical layout matters.

use glam::{DMat3, DVec3};

use crate::error::LinalgError;

/// Iteration cap of the polar decomposition.
const POLAR_MAX_ITERATIONS: usize = 100;

/// Convergence threshold (sum of absolute entry changes) of the polar decomposition.
const POLAR_TOLERANCE: f64 = 3.0e-6;

/// Build a matrix from row-major entries.
#[inline]
pub fn mat33_from_rows(rows: [[f64; 3]; 3]) -> DMat3 {
    DMat3::from_cols_array_2d(&rows).transpose()
}

/// Row-major entries of a matrix.
#[inline]
pub fn mat33_to_rows(m: &DMat3) -> [[f64; 3]; 3] {
    m.transpose().to_cols_array_2d()
}

/// Entry at `row`, `col`.
#[inline]
pub fn mat33_get(m: &DMat3, row: usize, col: usize) -> f64 {
    m.col(col)[row]
}

/// Largest absolute entry.
pub fn mat33_max_abs(m: &DMat3) -> f64 {
    m.to_cols_array().iter().fold(0.0, |acc, x| f64::max(acc, x.abs()))
}

/// Maximum absolute row sum.
pub fn mat33_row_norm(m: &DMat3) -> f64 {
    (0..3).map(|r| m.row(r).abs().element_sum()).fold(0.0, f64::max)
}

/// Maximum absolute column sum.
pub fn mat33_col_norm(m: &DMat3) -> f64 {
    (0..3).map(|c| m.col(c).abs().element_sum()).fold(0.0, f64::max)
}

/// Cofactor matrix, `cof[r][c] = (-1)^(r+c) * minor(r, c)`.
///
/// Equal to `det(m) * inverse(m)^T` for invertible matrices but also defined
/// for singular ones.
pub fn mat33_cofactor(m: &DMat3) -> DMat3 {
    let a = mat33_to_rows(m);
    mat33_from_rows([
        [
            a[1][1] * a[2][2] - a[1][2] * a[2][1],
            a[1][2] * a[2][0] - a[1][0] * a[2][2],
            a[1][0] * a[2][1] - a[1][1] * a[2][0],
        ],
        [
            a[0][2] * a[2][1] - a[0][1] * a[2][2],
            a[0][0] * a[2][2] - a[0][2] * a[2][0],
            a[0][1] * a[2][0] - a[0][0] * a[2][1],
        ],
        [
            a[0][1] * a[1][2] - a[0][2] * a[1][1],
            a[0][2] * a[1][0] - a[0][0] * a[1][2],
            a[0][0] * a[1][1] - a[0][1] * a[1][0],
        ],
    ])
}

/// Whether a determinant is negligible relative to the matrix entries.
pub(crate) fn is_negligible_determinant(det: f64, max_abs: f64, dim: i32) -> bool {
    !det.is_finite() || det.abs() <= f64::EPSILON * max_abs.powi(dim)
}

/// Inverse of a 3x3 matrix.
///
/// # Errors
///
/// Returns [`LinalgError::SingularMatrix`] when the determinant is zero
/// relative to the magnitude of the entries.
pub fn mat33_inverse(m: &DMat3) -> Result<DMat3, LinalgError> {
    let det = m.determinant();
    if is_negligible_determinant(det, mat33_max_abs(m), 3) {
        return Err(LinalgError::SingularMatrix("3x3 determinant is zero"));
    }
    Ok(mat33_cofactor(m).transpose() * (1.0 / det))
}

/// Orthogonal factor `Q` of the polar decomposition `A = Q * S`.
///
/// Scaled Newton iteration `X <- (g X + X^-T / g) / 2` (Higham), switching to
/// the unscaled iteration close to convergence. A singular input is nudged
/// along the diagonal until it becomes invertible.
///
/// # Errors
///
/// Returns [`LinalgError::SingularMatrix`] if the input cannot be made invertible.
pub fn mat33_polar(a: &DMat3) -> Result<DMat3, LinalgError> {
    let mut x = *a;

    let mut det = x.determinant();
    let mut nudges = 0;
    while det == 0.0 {
        let gam = 0.00001 * (0.001 + mat33_row_norm(&x));
        x += DMat3::from_diagonal(DVec3::splat(gam));
        det = x.determinant();
        nudges += 1;
        if nudges > 16 || !det.is_finite() {
            return Err(LinalgError::SingularMatrix("polar decomposition input"));
        }
    }

    let mut dif = 1.0;
    let mut k = 0;
    loop {
        let y = mat33_inverse(&x)?;
        let (gam, gmi) = if dif > 0.3 {
            // far from convergence
            let alp = (mat33_row_norm(&x) * mat33_col_norm(&x)).sqrt();
            let bet = (mat33_row_norm(&y) * mat33_col_norm(&y)).sqrt();
            let gam = (bet / alp).sqrt();
            (gam, 1.0 / gam)
        } else {
            (1.0, 1.0)
        };
        let z = (x * gam + y.transpose() * gmi) * 0.5;
        dif = (z - x).to_cols_array().iter().map(|v| v.abs()).sum();
        k += 1;
        if k > POLAR_MAX_ITERATIONS || dif < POLAR_TOLERANCE {
            if dif >= POLAR_TOLERANCE {
                log::warn!("mat33_polar: stopped after {k} iterations, change {dif:e}");
            }
            return Ok(z);
        }
        x = z;
    }
}

/// Reorientation matrix of a voxel-to-world linear part: the inverse of its rotation factor.
///
/// Multiplying a Jacobian by this matrix removes the pure rotation/reflection of
/// the image axes, so only local shape change remains.
pub fn reorientation_matrix(linear: &DMat3) -> Result<DMat3, LinalgError> {
    mat33_inverse(&mat33_polar(linear)?)
}
