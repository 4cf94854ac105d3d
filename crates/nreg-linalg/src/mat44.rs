//! 4x4 homogeneous matrix helpers: inverse, square root, exponential, logarithm.
//!
//! The iterative functions follow "Linear combination of transformations"
//! (Alexa, SIGGRAPH 2002) and are used for log-Euclidean averaging of affine
//! transformations.

use glam::{DMat3, DMat4, DVec3, DVec4};

use crate::{error::LinalgError, mat33::is_negligible_determinant};

/// Default number of Pade terms used by [`mat44_expm`].
pub const EXPM_DEFAULT_TERMS: usize = 6;

const SQRT_TOLERANCE: f64 = 1.0e-7;
const SQRT_MAX_ITERATIONS: usize = 10;
const LOGM_TOLERANCE: f64 = 1.0e-7;
const LOGM_MAX_SQUARE_ROOTS: usize = 100;
const LOGM_MAX_SERIES_TERMS: usize = 1000;

/// Build a matrix from row-major entries.
#[inline]
pub fn mat44_from_rows(rows: [[f64; 4]; 4]) -> DMat4 {
    DMat4::from_cols_array_2d(&rows).transpose()
}

/// Row-major entries of a matrix.
#[inline]
pub fn mat44_to_rows(m: &DMat4) -> [[f64; 4]; 4] {
    m.transpose().to_cols_array_2d()
}

/// Upper-left 3x3 block.
#[inline]
pub fn mat44_to_mat33(m: &DMat4) -> DMat3 {
    DMat3::from_mat4(*m)
}

/// Largest absolute entry.
pub fn mat44_norm_inf(m: &DMat4) -> f64 {
    m.to_cols_array().iter().fold(0.0, |acc, x| f64::max(acc, x.abs()))
}

/// Determinant.
#[inline]
pub fn mat44_det(m: &DMat4) -> f64 {
    m.determinant()
}

/// Apply the affine part of `m` to a point, ignoring the last row.
#[inline]
pub fn mat44_mul_point(m: &DMat4, p: DVec3) -> DVec3 {
    m.x_axis.truncate() * p.x + m.y_axis.truncate() * p.y + m.z_axis.truncate() * p.z
        + m.w_axis.truncate()
}

/// Affine matrix from a linear part and a translation, last row `(0, 0, 0, 1)`.
pub fn mat44_from_linear_translation(linear: &DMat3, translation: DVec3) -> DMat4 {
    DMat4::from_cols(
        linear.x_axis.extend(0.0),
        linear.y_axis.extend(0.0),
        linear.z_axis.extend(0.0),
        DVec4::new(translation.x, translation.y, translation.z, 1.0),
    )
}

/// Inverse of a 4x4 matrix.
///
/// # Errors
///
/// Returns [`LinalgError::SingularMatrix`] when the determinant is zero
/// relative to the magnitude of the entries.
pub fn mat44_inverse(m: &DMat4) -> Result<DMat4, LinalgError> {
    let det = m.determinant();
    if is_negligible_determinant(det, mat44_norm_inf(m), 4) {
        return Err(LinalgError::SingularMatrix("4x4 determinant is zero"));
    }
    Ok(m.inverse())
}

/// Principal square root by the Denman-Beavers iteration.
///
/// Stops when `|X^2 - M|` (largest entry) drops below 1e-7 or after 10
/// iterations; in the latter case a warning is logged and the last iterate
/// returned.
pub fn mat44_sqrt(m: &DMat4) -> Result<DMat4, LinalgError> {
    let mut x = *m;
    let mut y = DMat4::IDENTITY;
    let mut residual = mat44_norm_inf(&(x * x - *m));
    let mut it = 0;
    while residual > SQRT_TOLERANCE {
        let inv_x = mat44_inverse(&x)?;
        let inv_y = mat44_inverse(&y)?;
        x = (x + inv_y) * 0.5;
        y = (y + inv_x) * 0.5;
        residual = mat44_norm_inf(&(x * x - *m));
        it += 1;
        if it > SQRT_MAX_ITERATIONS {
            log::warn!("mat44_sqrt: no convergence after {it} iterations, residual {residual:e}");
            break;
        }
    }
    Ok(x)
}

/// Matrix exponential by scaling and squaring with a `terms`-order Pade approximant.
pub fn mat44_expm(m: &DMat4, terms: usize) -> Result<DMat4, LinalgError> {
    // scale so that the norm is below 1/2
    let j = f64::max(0.0, 1.0 + mat44_norm_inf(m).log2().floor());
    let a = *m * 2f64.powf(-j);

    let q = terms as f64;
    let mut d = DMat4::IDENTITY;
    let mut n = DMat4::IDENTITY;
    let mut x = DMat4::IDENTITY;
    let mut c = 1.0;
    for k in 1..=terms {
        let k_f = k as f64;
        c = c * (q - k_f + 1.0) / (k_f * (2.0 * q - k_f + 1.0));
        x = a * x;
        let cx = x * c;
        n += cx;
        if k % 2 == 0 {
            d += cx;
        } else {
            d -= cx;
        }
    }

    let mut out = mat44_inverse(&d)? * n;
    for _ in 0..j as usize {
        out = out * out;
    }
    Ok(out)
}

/// Matrix logarithm by inverse scaling and squaring.
///
/// Square roots are taken until the matrix is within 1/2 of the identity
/// (largest entry), then the series `log(I - A) = -sum A^i / i` is summed.
/// Hitting either iteration cap logs a warning and returns the best effort.
pub fn mat44_logm(m: &DMat4) -> Result<DMat4, LinalgError> {
    let mut a = *m;
    let mut k = 0;
    while mat44_norm_inf(&(a - DMat4::IDENTITY)) > 0.5 {
        a = mat44_sqrt(&a)?;
        k += 1;
        if k > LOGM_MAX_SQUARE_ROOTS {
            log::warn!("mat44_logm: no convergence after {k} square roots");
            break;
        }
    }

    let a = DMat4::IDENTITY - a;
    let mut z = a;
    let mut x = a;
    let mut i = 1usize;
    while mat44_norm_inf(&z) > LOGM_TOLERANCE {
        z = z * a;
        i += 1;
        x += z * (1.0 / i as f64);
        if i > LOGM_MAX_SERIES_TERMS {
            log::warn!("mat44_logm: series did not converge after {i} terms");
            break;
        }
    }

    Ok(x * -(2f64.powi(k as i32)))
}

/// Log-Euclidean mean of two transformations: `expm((logm(A) + logm(B)) / 2)`.
pub fn mat44_avg2(a: &DMat4, b: &DMat4) -> Result<DMat4, LinalgError> {
    let log_a = mat44_logm(a)?;
    let log_b = mat44_logm(b)?;
    mat44_expm(&((log_a + log_b) * 0.5), EXPM_DEFAULT_TERMS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rigid(angle: f64, t: DVec3) -> DMat4 {
        mat44_from_linear_translation(&DMat3::from_rotation_z(angle), t)
    }

    #[test]
    fn test_row_layout_and_point() {
        let m = mat44_from_rows([
            [1.0, 0.0, 0.0, 10.0],
            [0.0, 2.0, 0.0, 20.0],
            [0.0, 0.0, 3.0, 30.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        let p = mat44_mul_point(&m, DVec3::new(1.0, 1.0, 1.0));
        assert_eq!(p, DVec3::new(11.0, 22.0, 33.0));
        assert_eq!(mat44_to_rows(&m)[1][3], 20.0);
        assert_eq!(mat44_norm_inf(&m), 30.0);
        assert_eq!(mat44_to_mat33(&m).row(2), DVec3::new(0.0, 0.0, 3.0));
    }

    #[test]
    fn test_inverse_singular() {
        let mut m = DMat4::IDENTITY;
        m.z_axis.z = 0.0;
        assert!(mat44_inverse(&m).is_err());
        assert!(mat44_inverse(&DMat4::ZERO).is_err());
    }

    #[test]
    fn test_sqrt_squares_back() -> Result<(), LinalgError> {
        let m = rigid(0.4, DVec3::new(2.0, -1.0, 0.5));
        let s = mat44_sqrt(&m)?;
        assert!((s * s).abs_diff_eq(m, 1e-6));
        Ok(())
    }

    #[test]
    fn test_expm_of_zero_is_identity() -> Result<(), LinalgError> {
        let e = mat44_expm(&DMat4::ZERO, EXPM_DEFAULT_TERMS)?;
        assert!(e.abs_diff_eq(DMat4::IDENTITY, 1e-12));
        Ok(())
    }

    #[test]
    fn test_expm_of_diagonal() -> Result<(), LinalgError> {
        let m = DMat4::from_diagonal(DVec4::new(1.0, -0.5, 2.0, 0.0));
        let e = mat44_expm(&m, EXPM_DEFAULT_TERMS)?;
        assert_relative_eq!(e.x_axis.x, 1f64.exp(), epsilon = 1e-9);
        assert_relative_eq!(e.y_axis.y, (-0.5f64).exp(), epsilon = 1e-9);
        assert_relative_eq!(e.z_axis.z, 2f64.exp(), epsilon = 1e-8);
        assert_relative_eq!(e.w_axis.w, 1.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_logm_of_identity_is_zero() -> Result<(), LinalgError> {
        let l = mat44_logm(&DMat4::IDENTITY)?;
        assert!(l.abs_diff_eq(DMat4::ZERO, 1e-12));
        Ok(())
    }

    #[test]
    fn test_expm_logm_roundtrip_near_identity() -> Result<(), LinalgError> {
        let mut m = rigid(0.2, DVec3::new(0.3, -0.2, 0.1));
        m.x_axis.x *= 1.1;
        m.y_axis.x = 0.05;
        let back = mat44_expm(&mat44_logm(&m)?, EXPM_DEFAULT_TERMS)?;
        assert!(back.abs_diff_eq(m, 1e-4));
        Ok(())
    }

    #[test]
    fn test_avg2_of_rotations() -> Result<(), LinalgError> {
        // the geodesic mean of two rotations about z is the half-angle rotation
        let a = rigid(0.2, DVec3::ZERO);
        let b = rigid(0.6, DVec3::ZERO);
        let avg = mat44_avg2(&a, &b)?;
        assert!(avg.abs_diff_eq(rigid(0.4, DVec3::ZERO), 1e-5));
        Ok(())
    }

    #[test]
    fn test_avg2_of_same_matrix() -> Result<(), LinalgError> {
        let a = rigid(-0.3, DVec3::new(1.0, 2.0, 3.0));
        let avg = mat44_avg2(&a, &a)?;
        assert!(avg.abs_diff_eq(a, 1e-4));
        Ok(())
    }
}
