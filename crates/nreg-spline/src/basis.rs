use glam::{DMat3, DVec3};

/// Cubic B-spline basis function `index` at `t` in `[0, 1)`, with its first and second derivatives.
///
/// `index` selects the weight of the control point `index - 1` positions
/// from the interval start. Indices outside `0..4` have no support and
/// return zeros.
///
/// # Examples
///
/// ```
/// use nreg_spline::bspline_basis;
///
/// let (value, first, _) = bspline_basis(0.0, 1);
///
/// assert_eq!(value, 2.0 / 3.0);
/// assert_eq!(first, 0.0);
/// ```
pub fn bspline_basis(t: f64, index: i64) -> (f64, f64, f64) {
    match index {
        0 => {
            let s = 1.0 - t;
            (s * s * s / 6.0, -s * s / 2.0, s)
        }
        1 => (
            (3.0 * t * t * t - 6.0 * t * t + 4.0) / 6.0,
            (3.0 * t * t - 4.0 * t) / 2.0,
            3.0 * t - 2.0,
        ),
        2 => (
            (-3.0 * t * t * t + 3.0 * t * t + 3.0 * t + 1.0) / 6.0,
            (-3.0 * t * t + 2.0 * t + 1.0) / 2.0,
            1.0 - 3.0 * t,
        ),
        3 => (t * t * t / 6.0, t * t / 2.0, t),
        _ => (0.0, 0.0, 0.0),
    }
}

/// The four basis values at `t`.
pub fn bspline_basis_values(t: f64) -> [f64; 4] {
    [0, 1, 2, 3].map(|i| bspline_basis(t, i).0)
}

/// The four basis first derivatives at `t`.
pub fn bspline_basis_first(t: f64) -> [f64; 4] {
    [0, 1, 2, 3].map(|i| bspline_basis(t, i).1)
}

/// The four basis second derivatives at `t`.
pub fn bspline_basis_second(t: f64) -> [f64; 4] {
    [0, 1, 2, 3].map(|i| bspline_basis(t, i).2)
}

/// Basis values and first derivatives along one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisBasis {
    /// Weights of the four control points.
    pub value: [f64; 4],
    /// Derivative weights of the four control points.
    pub first: [f64; 4],
}

impl AxisBasis {
    /// Basis at the fractional offset `t`.
    pub fn at(t: f64) -> Self {
        Self {
            value: bspline_basis_values(t),
            first: bspline_basis_first(t),
        }
    }

    /// Basis on a control point itself, `t = 0`.
    ///
    /// Only the first three weights are non-zero: `{1/6, 2/3, 1/6}` and
    /// `{-1/2, 0, 1/2}`.
    pub fn on_knot() -> Self {
        Self::at(0.0)
    }
}

/// Derivatives of a 2D B-spline patch with respect to the lattice axes.
///
/// `points` holds the 4x4 neighbourhood, x varying fastest. The result has
/// the x and y derivatives as its first two columns, with zero z
/// components, and the unit z axis as the last column.
pub fn contract_plane(x: &AxisBasis, y: &AxisBasis, points: &[DVec3; 16]) -> DMat3 {
    let mut tx = DVec3::ZERO;
    let mut ty = DVec3::ZERO;
    for b in 0..4 {
        for a in 0..4 {
            let p = points[b * 4 + a];
            tx += p * (x.first[a] * y.value[b]);
            ty += p * (x.value[a] * y.first[b]);
        }
    }
    DMat3::from_cols(tx.truncate().extend(0.0), ty.truncate().extend(0.0), DVec3::Z)
}

/// Derivatives of a 3D B-spline patch with respect to the lattice axes.
///
/// `points` holds the 4x4x4 neighbourhood, x varying fastest. Column `c` of
/// the result is the derivative of the position along lattice axis `c`.
pub fn contract_tensor(
    x: &AxisBasis,
    y: &AxisBasis,
    z: &AxisBasis,
    points: &[DVec3; 64],
) -> DMat3 {
    let mut tx = DVec3::ZERO;
    let mut ty = DVec3::ZERO;
    let mut tz = DVec3::ZERO;
    let mut k = 0;
    for c in 0..4 {
        for b in 0..4 {
            for a in 0..4 {
                let p = points[k];
                tx += p * (z.value[c] * y.value[b] * x.first[a]);
                ty += p * (z.value[c] * y.first[b] * x.value[a]);
                tz += p * (z.first[c] * y.value[b] * x.value[a]);
                k += 1;
            }
        }
    }
    DMat3::from_cols(tx, ty, tz)
}

/// Separable evaluation of [`contract_tensor`].
///
/// Contracts the x axis first, then y, then z, which needs far fewer
/// multiplications than weighting all 64 points by three full products.
/// Results agree with the direct contraction up to rounding.
pub fn contract_tensor_fast(
    x: &AxisBasis,
    y: &AxisBasis,
    z: &AxisBasis,
    points: &[DVec3; 64],
) -> DMat3 {
    // x contracted: [value, first] per (c, b) row
    let mut rows = [[DVec3::ZERO; 2]; 16];
    for (row, chunk) in rows.iter_mut().zip(points.chunks_exact(4)) {
        for a in 0..4 {
            row[0] += chunk[a] * x.value[a];
            row[1] += chunk[a] * x.first[a];
        }
    }

    // y contracted: [x value y value, x first y value, x value y first] per slice
    let mut slices = [[DVec3::ZERO; 3]; 4];
    for (c, slice) in slices.iter_mut().enumerate() {
        for b in 0..4 {
            let [value, first] = rows[c * 4 + b];
            slice[0] += value * y.value[b];
            slice[1] += first * y.value[b];
            slice[2] += value * y.first[b];
        }
    }

    let mut tx = DVec3::ZERO;
    let mut ty = DVec3::ZERO;
    let mut tz = DVec3::ZERO;
    for (c, slice) in slices.iter().enumerate() {
        tx += slice[1] * z.value[c];
        ty += slice[2] * z.value[c];
        tz += slice[0] * z.first[c];
    }
    DMat3::from_cols(tx, ty, tz)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_partition_of_unity() {
        for t in [0.0, 0.25, 0.5, 0.9] {
            assert_relative_eq!(bspline_basis_values(t).iter().sum::<f64>(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(bspline_basis_first(t).iter().sum::<f64>(), 0.0, epsilon = 1e-12);
            assert_relative_eq!(bspline_basis_second(t).iter().sum::<f64>(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_derivatives_match_finite_differences() {
        let h = 1e-6;
        for index in 0..4 {
            for t in [0.1, 0.4, 0.8] {
                let (_, first, second) = bspline_basis(t, index);
                let fd1 = (bspline_basis(t + h, index).0 - bspline_basis(t - h, index).0) / (2.0 * h);
                let fd2 = (bspline_basis(t + h, index).1 - bspline_basis(t - h, index).1) / (2.0 * h);
                assert_relative_eq!(first, fd1, epsilon = 1e-8);
                assert_relative_eq!(second, fd2, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_out_of_range_index() {
        assert_eq!(bspline_basis(0.3, -1), (0.0, 0.0, 0.0));
        assert_eq!(bspline_basis(0.3, 4), (0.0, 0.0, 0.0));
    }

    #[test]
    fn test_on_knot() {
        let basis = AxisBasis::on_knot();
        assert_eq!(basis.value, [1.0 / 6.0, 2.0 / 3.0, 1.0 / 6.0, 0.0]);
        assert_eq!(basis.first, [-0.5, 0.0, 0.5, 0.0]);
    }

    #[test]
    fn test_linear_lattice_has_constant_derivative() {
        // positions p = (2i, 3j, 5k) give derivatives diag(2, 3, 5)
        let mut points = [DVec3::ZERO; 64];
        for (k, p) in points.iter_mut().enumerate() {
            let (a, b, c) = (k % 4, (k / 4) % 4, k / 16);
            *p = DVec3::new(2.0 * a as f64, 3.0 * b as f64, 5.0 * c as f64);
        }
        let (x, y, z) = (AxisBasis::at(0.3), AxisBasis::at(0.7), AxisBasis::at(0.0));
        let expected = DMat3::from_diagonal(DVec3::new(2.0, 3.0, 5.0));
        assert!(contract_tensor(&x, &y, &z, &points).abs_diff_eq(expected, 1e-12));
        assert!(contract_tensor_fast(&x, &y, &z, &points).abs_diff_eq(expected, 1e-12));
    }
}
