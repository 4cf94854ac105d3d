use nreg_image::{ImageGeometry, VolumeSize};

use crate::{
    config::{JacobianConfig, PenaltyKind},
    error::SplineError,
    grid::ControlPointGrid,
    jacobian::{is_interior, jacobian_field, JacobianField},
};

/// Whether a penalty value reports a folded transformation.
///
/// # Examples
///
/// ```
/// use nreg_spline::penalty::is_folded;
///
/// assert!(is_folded(f64::NAN));
/// assert!(!is_folded(0.25));
/// ```
#[inline]
pub fn is_folded(value: f64) -> bool {
    value.is_nan()
}

/// Mean penalty over the sites of a field, NaN as soon as one determinant is not positive.
pub(crate) fn field_penalty(
    field: &JacobianField,
    grid_size: VolumeSize,
    approx: bool,
    kind: PenaltyKind,
) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for (index, &det) in field.determinants.iter().enumerate() {
        if approx && !is_interior(grid_size, index) {
            continue;
        }
        if det.is_nan() || det <= 0.0 {
            return f64::NAN;
        }
        sum += kind.value(det);
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    sum / count as f64
}

/// Jacobian determinant penalty of the spline transformation.
///
/// The mean over the sites of `log(det)^2`, or `|log(det)|` with
/// [`PenaltyKind::AbsoluteLog`]. Exact mode averages over every reference
/// voxel, approximate mode over the interior control points.
///
/// # Returns
///
/// The penalty, or `NaN` when any site has a non-positive determinant.
/// Use [`is_folded`] to test for it.
///
/// # Errors
///
/// Returns an error under the same conditions as [`jacobian_field`].
pub fn jacobian_penalty(
    grid: &ControlPointGrid,
    reference: &ImageGeometry,
    approx: bool,
    config: &JacobianConfig,
) -> Result<f64, SplineError> {
    let field = jacobian_field(grid, reference, approx, config)?;
    let value = field_penalty(&field, grid.size(), approx, config.penalty);
    if is_folded(value) {
        log::debug!("Jacobian penalty: folding detected");
    } else {
        log::debug!("Jacobian penalty: {value:e}");
    }
    Ok(value)
}
