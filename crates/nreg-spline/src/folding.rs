use glam::DVec3;
use nreg_image::{parallel, ImageGeometry};
use nreg_linalg::mat33;

use crate::{
    config::JacobianConfig,
    error::SplineError,
    gradient::{visit_support, SupportEnd},
    grid::ControlPointGrid,
    jacobian::{jacobian_field, SiteFrame},
    penalty::{field_penalty, is_folded},
};

/// Push control points out of folded regions.
///
/// When the Jacobian penalty is finite the grid is left untouched and the
/// penalty is returned. Otherwise every control point whose support holds
/// sites with a non-positive determinant accumulates the cofactor terms
/// `cof(J) * b` of those sites, takes them back to the lattice orientation
/// and moves by `s * g / (5 |g|)`, with `s` the real lattice spacing. All
/// moves are computed from the grid as it was on entry and applied together.
///
/// # Returns
///
/// The penalty when the transformation is not folded, `NaN` after a
/// correction pass. Callers repeat the correction until a finite value
/// comes back.
///
/// # Errors
///
/// Returns an error under the same conditions as [`jacobian_field`].
pub fn correct_folding(
    grid: &mut ControlPointGrid,
    reference: &ImageGeometry,
    approx: bool,
    config: &JacobianConfig,
) -> Result<f64, SplineError> {
    let field = jacobian_field(grid, reference, approx, config)?;
    let value = field_penalty(&field, grid.size(), approx, config.penalty);
    if !is_folded(value) {
        return Ok(value);
    }

    let frame = SiteFrame::new(grid, config)?;
    let desorient = mat33::mat33_inverse(&frame.reorient)?;
    let gvs = grid.grid_voxel_spacing(reference);
    let snapshot: &ControlPointGrid = grid;
    let end = SupportEnd::Floor;

    let moves = parallel::map_indexed(config.execution, snapshot.len(), |index| {
        let mut correction = DVec3::ZERO;
        let mut folded = false;
        visit_support(snapshot.size(), reference.size, gvs, approx, end, index, |site, basis| {
            if field.determinants[site] <= 0.0 {
                folded = true;
                correction += mat33::mat33_cofactor(&field.matrices[site]) * basis;
            }
        });
        if !folded {
            return None;
        }
        let mut direction = desorient * correction;
        if frame.is_2d {
            direction.z = 0.0;
        }
        let norm = 5.0 * direction.length();
        (norm > 0.0).then(|| frame.real_spacing * direction / norm)
    })?;

    let mut moved = 0;
    for (position, step) in grid.positions_mut().iter_mut().zip(moves) {
        if let Some(step) = step {
            *position += step;
            moved += 1;
        }
    }
    log::info!("Folding correction moved {} control point(s)", moved);

    Ok(f64::NAN)
}
