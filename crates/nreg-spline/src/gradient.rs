use glam::DVec3;
use nreg_image::{parallel, ImageGeometry, VolumeSize};
use nreg_linalg::mat33;

use crate::{
    basis::bspline_basis,
    config::JacobianConfig,
    error::SplineError,
    grid::ControlPointGrid,
    jacobian::{is_interior, jacobian_field, lattice_coordinate, SiteFrame},
};

/// Sites along one axis influenced by lattice point `c`, with its basis value and derivative.
type AxisSupport = Vec<(usize, f64, f64)>;

/// Rounding of the exclusive end of an exact support interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SupportEnd {
    /// `ceil((c + 1) gvs)`, every voxel the basis reaches.
    Ceil,
    /// `floor((c + 1) gvs)`, the last partial voxel is left out.
    Floor,
}

/// Reference voxels `p` in `[ceil((c - 3) gvs), end((c + 1) gvs))` that lie inside `0..n`.
fn exact_axis_support(c: i64, gvs: f64, n: usize, end: SupportEnd) -> AxisSupport {
    let start = ((c - 3) as f64 * gvs).ceil().max(0.0) as usize;
    let upper = (c + 1) as f64 * gvs;
    let upper = match end {
        SupportEnd::Ceil => upper.ceil(),
        SupportEnd::Floor => upper.floor(),
    };
    let end = (upper.max(0.0) as usize).min(n);
    (start..end)
        .filter_map(|p| {
            let (pre, t) = lattice_coordinate(p, gvs);
            let (value, first, _) = bspline_basis(t, c - pre);
            (value != 0.0 || first != 0.0).then_some((p, value, first))
        })
        .collect()
}

/// Control points `s` in `c - 1..=c + 1` that lie inside `0..n`, weighted on the knot.
fn approximate_axis_support(c: i64, n: usize) -> AxisSupport {
    (c - 1..=c + 1)
        .filter(|&s| s >= 0 && (s as usize) < n)
        .map(|s| {
            let (value, first, _) = bspline_basis(0.0, c - s + 1);
            (s as usize, value, first)
        })
        .collect()
}

/// Visit every site whose Jacobian depends on control point `index`.
///
/// `visit` receives the site index and the derivative of the basis product
/// with respect to each lattice axis. Approximate sites are restricted to
/// interior control points. `end` rounds the upper bound of exact supports.
pub(crate) fn visit_support(
    grid_size: VolumeSize,
    reference_size: VolumeSize,
    gvs: DVec3,
    approx: bool,
    end: SupportEnd,
    index: usize,
    mut visit: impl FnMut(usize, DVec3),
) {
    let [x, y, z] = grid_size.coords(index).map(|v| v as i64);
    let flat: AxisSupport = vec![(0, 1.0, 0.0)];

    let (xs, ys, zs) = if approx {
        (
            approximate_axis_support(x, grid_size.nx),
            approximate_axis_support(y, grid_size.ny),
            if grid_size.is_2d() {
                flat
            } else {
                approximate_axis_support(z, grid_size.nz)
            },
        )
    } else {
        (
            exact_axis_support(x, gvs.x, reference_size.nx, end),
            exact_axis_support(y, gvs.y, reference_size.ny, end),
            if reference_size.is_2d() {
                flat
            } else {
                exact_axis_support(z, gvs.z, reference_size.nz, end)
            },
        )
    };

    let sites = if approx { grid_size } else { reference_size };
    for &(pz, z_value, z_first) in &zs {
        for &(py, y_value, y_first) in &ys {
            for &(px, x_value, x_first) in &xs {
                let site = sites.index(px, py, pz);
                if approx && !is_interior(grid_size, site) {
                    continue;
                }
                let basis = DVec3::new(
                    x_first * y_value * z_value,
                    x_value * y_first * z_value,
                    x_value * y_value * z_first,
                );
                visit(site, basis);
            }
        }
    }
}

/// Add the weighted analytic gradient of the Jacobian penalty to `gradient`.
///
/// For every control point, each site of its support with a positive
/// determinant contributes `dP(det) * cof(J) * b`, where `dP` is the
/// derivative of the per-site penalty, `cof(J)` the cofactor matrix of the
/// site Jacobian and `b` the basis derivative vector of the control point at
/// that site. The sum is taken back to the lattice orientation and scaled
/// per axis by `d_ref * weight / (N * d_cp)`, with `N` the number of
/// reference voxels in exact mode and of control points in approximate mode.
///
/// # Arguments
///
/// * `grid` - The control-point lattice.
/// * `reference` - The geometry of the reference image.
/// * `gradient` - One entry per control point, updated in place.
/// * `weight` - The penalty weight.
/// * `approx` - Evaluate at control points instead of reference voxels.
/// * `config` - The Jacobian parameters.
///
/// # Errors
///
/// Returns an error if `gradient` does not have one entry per control
/// point, or under the same conditions as [`jacobian_field`].
pub fn jacobian_penalty_gradient(
    grid: &ControlPointGrid,
    reference: &ImageGeometry,
    gradient: &mut [DVec3],
    weight: f64,
    approx: bool,
    config: &JacobianConfig,
) -> Result<(), SplineError> {
    if gradient.len() != grid.len() {
        return Err(SplineError::GradientLength {
            expected: grid.len(),
            found: gradient.len(),
        });
    }

    let field = jacobian_field(grid, reference, approx, config)?;
    let frame = SiteFrame::new(grid, config)?;
    let desorient = mat33::mat33_inverse(&frame.reorient)?;
    let gvs = grid.grid_voxel_spacing(reference);
    let site_count = if approx {
        grid.len()
    } else {
        reference.size.voxel_count()
    } as f64;
    let ratio = reference.spacing * weight / (grid.geometry().spacing * site_count);
    let kind = config.penalty;
    let end = SupportEnd::Ceil;

    parallel::for_each_indexed(config.execution, gradient, |index, value| {
        let mut constraint = DVec3::ZERO;
        visit_support(grid.size(), reference.size, gvs, approx, end, index, |site, basis| {
            let det = field.determinants[site];
            if det > 0.0 {
                constraint += mat33::mat33_cofactor(&field.matrices[site]) * basis * kind.derivative(det);
            }
        });
        let mut step = desorient * constraint;
        if frame.is_2d {
            step.z = 0.0;
        }
        *value += ratio * step;
    })?;
    Ok(())
}
