use glam::{DMat3, DVec3};
use nreg_image::{parallel, ImageGeometry, VolumeSize, VolumetricImage};
use nreg_linalg::mat44;

use crate::{
    basis::{contract_plane, contract_tensor, contract_tensor_fast, AxisBasis},
    config::JacobianConfig,
    error::SplineError,
    grid::ControlPointGrid,
};

/// Jacobian matrices and their determinants at a set of sites.
///
/// Sites are either every reference voxel or every control point; in the
/// latter case the border control points hold the identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JacobianField {
    /// Reoriented Jacobian matrix of each site.
    pub matrices: Vec<DMat3>,
    /// Determinant of each matrix; the in-plane determinant for 2D fields.
    pub determinants: Vec<f64>,
}

impl JacobianField {
    /// Number of sites.
    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    /// Whether the field holds no site.
    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }

    /// Smallest determinant of the field.
    pub fn min_determinant(&self) -> f64 {
        self.determinants.iter().copied().fold(f64::INFINITY, f64::min)
    }
}

/// Determinant of each matrix.
pub fn determinants_from_matrices(matrices: &[DMat3]) -> Vec<f64> {
    matrices.iter().map(|m| m.determinant()).collect()
}

/// Determinant of a Jacobian matrix, restricted to the x-y block in 2D.
#[inline]
pub(crate) fn jacobian_determinant(m: &DMat3, is_2d: bool) -> f64 {
    if is_2d {
        m.x_axis.x * m.y_axis.y - m.y_axis.x * m.x_axis.y
    } else {
        m.determinant()
    }
}

/// Whether control point `index` has a full approximation stencil.
#[inline]
pub(crate) fn is_interior(size: VolumeSize, index: usize) -> bool {
    let [x, y, z] = size.coords(index);
    let inner = |v: usize, n: usize| v >= 1 && v + 1 < n;
    inner(x, size.nx) && inner(y, size.ny) && (size.is_2d() || inner(z, size.nz))
}

/// Lattice interval and offset of reference voxel `p` for a lattice `gvs` voxels apart.
///
/// Returns the index of the first of the four supporting control points and
/// the fractional offset in `[0, 1)`.
#[inline]
pub(crate) fn lattice_coordinate(p: usize, gvs: f64) -> (i64, f64) {
    let u = p as f64 / gvs;
    let pre = u.floor();
    (pre as i64, (u - pre).max(0.0))
}

/// Orientation and spacing shared by every site of a lattice.
pub(crate) struct SiteFrame {
    pub(crate) reorient: DMat3,
    pub(crate) real_spacing: DVec3,
    pub(crate) is_2d: bool,
    fast_path: bool,
}

impl SiteFrame {
    pub(crate) fn new(grid: &ControlPointGrid, config: &JacobianConfig) -> Result<Self, SplineError> {
        let geometry = grid.geometry();
        Ok(Self {
            reorient: geometry.reorientation()?,
            real_spacing: geometry.real_spacing(),
            is_2d: grid.is_2d(),
            fast_path: config.fast_path,
        })
    }

    /// Reoriented Jacobian of the patch starting at lattice point `base`.
    pub(crate) fn local(
        &self,
        grid: &ControlPointGrid,
        base: [i64; 3],
        bx: &AxisBasis,
        by: &AxisBasis,
        bz: &AxisBasis,
    ) -> DMat3 {
        let rs = self.real_spacing;
        let jacobian = if self.is_2d {
            let t = contract_plane(bx, by, &grid.neighbourhood_2d(base));
            DMat3::from_cols(t.x_axis / rs.x, t.y_axis / rs.y, DVec3::Z)
        } else {
            let points = grid.neighbourhood_3d(base);
            let t = if self.fast_path {
                contract_tensor_fast(bx, by, bz, &points)
            } else {
                contract_tensor(bx, by, bz, &points)
            };
            DMat3::from_cols(t.x_axis / rs.x, t.y_axis / rs.y, t.z_axis / rs.z)
        };
        self.reorient * jacobian
    }
}

/// Jacobian of control point `index` from its 3x3(x3) neighbours, or the identity on the border.
fn approximate_site(frame: &SiteFrame, grid: &ControlPointGrid, index: usize) -> DMat3 {
    let size = grid.size();
    if !is_interior(size, index) {
        return DMat3::IDENTITY;
    }
    let [x, y, z] = size.coords(index).map(|v| v as i64);
    let knot = AxisBasis::on_knot();
    frame.local(grid, [x - 1, y - 1, z - 1], &knot, &knot, &knot)
}

/// Jacobian at reference voxel `index`.
fn exact_site(
    frame: &SiteFrame,
    grid: &ControlPointGrid,
    reference: VolumeSize,
    gvs: DVec3,
    index: usize,
) -> DMat3 {
    let [x, y, z] = reference.coords(index);
    let (x_pre, tx) = lattice_coordinate(x, gvs.x);
    let (y_pre, ty) = lattice_coordinate(y, gvs.y);
    let (z_pre, tz) = if frame.is_2d {
        (0, 0.0)
    } else {
        lattice_coordinate(z, gvs.z)
    };
    frame.local(
        grid,
        [x_pre, y_pre, z_pre],
        &AxisBasis::at(tx),
        &AxisBasis::at(ty),
        &AxisBasis::at(tz),
    )
}

/// Jacobian matrices and determinants of the spline transformation.
///
/// In exact mode one site is evaluated per reference voxel, assuming the
/// lattice was laid over the reference as by
/// [`ControlPointGrid::identity`]. In approximate mode one site is evaluated
/// per interior control point, using the basis values on the knot; border
/// control points hold the identity with a unit determinant.
///
/// Each matrix is `R * T / s`, where `T` holds the derivatives of the
/// control-point positions along the lattice axes, `s` the real lattice
/// spacing and `R` the lattice reorientation. 2D matrices keep a unit z axis.
///
/// # Arguments
///
/// * `grid` - The control-point lattice.
/// * `reference` - The geometry of the reference image.
/// * `approx` - Evaluate at control points instead of reference voxels.
/// * `config` - The Jacobian parameters.
///
/// # Errors
///
/// Returns an error if the grid and the reference differ in dimensionality
/// or the lattice orientation is degenerate.
pub fn jacobian_field(
    grid: &ControlPointGrid,
    reference: &ImageGeometry,
    approx: bool,
    config: &JacobianConfig,
) -> Result<JacobianField, SplineError> {
    grid.check_reference(reference)?;
    let frame = SiteFrame::new(grid, config)?;

    let matrices = if approx {
        parallel::map_indexed(config.execution, grid.len(), |index| {
            approximate_site(&frame, grid, index)
        })?
    } else {
        let gvs = grid.grid_voxel_spacing(reference);
        parallel::map_indexed(config.execution, reference.size.voxel_count(), |index| {
            exact_site(&frame, grid, reference.size, gvs, index)
        })?
    };

    let size = grid.size();
    let determinants = matrices
        .iter()
        .enumerate()
        .map(|(index, m)| {
            if approx && !is_interior(size, index) {
                1.0
            } else {
                jacobian_determinant(m, frame.is_2d)
            }
        })
        .collect();

    Ok(JacobianField {
        matrices,
        determinants,
    })
}

/// Map of the Jacobian determinant at every reference voxel.
///
/// # Errors
///
/// Returns an error under the same conditions as [`jacobian_field`].
pub fn jacobian_determinant_map(
    grid: &ControlPointGrid,
    reference: &ImageGeometry,
    config: &JacobianConfig,
) -> Result<VolumetricImage, SplineError> {
    let field = jacobian_field(grid, reference, false, config)?;
    Ok(VolumetricImage::from_vec(reference.clone(), field.determinants)?)
}

/// Jacobian matrices at every reference voxel for an arbitrarily placed lattice.
///
/// Reference voxels are mapped to lattice coordinates through the
/// reference voxel-to-world and the lattice world-to-voxel transformations,
/// so the lattice needs not have been built from this reference.
///
/// # Errors
///
/// Returns an error if the dimensionality differs or the lattice
/// voxel-to-world matrix is singular.
pub fn jacobian_matrices_full(
    grid: &ControlPointGrid,
    reference: &ImageGeometry,
    config: &JacobianConfig,
) -> Result<Vec<DMat3>, SplineError> {
    grid.check_reference(reference)?;
    let frame = SiteFrame::new(grid, config)?;
    let reference_to_lattice = grid.geometry().world_to_voxel()? * *reference.voxel_to_world();
    let size = reference.size;

    let matrices = parallel::map_indexed(config.execution, size.voxel_count(), |index| {
        let [x, y, z] = size.coords(index);
        let position = DVec3::new(x as f64, y as f64, z as f64);
        let lattice = mat44::mat44_mul_point(&reference_to_lattice, position);
        let floor = lattice.floor();
        let t = (lattice - floor).max(DVec3::ZERO);
        let base = [floor.x as i64 - 1, floor.y as i64 - 1, floor.z as i64 - 1];
        frame.local(
            grid,
            base,
            &AxisBasis::at(t.x),
            &AxisBasis::at(t.y),
            &AxisBasis::at(t.z),
        )
    })?;
    Ok(matrices)
}
