use glam::DMat3;
use nreg_image::{parallel, ImageGeometry};
use nreg_linalg::mat44;

use crate::{
    config::JacobianConfig,
    deformation::{trilinear, DeformationField},
    error::SplineError,
    grid::ControlPointGrid,
    jacobian::jacobian_determinant,
};

/// Largest supported number of squaring steps.
pub const MAX_SQUARING_STEPS: u32 = 32;

/// A stationary velocity field parametrised by a control-point lattice.
///
/// The lattice stores `x + v(x)` at each control point, like a
/// transformation lattice. The transformation is the exponential of the
/// velocity, computed by scaling and `|squaring_steps|` squarings; a negative
/// step count yields the backward transformation.
#[derive(Debug, Clone, PartialEq)]
pub struct VelocityGrid {
    /// The velocity lattice.
    pub grid: ControlPointGrid,
    /// Number of squaring steps; the sign selects the direction.
    pub squaring_steps: i32,
}

impl VelocityGrid {
    /// Wrap a velocity lattice.
    pub fn new(grid: ControlPointGrid, squaring_steps: i32) -> Self {
        Self {
            grid,
            squaring_steps,
        }
    }

    /// Number of squarings, checked against [`MAX_SQUARING_STEPS`].
    fn steps(&self) -> Result<u32, SplineError> {
        let steps = self.squaring_steps.unsigned_abs();
        if steps > MAX_SQUARING_STEPS {
            return Err(SplineError::TooManySquaringSteps(self.squaring_steps));
        }
        Ok(steps)
    }

    /// The scaled velocity `x + sign * v(x) / 2^|steps|` on `reference`.
    fn scaled_deformation(
        &self,
        reference: &ImageGeometry,
        config: &JacobianConfig,
    ) -> Result<DeformationField, SplineError> {
        let steps = self.steps()?;
        let sign = if self.squaring_steps < 0 { -1.0 } else { 1.0 };
        let scale = sign * 0.5f64.powi(steps as i32);

        let field = self.grid.deformation_field(reference, config.execution)?;
        let displacements = field.displacements();
        let positions = field
            .positions
            .iter()
            .zip(&displacements)
            .map(|(p, d)| *p - *d + *d * scale)
            .collect();
        DeformationField::new(field.geometry, positions)
    }
}

/// Jacobian matrices of the exponentiated velocity field at every reference voxel.
///
/// The scaled velocity `phi` is differentiated by forward differences, then
/// each squaring step applies the chain rule `J <- J(phi(x)) * J(x)`, with
/// `J(phi(x))` interpolated trilinearly, and replaces `phi` by `phi o phi`.
///
/// # Errors
///
/// Returns an error if the lattice and the reference differ in
/// dimensionality, a geometry is degenerate, the reference has fewer than
/// two voxels along a used axis or `|squaring_steps|` exceeds
/// [`MAX_SQUARING_STEPS`].
pub fn velocity_jacobian_matrices(
    reference: &ImageGeometry,
    velocity: &VelocityGrid,
    config: &JacobianConfig,
) -> Result<Vec<DMat3>, SplineError> {
    let mut phi = velocity.scaled_deformation(reference, config)?;
    let mut matrices = phi.jacobian_field()?.matrices;
    let world_to_voxel = reference.world_to_voxel()?;
    let size = reference.size;

    let steps = velocity.steps()?;
    for _ in 0..steps {
        let current = &matrices;
        let positions = &phi.positions;
        let next = parallel::map_indexed(config.execution, current.len(), |index| {
            let voxel = mat44::mat44_mul_point(&world_to_voxel, positions[index]);
            trilinear(current, size, voxel) * current[index]
        })?;
        matrices = next;
        phi = phi.compose(&phi)?;
    }

    log::debug!(
        "Velocity Jacobians computed with {} squaring step(s)",
        steps
    );
    Ok(matrices)
}

/// Jacobian determinants of the exponentiated velocity field at every reference voxel.
///
/// # Errors
///
/// Returns an error under the same conditions as [`velocity_jacobian_matrices`].
pub fn velocity_jacobian_determinants(
    reference: &ImageGeometry,
    velocity: &VelocityGrid,
    config: &JacobianConfig,
) -> Result<Vec<f64>, SplineError> {
    let is_2d = reference.is_2d();
    Ok(velocity_jacobian_matrices(reference, velocity, config)?
        .iter()
        .map(|m| jacobian_determinant(m, is_2d))
        .collect())
}
