use std::ops::{Add, Mul};

use glam::{DMat3, DMat4, DVec3};
use nreg_image::{parallel, ExecutionStrategy, ImageGeometry, VolumeSize};
use nreg_linalg::mat44;

use crate::{
    basis::bspline_basis_values,
    error::SplineError,
    grid::ControlPointGrid,
    jacobian::{jacobian_determinant, JacobianField},
};

/// World position of the transformation at every voxel of a geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct DeformationField {
    /// The sampling geometry, usually the reference image's.
    pub geometry: ImageGeometry,
    /// Transformed world position of each voxel, x varying fastest.
    pub positions: Vec<DVec3>,
}

/// Trilinear interpolation of a voxel-sampled quantity, clamped at the volume edges.
///
/// The z axis is ignored for single-slice volumes.
pub(crate) fn trilinear<T>(values: &[T], size: VolumeSize, voxel: DVec3) -> T
where
    T: Copy + Add<Output = T> + Mul<f64, Output = T>,
{
    let axis = |u: f64, n: usize| -> (usize, usize, f64) {
        let last = (n - 1) as f64;
        let u = u.clamp(0.0, last);
        let lo = u.floor();
        let i0 = lo as usize;
        (i0, (i0 + 1).min(n - 1), u - lo)
    };
    let (x0, x1, fx) = axis(voxel.x, size.nx);
    let (y0, y1, fy) = axis(voxel.y, size.ny);
    let (z0, z1, fz) = if size.is_2d() {
        (0, 0, 0.0)
    } else {
        axis(voxel.z, size.nz)
    };

    let lerp_x = |y: usize, z: usize| {
        values[size.index(x0, y, z)] * (1.0 - fx) + values[size.index(x1, y, z)] * fx
    };
    let lerp_y = |z: usize| lerp_x(y0, z) * (1.0 - fy) + lerp_x(y1, z) * fy;
    lerp_y(z0) * (1.0 - fz) + lerp_y(z1) * fz
}

impl DeformationField {
    /// Create a field from its geometry and positions.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of positions does not match the geometry.
    pub fn new(geometry: ImageGeometry, positions: Vec<DVec3>) -> Result<Self, SplineError> {
        if positions.len() != geometry.size.voxel_count() {
            return Err(SplineError::PositionCount {
                expected: geometry.size.voxel_count(),
                found: positions.len(),
            });
        }
        Ok(Self {
            geometry,
            positions,
        })
    }

    /// The identity transformation sampled on `geometry`.
    pub fn identity(geometry: &ImageGeometry) -> Self {
        let size = geometry.size;
        let positions = (0..size.voxel_count())
            .map(|index| voxel_world(geometry, index))
            .collect();
        Self {
            geometry: geometry.clone(),
            positions,
        }
    }

    /// Displacement of each voxel from its own world position.
    pub fn displacements(&self) -> Vec<DVec3> {
        self.positions
            .iter()
            .enumerate()
            .map(|(index, p)| *p - voxel_world(&self.geometry, index))
            .collect()
    }

    /// Jacobian matrices of the field by forward differences.
    ///
    /// The derivative at each voxel uses the next voxel along every axis;
    /// the last row, column and slice reuse the differences of the one
    /// before. Matrices are divided by the real voxel spacing and
    /// reoriented. 2D fields keep a unit z axis.
    ///
    /// # Errors
    ///
    /// Returns an error if the field has fewer than two voxels along a used
    /// axis or its orientation is degenerate.
    pub fn jacobian_field(&self) -> Result<JacobianField, SplineError> {
        let size = self.geometry.size;
        let is_2d = size.is_2d();
        if size.nx < 2 || size.ny < 2 || (!is_2d && size.nz < 2) {
            return Err(SplineError::FieldTooSmall(size));
        }
        let reorient = self.geometry.reorientation()?;
        let spacing = self.geometry.real_spacing();

        let mut matrices = Vec::with_capacity(size.voxel_count());
        for z in 0..size.nz {
            let z0 = if is_2d { 0 } else { z.min(size.nz - 2) };
            for y in 0..size.ny {
                let y0 = y.min(size.ny - 2);
                for x in 0..size.nx {
                    let x0 = x.min(size.nx - 2);
                    let origin = self.positions[size.index(x0, y0, z0)];
                    let dx = (self.positions[size.index(x0 + 1, y0, z0)] - origin) / spacing.x;
                    let dy = (self.positions[size.index(x0, y0 + 1, z0)] - origin) / spacing.y;
                    let jacobian = if is_2d {
                        DMat3::from_cols(dx.truncate().extend(0.0), dy.truncate().extend(0.0), DVec3::Z)
                    } else {
                        let dz = (self.positions[size.index(x0, y0, z0 + 1)] - origin) / spacing.z;
                        DMat3::from_cols(dx, dy, dz)
                    };
                    matrices.push(reorient * jacobian);
                }
            }
        }

        let determinants = matrices
            .iter()
            .map(|m| jacobian_determinant(m, is_2d))
            .collect();
        Ok(JacobianField {
            matrices,
            determinants,
        })
    }

    /// Transformation at an arbitrary world position.
    ///
    /// The displacement is interpolated trilinearly, clamped at the field
    /// edges, and added to `world`.
    pub(crate) fn sample(&self, world_to_voxel: &DMat4, displacements: &[DVec3], world: DVec3) -> DVec3 {
        let voxel = mat44::mat44_mul_point(world_to_voxel, world);
        world + trilinear(displacements, self.geometry.size, voxel)
    }

    /// Composition `self(inner(x))` sampled on the geometry of `inner`.
    ///
    /// # Errors
    ///
    /// Returns an error if the voxel-to-world matrix of `self` is singular.
    pub fn compose(&self, inner: &DeformationField) -> Result<DeformationField, SplineError> {
        let world_to_voxel = self.geometry.world_to_voxel()?;
        let displacements = self.displacements();
        let positions = inner
            .positions
            .iter()
            .map(|p| self.sample(&world_to_voxel, &displacements, *p))
            .collect();
        Ok(DeformationField {
            geometry: inner.geometry.clone(),
            positions,
        })
    }
}

/// World position of voxel `index` of `geometry`.
fn voxel_world(geometry: &ImageGeometry, index: usize) -> DVec3 {
    let [x, y, z] = geometry.size.coords(index);
    geometry.voxel_to_world_point(DVec3::new(x as f64, y as f64, z as f64))
}

impl ControlPointGrid {
    /// Evaluate the cubic B-spline transformation at every voxel of `reference`.
    ///
    /// Reference voxels are mapped into the lattice through the world
    /// coordinates, so any lattice placement is supported; neighbours outside
    /// the lattice are extrapolated.
    ///
    /// # Errors
    ///
    /// Returns an error if the dimensionality differs, the lattice
    /// voxel-to-world matrix is singular or the thread pool fails.
    pub fn deformation_field(
        &self,
        reference: &ImageGeometry,
        execution: ExecutionStrategy,
    ) -> Result<DeformationField, SplineError> {
        self.check_reference(reference)?;
        let reference_to_lattice = self.geometry().world_to_voxel()? * *reference.voxel_to_world();
        let size = reference.size;
        let is_2d = self.is_2d();

        let positions = parallel::map_indexed(execution, size.voxel_count(), |index| {
            let [x, y, z] = size.coords(index);
            let voxel = DVec3::new(x as f64, y as f64, z as f64);
            let lattice = mat44::mat44_mul_point(&reference_to_lattice, voxel);
            let floor = lattice.floor();
            let t = (lattice - floor).max(DVec3::ZERO);
            let base = [floor.x as i64 - 1, floor.y as i64 - 1, floor.z as i64 - 1];
            let bx = bspline_basis_values(t.x);
            let by = bspline_basis_values(t.y);

            if is_2d {
                let points = self.neighbourhood_2d(base);
                let mut p = DVec3::ZERO;
                for b in 0..4 {
                    for a in 0..4 {
                        p += points[b * 4 + a] * (bx[a] * by[b]);
                    }
                }
                // the plane keeps the world z of the reference slice
                p.truncate().extend(reference.voxel_to_world_point(voxel).z)
            } else {
                let bz = bspline_basis_values(t.z);
                let points = self.neighbourhood_3d(base);
                let mut p = DVec3::ZERO;
                for (k, point) in points.iter().enumerate() {
                    p += *point * (bx[k % 4] * by[(k / 4) % 4] * bz[k / 16]);
                }
                p
            }
        })?;

        DeformationField::new(reference.clone(), positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trilinear() {
        let size = VolumeSize::from([2, 2, 2]);
        let values: Vec<f64> = (0..8).map(|i| i as f64).collect();
        // value = x + 2y + 4z
        approx::assert_relative_eq!(trilinear(&values, size, DVec3::new(0.5, 0.5, 0.5)), 3.5);
        approx::assert_relative_eq!(trilinear(&values, size, DVec3::new(0.25, 1.0, 0.0)), 2.25);
        // clamped outside
        approx::assert_relative_eq!(trilinear(&values, size, DVec3::new(-3.0, 5.0, 0.0)), 2.0);
    }

    #[test]
    fn test_identity_grid_reproduces_identity_field() -> Result<(), SplineError> {
        let reference = ImageGeometry::new(VolumeSize::from([9, 7, 5]), DVec3::new(1.0, 2.0, 1.5))?
            .with_origin(DVec3::new(10.0, -5.0, 2.0));
        let grid = ControlPointGrid::identity(&reference, DVec3::splat(4.0))?;
        let field = grid.deformation_field(&reference, ExecutionStrategy::Serial)?;
        let identity = DeformationField::identity(&reference);
        for (a, b) in field.positions.iter().zip(&identity.positions) {
            assert!(a.abs_diff_eq(*b, 1e-9));
        }
        assert!(field.displacements().iter().all(|d| d.length() < 1e-9));

        let jacobians = field.jacobian_field()?;
        assert!(jacobians.matrices.iter().all(|m| m.abs_diff_eq(DMat3::IDENTITY, 1e-9)));
        Ok(())
    }

    #[test]
    fn test_compose_translations() -> Result<(), SplineError> {
        let geometry = ImageGeometry::new(VolumeSize::from([6, 6, 6]), DVec3::ONE)?;
        let identity = DeformationField::identity(&geometry);
        let shift = |d: DVec3| DeformationField {
            geometry: geometry.clone(),
            positions: identity.positions.iter().map(|p| *p + d).collect(),
        };
        let outer = shift(DVec3::new(1.0, 0.0, -0.5));
        let inner = shift(DVec3::new(0.5, 1.0, 0.0));
        let composed = outer.compose(&inner)?;
        for (c, p) in composed.positions.iter().zip(&identity.positions) {
            assert!(c.abs_diff_eq(*p + DVec3::new(1.5, 1.0, -0.5), 1e-12));
        }
        Ok(())
    }

    #[test]
    fn test_field_too_small() -> Result<(), SplineError> {
        let geometry = ImageGeometry::new(VolumeSize::from([1, 4, 1]), DVec3::ONE)?;
        let field = DeformationField::identity(&geometry);
        assert_eq!(
            field.jacobian_field(),
            Err(SplineError::FieldTooSmall(geometry.size))
        );
        Ok(())
    }
}
