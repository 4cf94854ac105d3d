use glam::{DMat3, DMat4, DVec3, DVec4};
use nreg_linalg::{mat33, mat44};

use crate::error::ImageError;

/// Volume size in voxels.
///
/// 2D images are volumes with `nz == 1`.
///
/// # Examples
///
/// ```
/// use nreg_image::VolumeSize;
///
/// let size = VolumeSize::from([10, 20, 1]);
///
/// assert_eq!(size.voxel_count(), 200);
/// assert!(size.is_2d());
/// assert_eq!(size.index(3, 2, 0), 23);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VolumeSize {
    /// Number of voxels along x.
    pub nx: usize,
    /// Number of voxels along y.
    pub ny: usize,
    /// Number of voxels along z.
    pub nz: usize,
}

impl VolumeSize {
    /// Total number of voxels.
    #[inline]
    pub fn voxel_count(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    /// Whether the volume is a single slice.
    #[inline]
    pub fn is_2d(&self) -> bool {
        self.nz == 1
    }

    /// Linear index of voxel `(x, y, z)`, x varying fastest.
    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.ny + y) * self.nx + x
    }

    /// Voxel coordinates of a linear index.
    #[inline]
    pub fn coords(&self, index: usize) -> [usize; 3] {
        let plane = self.nx * self.ny;
        [index % self.nx, (index % plane) / self.nx, index / plane]
    }

    /// Whether signed voxel coordinates fall inside the volume.
    #[inline]
    pub fn contains(&self, x: i64, y: i64, z: i64) -> bool {
        x >= 0
            && y >= 0
            && z >= 0
            && (x as usize) < self.nx
            && (y as usize) < self.ny
            && (z as usize) < self.nz
    }
}

impl std::fmt::Display for VolumeSize {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "VolumeSize {{ nx: {}, ny: {}, nz: {} }}", self.nx, self.ny, self.nz)
    }
}

impl From<[usize; 3]> for VolumeSize {
    fn from(size: [usize; 3]) -> Self {
        VolumeSize {
            nx: size[0],
            ny: size[1],
            nz: size[2],
        }
    }
}

/// Size, spacing and voxel-to-world transformations of a volume.
///
/// Two voxel-to-world matrices may be present, as in NIfTI headers: the
/// `qform` and the `sform`. The sform is preferred whenever its code is
/// positive.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageGeometry {
    /// Size in voxels.
    pub size: VolumeSize,
    /// Voxel spacing (pixdim) along each axis.
    pub spacing: DVec3,
    /// Voxel-to-world matrix derived from the quaternion parameters.
    pub qform: DMat4,
    /// Transform code of the qform, 0 when unset.
    pub qform_code: i16,
    /// General affine voxel-to-world matrix.
    pub sform: DMat4,
    /// Transform code of the sform, 0 when unset.
    pub sform_code: i16,
}

impl ImageGeometry {
    /// Axis-aligned geometry with the origin at voxel zero.
    ///
    /// The qform is set to the scaling matrix `diag(spacing)` with code 1 and
    /// the sform is left unset.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::EmptyVolume`] if any dimension is zero.
    pub fn new(size: VolumeSize, spacing: DVec3) -> Result<Self, ImageError> {
        if size.voxel_count() == 0 {
            return Err(ImageError::EmptyVolume(size));
        }
        Ok(Self {
            size,
            spacing,
            qform: DMat4::from_scale(spacing),
            qform_code: 1,
            sform: DMat4::IDENTITY,
            sform_code: 0,
        })
    }

    /// Replace the sform and mark it as set (code 2, aligned to another image).
    pub fn with_sform(mut self, sform: DMat4) -> Self {
        self.sform = sform;
        self.sform_code = 2;
        self
    }

    /// Replace the qform (code 1).
    pub fn with_qform(mut self, qform: DMat4) -> Self {
        self.qform = qform;
        self.qform_code = 1;
        self
    }

    /// Translate the voxel-to-world transformation so that voxel zero maps to `origin`.
    pub fn with_origin(mut self, origin: DVec3) -> Self {
        let column = DVec4::new(origin.x, origin.y, origin.z, 1.0);
        if self.sform_code > 0 {
            self.sform.w_axis = column;
        } else {
            self.qform.w_axis = column;
        }
        self
    }

    /// Whether the volume is a single slice.
    #[inline]
    pub fn is_2d(&self) -> bool {
        self.size.is_2d()
    }

    /// The voxel-to-world matrix: sform if its code is positive, qform otherwise.
    #[inline]
    pub fn voxel_to_world(&self) -> &DMat4 {
        if self.sform_code > 0 {
            &self.sform
        } else {
            &self.qform
        }
    }

    /// Inverse of [`Self::voxel_to_world`].
    pub fn world_to_voxel(&self) -> Result<DMat4, ImageError> {
        Ok(mat44::mat44_inverse(self.voxel_to_world())?)
    }

    /// World position of a (possibly fractional) voxel coordinate.
    #[inline]
    pub fn voxel_to_world_point(&self, voxel: DVec3) -> DVec3 {
        mat44::mat44_mul_point(self.voxel_to_world(), voxel)
    }

    /// Physical spacing along each voxel axis.
    ///
    /// With an sform this is the world distance between neighbouring voxels
    /// (column norms of the linear part); otherwise the header spacing.
    pub fn real_spacing(&self) -> DVec3 {
        if self.sform_code > 0 {
            let linear = mat44::mat44_to_mat33(&self.sform);
            DVec3::new(
                linear.x_axis.length(),
                linear.y_axis.length(),
                linear.z_axis.length(),
            )
        } else {
            self.spacing
        }
    }

    /// Reorientation matrix: inverse of the rotation factor of the voxel-to-world linear part.
    pub fn reorientation(&self) -> Result<DMat3, ImageError> {
        let linear = mat44::mat44_to_mat33(self.voxel_to_world());
        Ok(mat33::reorientation_matrix(&linear)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coords_roundtrip() {
        let size = VolumeSize::from([5, 4, 3]);
        for index in [0, 7, 19, 59] {
            let [x, y, z] = size.coords(index);
            assert_eq!(size.index(x, y, z), index);
        }
        assert!(size.contains(4, 3, 2));
        assert!(!size.contains(5, 0, 0));
        assert!(!size.contains(0, -1, 0));
    }

    #[test]
    fn test_empty_volume() {
        let size = VolumeSize::from([4, 0, 1]);
        assert_eq!(
            ImageGeometry::new(size, DVec3::ONE),
            Err(ImageError::EmptyVolume(size))
        );
    }

    #[test]
    fn test_sform_preferred() -> Result<(), ImageError> {
        let geometry = ImageGeometry::new(VolumeSize::from([4, 4, 4]), DVec3::splat(2.0))?;
        assert_eq!(geometry.voxel_to_world(), &DMat4::from_scale(DVec3::splat(2.0)));

        let sform = DMat4::from_rotation_z(0.5) * DMat4::from_scale(DVec3::new(1.0, 2.0, 3.0));
        let geometry = geometry.with_sform(sform);
        assert_eq!(geometry.voxel_to_world(), &sform);

        let spacing = geometry.real_spacing();
        approx::assert_relative_eq!(spacing.x, 1.0, epsilon = 1e-12);
        approx::assert_relative_eq!(spacing.y, 2.0, epsilon = 1e-12);
        approx::assert_relative_eq!(spacing.z, 3.0, epsilon = 1e-12);

        let reorient = geometry.reorientation()?;
        let rotation = DMat3::from_rotation_z(0.5);
        assert!((reorient * rotation).abs_diff_eq(DMat3::IDENTITY, 1e-8));
        Ok(())
    }

    #[test]
    fn test_origin_and_world_to_voxel() -> Result<(), ImageError> {
        let geometry = ImageGeometry::new(VolumeSize::from([8, 8, 8]), DVec3::new(1.0, 2.0, 0.5))?
            .with_origin(DVec3::new(-4.0, 10.0, 3.0));
        let world = geometry.voxel_to_world_point(DVec3::new(1.0, 1.0, 2.0));
        assert_eq!(world, DVec3::new(-3.0, 12.0, 4.0));
        let back = mat44::mat44_mul_point(&geometry.world_to_voxel()?, world);
        assert!(back.abs_diff_eq(DVec3::new(1.0, 1.0, 2.0), 1e-12));
        Ok(())
    }
}
