use glam::{DMat4, DVec3};
use nreg_image::{ImageGeometry, VolumeSize};

use crate::error::SplineError;

/// Smallest lattice extent along an axis with full cubic support.
const MIN_POINTS: usize = 4;

/// A cubic B-spline control-point lattice.
///
/// Each control point stores its world **position** (not a displacement).
/// The z component is ignored for single-slice lattices. Lattice neighbours
/// requested outside the grid are extrapolated linearly from the two nearest
/// points along each axis, so the transformation slides at the border.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlPointGrid {
    geometry: ImageGeometry,
    positions: Vec<DVec3>,
}

impl ControlPointGrid {
    /// Create a lattice from its geometry and control-point positions.
    ///
    /// # Errors
    ///
    /// Returns an error if the lattice has fewer than 4 points along a used
    /// axis or if the number of positions does not match its size.
    pub fn new(geometry: ImageGeometry, positions: Vec<DVec3>) -> Result<Self, SplineError> {
        let size = geometry.size;
        if size.nx < MIN_POINTS || size.ny < MIN_POINTS || (!size.is_2d() && size.nz < MIN_POINTS) {
            return Err(SplineError::GridTooSmall(size));
        }
        if positions.len() != size.voxel_count() {
            return Err(SplineError::PositionCount {
                expected: size.voxel_count(),
                found: positions.len(),
            });
        }
        Ok(Self {
            geometry,
            positions,
        })
    }

    /// Identity transformation covering `reference` with control points every `spacing` mm.
    ///
    /// The lattice has `ceil(n * d / spacing) + 3` points along each axis,
    /// shares the orientation of the reference and starts one control-point
    /// spacing before the reference origin. Single-slice references produce
    /// single-slice lattices.
    ///
    /// # Arguments
    ///
    /// * `reference` - The geometry of the reference image.
    /// * `spacing` - The control-point spacing in mm.
    ///
    /// # Examples
    ///
    /// ```
    /// use glam::DVec3;
    /// use nreg_image::{ImageGeometry, VolumeSize};
    /// use nreg_spline::ControlPointGrid;
    ///
    /// let reference = ImageGeometry::new(VolumeSize::from([20, 16, 8]), DVec3::ONE).unwrap();
    /// let grid = ControlPointGrid::identity(&reference, DVec3::splat(4.0)).unwrap();
    ///
    /// assert_eq!(grid.size(), VolumeSize::from([8, 7, 5]));
    /// assert_eq!(grid.positions()[0], DVec3::splat(-4.0));
    /// ```
    pub fn identity(reference: &ImageGeometry, spacing: DVec3) -> Result<Self, SplineError> {
        if !spacing.cmpgt(DVec3::ZERO).all() || !spacing.is_finite() {
            return Err(SplineError::InvalidSpacing(spacing));
        }
        let is_2d = reference.is_2d();
        let extent = |n: usize, d: f64, s: f64| ((n as f64 * d) / s).ceil() as usize + 3;
        let size = VolumeSize {
            nx: extent(reference.size.nx, reference.spacing.x, spacing.x),
            ny: extent(reference.size.ny, reference.spacing.y, spacing.y),
            nz: if is_2d {
                1
            } else {
                extent(reference.size.nz, reference.spacing.z, spacing.z)
            },
        };

        let spacing = if is_2d {
            DVec3::new(spacing.x, spacing.y, reference.spacing.z)
        } else {
            spacing
        };
        let scale = spacing / reference.spacing;
        let shift = if is_2d {
            DVec3::new(-1.0, -1.0, 0.0)
        } else {
            DVec3::NEG_ONE
        };
        let reference_to_lattice = DMat4::from_scale(scale) * DMat4::from_translation(shift);

        let mut geometry = ImageGeometry::new(size, spacing)?
            .with_qform(reference.qform * reference_to_lattice);
        if reference.sform_code > 0 {
            geometry = geometry.with_sform(reference.sform * reference_to_lattice);
        }

        let mut positions = Vec::with_capacity(size.voxel_count());
        for z in 0..size.nz {
            for y in 0..size.ny {
                for x in 0..size.nx {
                    positions.push(
                        geometry.voxel_to_world_point(DVec3::new(x as f64, y as f64, z as f64)),
                    );
                }
            }
        }

        log::debug!("Identity control point grid of {} for reference {}", size, reference.size);

        Self::new(geometry, positions)
    }

    /// The lattice geometry.
    pub fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }

    /// Number of control points along each axis.
    pub fn size(&self) -> VolumeSize {
        self.geometry.size
    }

    /// Whether the lattice is single-slice.
    pub fn is_2d(&self) -> bool {
        self.geometry.is_2d()
    }

    /// Number of control points.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether the lattice holds no control points. Never true for a valid lattice.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Control-point positions, x varying fastest.
    pub fn positions(&self) -> &[DVec3] {
        &self.positions
    }

    /// Mutable control-point positions.
    pub fn positions_mut(&mut self) -> &mut [DVec3] {
        &mut self.positions
    }

    /// Position of lattice point `(x, y, z)`, extrapolated outside the lattice.
    pub fn position(&self, x: i64, y: i64, z: i64) -> DVec3 {
        let size = self.size();
        let z = if size.is_2d() { 0 } else { z };
        slide(size.nx, x, |x| {
            slide(size.ny, y, |y| {
                slide(size.nz, z, |z| self.positions[size.index(x, y, z)])
            })
        })
    }

    /// Control-point spacing in reference voxels along each axis.
    pub fn grid_voxel_spacing(&self, reference: &ImageGeometry) -> DVec3 {
        self.geometry.spacing / reference.spacing
    }

    /// The 4x4 neighbourhood starting at lattice point `base`, x varying fastest.
    pub(crate) fn neighbourhood_2d(&self, base: [i64; 3]) -> [DVec3; 16] {
        let size = self.size();
        let inside = size.contains(base[0], base[1], 0) && size.contains(base[0] + 3, base[1] + 3, 0);
        let mut out = [DVec3::ZERO; 16];
        for (k, p) in out.iter_mut().enumerate() {
            let (x, y) = (base[0] + (k % 4) as i64, base[1] + (k / 4) as i64);
            *p = if inside {
                self.positions[size.index(x as usize, y as usize, 0)]
            } else {
                self.position(x, y, 0)
            };
        }
        out
    }

    /// The 4x4x4 neighbourhood starting at lattice point `base`, x varying fastest.
    pub(crate) fn neighbourhood_3d(&self, base: [i64; 3]) -> [DVec3; 64] {
        let size = self.size();
        let inside = size.contains(base[0], base[1], base[2])
            && size.contains(base[0] + 3, base[1] + 3, base[2] + 3);
        let mut out = [DVec3::ZERO; 64];
        for (k, p) in out.iter_mut().enumerate() {
            let x = base[0] + (k % 4) as i64;
            let y = base[1] + ((k / 4) % 4) as i64;
            let z = base[2] + (k / 16) as i64;
            *p = if inside {
                self.positions[size.index(x as usize, y as usize, z as usize)]
            } else {
                self.position(x, y, z)
            };
        }
        out
    }

    /// Check that the lattice and the reference are both 2D or both 3D.
    pub(crate) fn check_reference(&self, reference: &ImageGeometry) -> Result<(), SplineError> {
        if self.is_2d() != reference.is_2d() {
            return Err(SplineError::DimensionalityMismatch {
                grid_2d: self.is_2d(),
                reference_2d: reference.is_2d(),
            });
        }
        Ok(())
    }
}

/// Value at signed lattice index `i` along an axis of `n` points, extrapolated linearly outside.
fn slide(n: usize, i: i64, at: impl Fn(usize) -> DVec3) -> DVec3 {
    let last = n as i64 - 1;
    if n < 2 {
        at(0)
    } else if i < 0 {
        let a = at(0);
        a + (at(1) - a) * i as f64
    } else if i > last {
        let a = at(n - 1);
        a + (a - at(n - 2)) * (i - last) as f64
    } else {
        at(i as usize)
    }
}
