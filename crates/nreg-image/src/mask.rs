use crate::{error::ImageError, geometry::VolumeSize};

/// Per-voxel inclusion mask.
///
/// A voxel takes part in the computation when its mask value is greater than
/// `-1`. Mask values are kept as integers so that label images can be passed
/// through unchanged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    size: VolumeSize,
    values: Vec<i32>,
}

impl Mask {
    /// Create a mask from one integer per voxel.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::InvalidDataLength`] if the number of values does
    /// not match the size.
    pub fn new(size: VolumeSize, values: Vec<i32>) -> Result<Self, ImageError> {
        if values.len() != size.voxel_count() {
            return Err(ImageError::InvalidDataLength(
                values.len(),
                size.voxel_count(),
            ));
        }
        Ok(Self { size, values })
    }

    /// A mask that includes every voxel.
    pub fn all(size: VolumeSize) -> Self {
        Self {
            size,
            values: vec![0; size.voxel_count()],
        }
    }

    /// Create a mask from a boolean predicate, `true` marking included voxels.
    pub fn from_fn(size: VolumeSize, mut f: impl FnMut(usize, usize, usize) -> bool) -> Self {
        let mut values = Vec::with_capacity(size.voxel_count());
        for z in 0..size.nz {
            for y in 0..size.ny {
                for x in 0..size.nx {
                    values.push(if f(x, y, z) { 0 } else { -1 });
                }
            }
        }
        Self { size, values }
    }

    /// The mask size.
    #[inline]
    pub fn size(&self) -> VolumeSize {
        self.size
    }

    /// The raw mask values.
    #[inline]
    pub fn values(&self) -> &[i32] {
        &self.values
    }

    /// Whether the voxel at a linear index is included.
    #[inline]
    pub fn is_included(&self, index: usize) -> bool {
        self.values.get(index).is_some_and(|&v| v > -1)
    }

    /// Number of included voxels.
    pub fn included_count(&self) -> usize {
        self.values.iter().filter(|&&v| v > -1).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inclusion() -> Result<(), ImageError> {
        let size = VolumeSize::from([2, 2, 1]);
        let mask = Mask::new(size, vec![0, -1, 3, -7])?;
        assert!(mask.is_included(0));
        assert!(!mask.is_included(1));
        assert!(mask.is_included(2));
        assert!(!mask.is_included(3));
        assert!(!mask.is_included(4));
        assert_eq!(mask.included_count(), 2);

        assert_eq!(
            Mask::new(size, vec![0; 3]),
            Err(ImageError::InvalidDataLength(3, 4))
        );
        Ok(())
    }

    #[test]
    fn test_from_fn() {
        let size = VolumeSize::from([3, 2, 2]);
        let mask = Mask::from_fn(size, |x, _, z| x == 1 && z == 1);
        assert_eq!(mask.included_count(), 2);
        assert!(mask.is_included(size.index(1, 0, 1)));
        assert!(mask.is_included(size.index(1, 1, 1)));
        assert_eq!(Mask::all(size).included_count(), 12);
    }
}
