use crate::{
    datatype::{DataType, Voxel},
    error::ImageError,
    geometry::{ImageGeometry, VolumeSize},
};

/// Typed storage of the voxel values of a volume, x varying fastest.
#[derive(Clone, Debug, PartialEq)]
pub enum VoxelBuffer {
    /// Unsigned 8-bit voxels.
    U8(Vec<u8>),
    /// Signed 8-bit voxels.
    I8(Vec<i8>),
    /// Unsigned 16-bit voxels.
    U16(Vec<u16>),
    /// Signed 16-bit voxels.
    I16(Vec<i16>),
    /// Unsigned 32-bit voxels.
    U32(Vec<u32>),
    /// Signed 32-bit voxels.
    I32(Vec<i32>),
    /// 32-bit float voxels.
    F32(Vec<f32>),
    /// 64-bit float voxels.
    F64(Vec<f64>),
}

/// Dispatch an expression over every variant of a [`VoxelBuffer`], binding the inner vector.
macro_rules! dispatch {
    ($buffer:expr, $v:ident => $body:expr) => {
        match $buffer {
            VoxelBuffer::U8($v) => $body,
            VoxelBuffer::I8($v) => $body,
            VoxelBuffer::U16($v) => $body,
            VoxelBuffer::I16($v) => $body,
            VoxelBuffer::U32($v) => $body,
            VoxelBuffer::I32($v) => $body,
            VoxelBuffer::F32($v) => $body,
            VoxelBuffer::F64($v) => $body,
        }
    };
}

impl VoxelBuffer {
    /// A buffer of `len` zeros of the given datatype.
    pub fn zeros(datatype: DataType, len: usize) -> Self {
        match datatype {
            DataType::U8 => VoxelBuffer::U8(vec![0; len]),
            DataType::I8 => VoxelBuffer::I8(vec![0; len]),
            DataType::U16 => VoxelBuffer::U16(vec![0; len]),
            DataType::I16 => VoxelBuffer::I16(vec![0; len]),
            DataType::U32 => VoxelBuffer::U32(vec![0; len]),
            DataType::I32 => VoxelBuffer::I32(vec![0; len]),
            DataType::F32 => VoxelBuffer::F32(vec![0.0; len]),
            DataType::F64 => VoxelBuffer::F64(vec![0.0; len]),
        }
    }

    /// The datatype tag of the buffer.
    pub fn datatype(&self) -> DataType {
        match self {
            VoxelBuffer::U8(_) => DataType::U8,
            VoxelBuffer::I8(_) => DataType::I8,
            VoxelBuffer::U16(_) => DataType::U16,
            VoxelBuffer::I16(_) => DataType::I16,
            VoxelBuffer::U32(_) => DataType::U32,
            VoxelBuffer::I32(_) => DataType::I32,
            VoxelBuffer::F32(_) => DataType::F32,
            VoxelBuffer::F64(_) => DataType::F64,
        }
    }

    /// Number of voxels stored.
    pub fn len(&self) -> usize {
        dispatch!(self, v => v.len())
    }

    /// Whether the buffer holds no voxels.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `index` widened to `f64`.
    #[inline]
    pub fn get_f64(&self, index: usize) -> Option<f64> {
        dispatch!(self, v => v.get(index).map(|x| x.to_f64()))
    }

    /// Store `value` at `index`, narrowing to the buffer type.
    #[inline]
    pub fn set_f64(&mut self, index: usize, value: f64) -> Option<()> {
        dispatch!(self, v => v.get_mut(index).map(|x| *x = Voxel::from_f64(value)))
    }

    fn decode<T: Voxel>(bytes: &[u8]) -> VoxelBuffer {
        let data = bytes
            .chunks_exact(std::mem::size_of::<T>())
            .map(T::from_le_bytes)
            .collect();
        T::into_buffer(data)
    }

    /// Decode a little-endian byte buffer.
    fn from_le_bytes(datatype: DataType, bytes: &[u8]) -> Self {
        match datatype {
            DataType::U8 => Self::decode::<u8>(bytes),
            DataType::I8 => Self::decode::<i8>(bytes),
            DataType::U16 => Self::decode::<u16>(bytes),
            DataType::I16 => Self::decode::<i16>(bytes),
            DataType::U32 => Self::decode::<u32>(bytes),
            DataType::I32 => Self::decode::<i32>(bytes),
            DataType::F32 => Self::decode::<f32>(bytes),
            DataType::F64 => Self::decode::<f64>(bytes),
        }
    }
}

/// A 2D or 3D scalar image with its voxel-to-world geometry.
///
/// The voxel values keep the element type they were created with; numerical
/// kernels read them widened to `f64` through [`VolumetricImage::get_f64`] or
/// [`VolumetricImage::to_f64_vec`].
///
/// # Examples
///
/// ```
/// use glam::DVec3;
/// use nreg_image::{ImageGeometry, VolumeSize, VolumetricImage};
///
/// let geometry = ImageGeometry::new(VolumeSize::from([4, 3, 2]), DVec3::ONE).unwrap();
/// let image = VolumetricImage::from_vec(geometry, (0..24).map(|v| v as i16).collect()).unwrap();
///
/// assert_eq!(image.get_f64(1, 2, 1), Some(21.0));
/// assert_eq!(image.as_slice::<i16>().unwrap().len(), 24);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct VolumetricImage {
    geometry: ImageGeometry,
    data: VoxelBuffer,
}

impl VolumetricImage {
    /// Create an image from a geometry and a typed buffer.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::InvalidDataLength`] if the buffer does not hold
    /// exactly one value per voxel.
    pub fn new(geometry: ImageGeometry, data: VoxelBuffer) -> Result<Self, ImageError> {
        let expected = geometry.size.voxel_count();
        if data.len() != expected {
            return Err(ImageError::InvalidDataLength(data.len(), expected));
        }
        Ok(Self { geometry, data })
    }

    /// Create an image from a vector of voxels of any supported element type.
    pub fn from_vec<T: Voxel>(geometry: ImageGeometry, data: Vec<T>) -> Result<Self, ImageError> {
        Self::new(geometry, T::into_buffer(data))
    }

    /// Create an image filled with a constant value.
    pub fn from_size_val<T: Voxel>(geometry: ImageGeometry, val: T) -> Result<Self, ImageError> {
        let data = vec![val; geometry.size.voxel_count()];
        Self::from_vec(geometry, data)
    }

    /// Create an image from raw little-endian bytes tagged with a NIfTI datatype code.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::UnsupportedDataType`] for unknown codes and
    /// [`ImageError::InvalidByteLength`] if the byte count does not match the
    /// geometry.
    pub fn from_raw_bytes(
        geometry: ImageGeometry,
        datatype_code: i16,
        bytes: &[u8],
    ) -> Result<Self, ImageError> {
        let datatype = DataType::from_nifti_code(datatype_code)?;
        let expected = geometry.size.voxel_count() * datatype.size_of();
        if bytes.len() != expected {
            return Err(ImageError::InvalidByteLength(bytes.len(), expected));
        }
        Self::new(geometry, VoxelBuffer::from_le_bytes(datatype, bytes))
    }

    /// The voxel-to-world geometry.
    #[inline]
    pub fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }

    /// The size in voxels.
    #[inline]
    pub fn size(&self) -> VolumeSize {
        self.geometry.size
    }

    /// The datatype of the stored voxels.
    #[inline]
    pub fn datatype(&self) -> DataType {
        self.data.datatype()
    }

    /// The underlying typed buffer.
    #[inline]
    pub fn buffer(&self) -> &VoxelBuffer {
        &self.data
    }

    /// Value of voxel `(x, y, z)` widened to `f64`, or `None` out of bounds.
    #[inline]
    pub fn get_f64(&self, x: usize, y: usize, z: usize) -> Option<f64> {
        let size = self.geometry.size;
        if x >= size.nx || y >= size.ny || z >= size.nz {
            return None;
        }
        self.data.get_f64(size.index(x, y, z))
    }

    /// Value at a linear voxel index widened to `f64`.
    #[inline]
    pub fn get_index_f64(&self, index: usize) -> Option<f64> {
        self.data.get_f64(index)
    }

    /// Store a value at voxel `(x, y, z)`, narrowing to the image datatype.
    ///
    /// Returns `None` if the voxel is out of bounds.
    pub fn set_f64(&mut self, x: usize, y: usize, z: usize, value: f64) -> Option<()> {
        let size = self.geometry.size;
        if x >= size.nx || y >= size.ny || z >= size.nz {
            return None;
        }
        self.data.set_f64(size.index(x, y, z), value)
    }

    /// All voxel values widened to `f64`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        dispatch!(&self.data, v => v.iter().map(|x| x.to_f64()).collect())
    }

    /// Borrow the voxels as a typed slice.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::DataTypeMismatch`] if `T` is not the stored type.
    pub fn as_slice<T: Voxel>(&self) -> Result<&[T], ImageError> {
        T::slice(&self.data).ok_or(ImageError::DataTypeMismatch {
            expected: T::DATA_TYPE,
            found: self.data.datatype(),
        })
    }

    /// Mutably borrow the voxels as a typed slice.
    pub fn as_slice_mut<T: Voxel>(&mut self) -> Result<&mut [T], ImageError> {
        let found = self.data.datatype();
        T::slice_mut(&mut self.data).ok_or(ImageError::DataTypeMismatch {
            expected: T::DATA_TYPE,
            found,
        })
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use super::*;

    fn geometry(nx: usize, ny: usize, nz: usize) -> ImageGeometry {
        ImageGeometry {
            size: VolumeSize { nx, ny, nz },
            spacing: DVec3::ONE,
            qform: glam::DMat4::IDENTITY,
            qform_code: 1,
            sform: glam::DMat4::IDENTITY,
            sform_code: 0,
        }
    }

    #[test]
    fn test_invalid_length() {
        let res = VolumetricImage::from_vec(geometry(2, 2, 2), vec![0u8; 7]);
        assert_eq!(res, Err(ImageError::InvalidDataLength(7, 8)));
    }

    #[test]
    fn test_from_raw_bytes() -> Result<(), ImageError> {
        let values = [1.5f32, -2.0, 0.0, 8.25];
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let image = VolumetricImage::from_raw_bytes(geometry(2, 2, 1), 16, &bytes)?;
        assert_eq!(image.datatype(), DataType::F32);
        assert_eq!(image.as_slice::<f32>()?, &values);
        assert_eq!(image.get_f64(1, 1, 0), Some(8.25));

        let res = VolumetricImage::from_raw_bytes(geometry(2, 2, 1), 16, &bytes[..15]);
        assert_eq!(res, Err(ImageError::InvalidByteLength(15, 16)));

        let res = VolumetricImage::from_raw_bytes(geometry(2, 2, 1), 32, &bytes);
        assert_eq!(res, Err(ImageError::UnsupportedDataType(32)));
        Ok(())
    }

    #[test]
    fn test_typed_access_mismatch() -> Result<(), ImageError> {
        let mut image = VolumetricImage::from_size_val(geometry(3, 1, 1), 7u16)?;
        assert_eq!(
            image.as_slice::<f64>(),
            Err(ImageError::DataTypeMismatch {
                expected: DataType::F64,
                found: DataType::U16,
            })
        );
        image.as_slice_mut::<u16>()?[2] = 9;
        assert_eq!(image.to_f64_vec(), vec![7.0, 7.0, 9.0]);
        Ok(())
    }

    #[test]
    fn test_set_f64_narrows() -> Result<(), ImageError> {
        let mut image = VolumetricImage::from_size_val(geometry(2, 2, 2), 0i8)?;
        assert_eq!(image.set_f64(1, 0, 1, -3.7), Some(()));
        assert_eq!(image.set_f64(2, 0, 0, 1.0), None);
        assert_eq!(image.get_f64(1, 0, 1), Some(-3.0));
        assert_eq!(image.get_index_f64(5), Some(-3.0));
        assert_eq!(image.get_f64(0, 2, 0), None);
        Ok(())
    }
}
