use crate::{error::ImageError, image::VoxelBuffer};

/// Voxel datatypes supported by the registration core.
///
/// The discriminants are the NIfTI-1 datatype codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum DataType {
    /// Unsigned 8-bit integer.
    U8 = 2,
    /// Signed 8-bit integer.
    I8 = 256,
    /// Unsigned 16-bit integer.
    U16 = 512,
    /// Signed 16-bit integer.
    I16 = 4,
    /// Unsigned 32-bit integer.
    U32 = 768,
    /// Signed 32-bit integer.
    I32 = 8,
    /// 32-bit float.
    F32 = 16,
    /// 64-bit float.
    F64 = 64,
}

impl DataType {
    /// Map a NIfTI datatype code to a supported datatype.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::UnsupportedDataType`] for complex, RGB, 64-bit
    /// integer and any other code without voxel storage.
    ///
    /// # Examples
    ///
    /// ```
    /// use nreg_image::{DataType, ImageError};
    ///
    /// assert_eq!(DataType::from_nifti_code(16), Ok(DataType::F32));
    /// assert_eq!(DataType::from_nifti_code(128), Err(ImageError::UnsupportedDataType(128)));
    /// ```
    pub fn from_nifti_code(code: i16) -> Result<Self, ImageError> {
        match code {
            2 => Ok(DataType::U8),
            256 => Ok(DataType::I8),
            512 => Ok(DataType::U16),
            4 => Ok(DataType::I16),
            768 => Ok(DataType::U32),
            8 => Ok(DataType::I32),
            16 => Ok(DataType::F32),
            64 => Ok(DataType::F64),
            _ => Err(ImageError::UnsupportedDataType(code)),
        }
    }

    /// The NIfTI datatype code.
    #[inline]
    pub fn nifti_code(self) -> i16 {
        self as i16
    }

    /// Size of one voxel in bytes.
    pub fn size_of(self) -> usize {
        match self {
            DataType::U8 | DataType::I8 => 1,
            DataType::U16 | DataType::I16 => 2,
            DataType::U32 | DataType::I32 | DataType::F32 => 4,
            DataType::F64 => 8,
        }
    }

    /// Whether the datatype is a floating point type.
    pub fn is_float(self) -> bool {
        matches!(self, DataType::F32 | DataType::F64)
    }
}

/// Rust element types that can be stored in a [`VoxelBuffer`].
///
/// Conversions from `f64` truncate toward zero and saturate at the bounds of
/// integer types, so writing a computed value into an integer image matches a
/// C-style cast for in-range values.
pub trait Voxel: Copy + Send + Sync + PartialEq + std::fmt::Debug + 'static {
    /// The datatype tag for this element type.
    const DATA_TYPE: DataType;

    /// Wrap a vector in the matching buffer variant.
    fn into_buffer(data: Vec<Self>) -> VoxelBuffer;

    /// Borrow the buffer as a slice of this type, if the tags match.
    fn slice(buffer: &VoxelBuffer) -> Option<&[Self]>;

    /// Mutably borrow the buffer as a slice of this type, if the tags match.
    fn slice_mut(buffer: &mut VoxelBuffer) -> Option<&mut [Self]>;

    /// Decode one little-endian element. `bytes` has exactly `size_of::<Self>()` bytes.
    fn from_le_bytes(bytes: &[u8]) -> Self;

    /// Widen to `f64`.
    fn to_f64(self) -> f64;

    /// Narrow from `f64`.
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_voxel {
    ($t:ty, $variant:ident) => {
        impl Voxel for $t {
            const DATA_TYPE: DataType = DataType::$variant;

            #[inline]
            fn into_buffer(data: Vec<Self>) -> VoxelBuffer {
                VoxelBuffer::$variant(data)
            }

            #[inline]
            fn slice(buffer: &VoxelBuffer) -> Option<&[Self]> {
                match buffer {
                    VoxelBuffer::$variant(v) => Some(v),
                    _ => None,
                }
            }

            #[inline]
            fn slice_mut(buffer: &mut VoxelBuffer) -> Option<&mut [Self]> {
                match buffer {
                    VoxelBuffer::$variant(v) => Some(v),
                    _ => None,
                }
            }

            #[inline]
            fn from_le_bytes(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$t>()];
                raw.copy_from_slice(bytes);
                <$t>::from_le_bytes(raw)
            }

            #[inline]
            fn to_f64(self) -> f64 {
                num_traits::AsPrimitive::<f64>::as_(self)
            }

            #[inline]
            fn from_f64(value: f64) -> Self {
                num_traits::AsPrimitive::<$t>::as_(value)
            }
        }
    };
}

impl_voxel!(u8, U8);
impl_voxel!(i8, I8);
impl_voxel!(u16, U16);
impl_voxel!(i16, I16);
impl_voxel!(u32, U32);
impl_voxel!(i32, I32);
impl_voxel!(f32, F32);
impl_voxel!(f64, F64);
