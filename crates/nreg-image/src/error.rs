use crate::datatype::DataType;

/// An error type for the image module.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ImageError {
    /// The NIfTI datatype code has no supported voxel storage.
    #[error("Unsupported voxel datatype code {0}")]
    UnsupportedDataType(i16),

    /// A typed access used a different element type than the image stores.
    #[error("Voxel datatype mismatch: image stores {found:?}, access requested {expected:?}")]
    DataTypeMismatch {
        /// The datatype requested by the caller.
        expected: DataType,
        /// The datatype stored in the image.
        found: DataType,
    },

    /// The number of voxels does not match the image size.
    #[error("Data length ({0}) does not match the image size ({1})")]
    InvalidDataLength(usize, usize),

    /// The byte buffer length does not match the image size and datatype.
    #[error("Byte length ({0}) does not match the expected length ({1})")]
    InvalidByteLength(usize, usize),

    /// Every dimension of a volume must be at least one voxel.
    #[error("Volume dimensions must be non-zero, got {0}")]
    EmptyVolume(crate::geometry::VolumeSize),

    /// The voxel-to-world transformation cannot be inverted or decomposed.
    #[error(transparent)]
    Geometry(#[from] nreg_linalg::LinalgError),
}
