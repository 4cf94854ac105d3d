#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Voxel datatypes and their NIfTI codes.
pub mod datatype;

/// Error types for the image module.
pub mod error;

/// Volume size and voxel-to-world geometry.
pub mod geometry;

/// Volumetric image and its typed voxel buffer.
pub mod image;

/// Voxel inclusion masks.
pub mod mask;

/// Execution strategies for data-parallel loops.
pub mod parallel;

pub use crate::datatype::{DataType, Voxel};
pub use crate::error::ImageError;
pub use crate::geometry::{ImageGeometry, VolumeSize};
pub use crate::image::{VolumetricImage, VoxelBuffer};
pub use crate::mask::Mask;
pub use crate::parallel::{ExecutionStrategy, ParallelError};
