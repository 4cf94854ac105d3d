use nreg_image::{ImageError, ParallelError, VolumeSize};
use nreg_linalg::LinalgError;

/// An error type for block matching.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum BlockMatchingError {
    /// The reference and floating images have different dimensions.
    #[error("Reference size {0} does not match floating size {1}")]
    DimensionMismatch(VolumeSize, VolumeSize),

    /// The mask does not cover the reference image.
    #[error("Mask size {0} does not match reference size {1}")]
    MaskSizeMismatch(VolumeSize, VolumeSize),

    /// The state was initialised on an image of a different size.
    #[error("Block matching state was initialised for size {0}, got {1}")]
    StateSizeMismatch(VolumeSize, VolumeSize),

    /// A configuration value is out of range.
    #[error("Invalid block matching configuration: {0}")]
    InvalidConfig(&'static str),

    /// Error from the image layer.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// Error from the parallel executor.
    #[error(transparent)]
    Parallel(#[from] ParallelError),
}

/// An error type for transformation estimation.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum EstimationError {
    /// Fewer point pairs than the transformation needs.
    #[error("At least {required} correspondences are required, got {found}")]
    InsufficientCorrespondences {
        /// Minimum number of pairs for the transformation kind.
        required: usize,
        /// Number of pairs supplied or kept.
        found: usize,
    },

    /// Target and result arrays have different lengths.
    #[error("Target count ({0}) does not match result count ({1})")]
    LengthMismatch(usize, usize),

    /// The percentage of points to keep is out of range.
    #[error("Percentage to keep must be in 1..=100, got {0}")]
    InvalidPercent(usize),

    /// Error from the linear algebra kernels.
    #[error(transparent)]
    Linalg(#[from] LinalgError),
}
