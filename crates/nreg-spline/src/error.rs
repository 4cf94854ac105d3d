use nreg_image::{ImageError, ParallelError, VolumeSize};
use nreg_linalg::LinalgError;

/// An error type for the spline Jacobian engine.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum SplineError {
    /// The control-point lattice is too small for cubic B-spline support.
    #[error("Control point grid {0} needs at least 4 points along each axis")]
    GridTooSmall(VolumeSize),

    /// A deformation field needs two voxels along each axis for finite differences.
    #[error("Deformation field {0} needs at least 2 voxels along each axis")]
    FieldTooSmall(VolumeSize),

    /// The number of positions does not match the lattice size.
    #[error("Expected {expected} positions, got {found}")]
    PositionCount {
        /// Number of points of the lattice.
        expected: usize,
        /// Number of positions supplied.
        found: usize,
    },

    /// The gradient buffer does not have one entry per control point.
    #[error("Gradient holds {found} entries but the grid has {expected} control points")]
    GradientLength {
        /// Number of control points.
        expected: usize,
        /// Length of the gradient buffer.
        found: usize,
    },

    /// A 2D grid was used with a 3D reference or the reverse.
    #[error("Grid and reference dimensionality differ (grid 2D: {grid_2d}, reference 2D: {reference_2d})")]
    DimensionalityMismatch {
        /// Whether the grid is single-slice.
        grid_2d: bool,
        /// Whether the reference is single-slice.
        reference_2d: bool,
    },

    /// Control-point spacing must be strictly positive.
    #[error("Control point spacing must be positive, got {0}")]
    InvalidSpacing(glam::DVec3),

    /// The number of squaring steps exceeds [`crate::velocity::MAX_SQUARING_STEPS`].
    #[error("{0} squaring steps requested, at most {max} are supported", max = crate::velocity::MAX_SQUARING_STEPS)]
    TooManySquaringSteps(i32),

    /// Error from the image layer.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// Error from the linear algebra kernels.
    #[error(transparent)]
    Linalg(#[from] LinalgError),

    /// Error from the parallel executor.
    #[error(transparent)]
    Parallel(#[from] ParallelError),
}
