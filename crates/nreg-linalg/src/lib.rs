#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Small dense matrix type backed by faer.
pub mod dense;

/// Error types for the linear algebra kernels.
pub mod error;

/// Crout inversion of general square matrices.
pub mod inverse;

/// LU decomposition with scaled partial pivoting.
pub mod lu;

/// 3x3 helpers: cofactor, inverse, polar decomposition.
pub mod mat33;

/// 4x4 helpers: inverse, square root, exponential, logarithm.
pub mod mat44;

/// Singular value decomposition.
pub mod svd;

pub use crate::dense::DenseMatrix;
pub use crate::error::LinalgError;
pub use crate::svd::{Svd, SVD_THRESHOLD};
