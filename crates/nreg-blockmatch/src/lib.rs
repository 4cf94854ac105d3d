#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Block decomposition and active block selection.
pub mod blocks;

/// Block matching and trimmed fit parameters.
pub mod config;

/// Error types for block matching and estimation.
pub mod error;

/// Point-based rigid and affine estimation with trimmed least squares.
pub mod estimator;

/// Normalized cross-correlation block search.
pub mod matching;

pub use crate::blocks::{BlockLayout, BlockMatchingState};
pub use crate::config::{BlockMatchingConfig, TrimmedFitConfig};
pub use crate::error::{BlockMatchingError, EstimationError};
pub use crate::estimator::{
    apply_transform, estimate, estimate_affine, estimate_rigid, optimize, TransformKind, TrimmedFit,
};
pub use crate::matching::{block_matching, CorrespondenceSet};
