#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Cubic B-spline basis functions and patch contractions.
pub mod basis;

/// Jacobian penalty parameters.
pub mod config;

/// Dense deformation fields sampled from a lattice.
pub mod deformation;

/// Error types for the spline Jacobian engine.
pub mod error;

/// Correction of folded transformations.
pub mod folding;

/// Analytic gradient of the Jacobian penalty.
pub mod gradient;

/// Control-point lattices.
pub mod grid;

/// Jacobian matrices and determinants of spline transformations.
pub mod jacobian;

/// Jacobian determinant penalty.
pub mod penalty;

/// Exponentiation of stationary velocity fields.
pub mod velocity;

pub use crate::basis::{
    bspline_basis, bspline_basis_first, bspline_basis_second, bspline_basis_values,
    contract_plane, contract_tensor, contract_tensor_fast, AxisBasis,
};
pub use crate::config::{JacobianConfig, PenaltyKind};
pub use crate::deformation::DeformationField;
pub use crate::error::SplineError;
pub use crate::folding::correct_folding;
pub use crate::gradient::jacobian_penalty_gradient;
pub use crate::grid::ControlPointGrid;
pub use crate::jacobian::{
    determinants_from_matrices, jacobian_determinant_map, jacobian_field, jacobian_matrices_full,
    JacobianField,
};
pub use crate::penalty::{is_folded, jacobian_penalty};
pub use crate::velocity::{
    velocity_jacobian_determinants, velocity_jacobian_matrices, VelocityGrid, MAX_SQUARING_STEPS,
};
