/// An error type for the linear algebra kernels.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum LinalgError {
    /// The matrix is singular and cannot be decomposed or inverted.
    #[error("Matrix is singular ({0})")]
    SingularMatrix(&'static str),

    /// The matrix must be square for this operation.
    #[error("Matrix must be square, got {0}x{1}")]
    NotSquare(usize, usize),

    /// The matrix shape does not match the data or the other operand.
    #[error("Dimension mismatch: expected {0}, got {1}")]
    DimensionMismatch(usize, usize),

    /// The matrix has no rows or no columns.
    #[error("Matrix must not be empty")]
    EmptyMatrix,
}
