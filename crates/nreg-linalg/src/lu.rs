use crate::{dense::DenseMatrix, error::LinalgError};

/// Row interchanges recorded by [`lu_decompose`]: entry `j` is the row swapped with row `j`.
pub type LuPermutation = Vec<usize>;

/// Replacement for an exactly zero pivot, keeps the substitution finite.
const TINY_PIVOT: f64 = 1.0e-20;

/// In-place LU decomposition with scaled partial pivoting (Crout's method).
///
/// On return `a` holds `L` below the diagonal (unit diagonal implied) and `U`
/// on and above it, for a row-permuted version of the input.
///
/// # Errors
///
/// * [`LinalgError::NotSquare`] if `a` is not square.
/// * [`LinalgError::SingularMatrix`] if a row is entirely zero.
pub fn lu_decompose(a: &mut DenseMatrix) -> Result<LuPermutation, LinalgError> {
    if !a.is_square() {
        return Err(LinalgError::NotSquare(a.rows(), a.cols()));
    }
    let dim = a.rows();

    // implicit scaling of each row
    let mut scaling = Vec::with_capacity(dim);
    for i in 0..dim {
        let big = a.row_max_abs(i);
        if big == 0.0 {
            return Err(LinalgError::SingularMatrix("zero row in LU decomposition"));
        }
        scaling.push(1.0 / big);
    }

    let mut permutation = vec![0; dim];
    for j in 0..dim {
        for i in 0..j {
            let mut sum = a[(i, j)];
            for k in 0..i {
                sum -= a[(i, k)] * a[(k, j)];
            }
            a[(i, j)] = sum;
        }

        let mut big = 0.0;
        let mut imax = j;
        for i in j..dim {
            let mut sum = a[(i, j)];
            for k in 0..j {
                sum -= a[(i, k)] * a[(k, j)];
            }
            a[(i, j)] = sum;
            let dum = scaling[i] * sum.abs();
            if dum >= big {
                big = dum;
                imax = i;
            }
        }

        if j != imax {
            for k in 0..dim {
                let dum = a[(imax, k)];
                a[(imax, k)] = a[(j, k)];
                a[(j, k)] = dum;
            }
            scaling[imax] = scaling[j];
        }
        permutation[j] = imax;

        if a[(j, j)] == 0.0 {
            a[(j, j)] = TINY_PIVOT;
        }
        if j != dim - 1 {
            let dum = 1.0 / a[(j, j)];
            for i in j + 1..dim {
                a[(i, j)] *= dum;
            }
        }
    }

    Ok(permutation)
}

/// Solve `A x = b` in place given the output of [`lu_decompose`].
///
/// # Errors
///
/// Returns [`LinalgError::DimensionMismatch`] if the sizes disagree.
pub fn lu_solve(
    lu: &DenseMatrix,
    permutation: &[usize],
    b: &mut [f64],
) -> Result<(), LinalgError> {
    let dim = lu.rows();
    if b.len() != dim || permutation.len() != dim {
        return Err(LinalgError::DimensionMismatch(dim, b.len()));
    }

    // forward substitution, skipping the leading zeros of b
    let mut first_nonzero: Option<usize> = None;
    for i in 0..dim {
        let ip = permutation[i];
        let mut sum = b[ip];
        b[ip] = b[i];
        if let Some(start) = first_nonzero {
            for j in start..i {
                sum -= lu[(i, j)] * b[j];
            }
        } else if sum != 0.0 {
            first_nonzero = Some(i);
        }
        b[i] = sum;
    }

    // back substitution
    for i in (0..dim).rev() {
        let mut sum = b[i];
        for j in i + 1..dim {
            sum -= lu[(i, j)] * b[j];
        }
        b[i] = sum / lu[(i, i)];
    }
    Ok(())
}

/// Solve `A x = b`, overwriting `a` with its LU factors and `b` with the solution.
pub fn matrix_invert_multiply(a: &mut DenseMatrix, b: &mut [f64]) -> Result<(), LinalgError> {
    let permutation = lu_decompose(a)?;
    lu_solve(a, &permutation, b)
}
