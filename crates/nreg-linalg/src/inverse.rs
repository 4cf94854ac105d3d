use crate::{dense::DenseMatrix, error::LinalgError};

/// Invert a square matrix in place with Crout's method, without pivoting.
///
/// The factorization keeps `L` (with its diagonal) and a unit-diagonal `U` in
/// the input storage, inverts both triangles and multiplies them back. The
/// caller is responsible for passing a well conditioned matrix: there is no
/// row interchange, so a zero leading minor makes the result non-finite.
///
/// # Errors
///
/// * [`LinalgError::NotSquare`] if the matrix is not square.
/// * [`LinalgError::SingularMatrix`] if the inverse is not finite.
pub fn matrix_inverse_in_place(a: &mut DenseMatrix) -> Result<(), LinalgError> {
    if !a.is_square() {
        return Err(LinalgError::NotSquare(a.rows(), a.cols()));
    }
    let n = a.rows();
    if n == 0 {
        return Err(LinalgError::EmptyMatrix);
    }

    // normalize row 0
    for i in 1..n {
        a[(0, i)] /= a[(0, 0)];
    }
    for i in 1..n {
        // a column of L
        for j in i..n {
            let sum: f64 = (0..i).map(|k| a[(j, k)] * a[(k, i)]).sum();
            a[(j, i)] -= sum;
        }
        if i == n - 1 {
            continue;
        }
        // a row of U
        for j in i + 1..n {
            let sum: f64 = (0..i).map(|k| a[(i, k)] * a[(k, j)]).sum();
            a[(i, j)] = (a[(i, j)] - sum) / a[(i, i)];
        }
    }

    // invert L
    for i in 0..n {
        for j in i..n {
            let x = if i == j {
                1.0
            } else {
                -(i..j).map(|k| a[(j, k)] * a[(k, i)]).sum::<f64>()
            };
            a[(j, i)] = x / a[(j, j)];
        }
    }

    // invert U
    for i in 0..n {
        for j in i + 1..n {
            let sum: f64 = (i..j)
                .map(|k| a[(k, j)] * if i == k { 1.0 } else { a[(i, k)] })
                .sum();
            a[(i, j)] = -sum;
        }
    }

    // inverse = U^-1 * L^-1
    for i in 0..n {
        for j in 0..n {
            let sum: f64 = (i.max(j)..n)
                .map(|k| (if j == k { 1.0 } else { a[(j, k)] }) * a[(k, i)])
                .sum();
            a[(j, i)] = sum;
        }
    }

    if a.is_finite() {
        Ok(())
    } else {
        Err(LinalgError::SingularMatrix("non-finite Crout inverse"))
    }
}

/// Inverted copy of a square matrix, see [`matrix_inverse_in_place`].
pub fn matrix_inverse(a: &DenseMatrix) -> Result<DenseMatrix, LinalgError> {
    let mut out = a.clone();
    matrix_inverse_in_place(&mut out)?;
    Ok(out)
}
