//! Singular value decomposition of arbitrary `m x n` matrices.
//!
//! Householder bidiagonalization followed by implicit-shift QR iterations on
//! the bidiagonal form (Golub-Kahan-Reinsch).

use crate::{dense::DenseMatrix, error::LinalgError};

/// Maximum number of QR sweeps spent on a single singular value.
pub const SVD_MAX_SWEEPS: usize = 30;

/// Singular values below this threshold are treated as zero by [`Svd::pseudo_inverse`].
pub const SVD_THRESHOLD: f64 = 1e-4;

/// Output of [`svd_in_place`]: the left singular vectors are left in the input matrix.
#[derive(Debug, Clone)]
pub struct SvdResult {
    /// Singular values, sorted in descending order.
    pub w: Vec<f64>,
    /// Right singular vectors as columns (`n x n`).
    pub v: DenseMatrix,
    /// False when a singular value did not converge within [`SVD_MAX_SWEEPS`].
    pub converged: bool,
}

/// A complete singular value decomposition `A = U * diag(w) * V^T`.
#[derive(Debug, Clone)]
pub struct Svd {
    /// Left singular vectors as columns (`m x n`).
    pub u: DenseMatrix,
    /// Singular values, sorted in descending order.
    pub w: Vec<f64>,
    /// Right singular vectors as columns (`n x n`).
    pub v: DenseMatrix,
    /// False when the QR iteration hit its sweep cap.
    pub converged: bool,
}

impl Svd {
    /// Decompose a copy of `a`.
    pub fn new(a: &DenseMatrix) -> Result<Self, LinalgError> {
        let mut u = a.clone();
        let SvdResult { w, v, converged } = svd_in_place(&mut u)?;
        Ok(Self { u, w, v, converged })
    }

    /// Rebuild `U * diag(w) * V^T`.
    pub fn reconstruct(&self) -> DenseMatrix {
        let scaled = self.u.scale_columns(&self.w);
        DenseMatrix::from_faer(scaled.as_faer() * self.v.as_faer().transpose())
    }

    /// Moore-Penrose pseudo-inverse `V * diag(1/w) * U^T` (`n x m`).
    ///
    /// Singular values below `threshold` contribute zero, which regularizes
    /// near-degenerate systems such as coplanar point sets.
    pub fn pseudo_inverse(&self, threshold: f64) -> DenseMatrix {
        let inv_w: Vec<f64> = self
            .w
            .iter()
            .map(|&w| if w < threshold { 0.0 } else { 1.0 / w })
            .collect();
        let scaled = self.v.scale_columns(&inv_w);
        DenseMatrix::from_faer(scaled.as_faer() * self.u.as_faer().transpose())
    }
}

#[inline]
fn sign(a: f64, b: f64) -> f64 {
    if b >= 0.0 {
        a.abs()
    } else {
        -a.abs()
    }
}

// sqrt(a^2 + b^2) without destructive underflow or overflow
#[inline]
fn pythag(a: f64, b: f64) -> f64 {
    let (absa, absb) = (a.abs(), b.abs());
    if absa > absb {
        absa * (1.0 + (absb / absa).powi(2)).sqrt()
    } else if absb == 0.0 {
        0.0
    } else {
        absb * (1.0 + (absa / absb).powi(2)).sqrt()
    }
}

/// Compute the singular value decomposition of `a` in place.
///
/// On return `a` holds the left singular vectors `U`. The singular values are
/// sorted in descending order and the columns of `U` and `V` permuted to match.
///
/// Non-convergence is not an error: the best-effort decomposition is returned
/// with [`SvdResult::converged`] set to false and a warning is logged.
///
/// # Errors
///
/// Returns [`LinalgError::EmptyMatrix`] if `a` has no rows or no columns.
pub fn svd_in_place(a: &mut DenseMatrix) -> Result<SvdResult, LinalgError> {
    let (m, n) = (a.rows(), a.cols());
    if m == 0 || n == 0 {
        return Err(LinalgError::EmptyMatrix);
    }

    let mut w = vec![0.0; n];
    let mut v = DenseMatrix::zeros(n, n);
    let mut rv1 = vec![0.0; n];

    // Householder reduction to bidiagonal form.
    let (mut g, mut scale, mut anorm) = (0.0f64, 0.0f64, 0.0f64);
    let mut l = 0;
    for i in 0..n {
        l = i + 1;
        rv1[i] = scale * g;
        g = 0.0;
        scale = 0.0;
        let mut s = 0.0;
        if i < m {
            for k in i..m {
                scale += a[(k, i)].abs();
            }
            if scale != 0.0 {
                for k in i..m {
                    a[(k, i)] /= scale;
                    s += a[(k, i)] * a[(k, i)];
                }
                let f = a[(i, i)];
                g = -sign(s.sqrt(), f);
                let h = f * g - s;
                a[(i, i)] = f - g;
                for j in l..n {
                    let s: f64 = (i..m).map(|k| a[(k, i)] * a[(k, j)]).sum();
                    let f = s / h;
                    for k in i..m {
                        a[(k, j)] += f * a[(k, i)];
                    }
                }
                for k in i..m {
                    a[(k, i)] *= scale;
                }
            }
        }
        w[i] = scale * g;
        g = 0.0;
        scale = 0.0;
        s = 0.0;
        if i < m && i != n - 1 {
            for k in l..n {
                scale += a[(i, k)].abs();
            }
            if scale != 0.0 {
                for k in l..n {
                    a[(i, k)] /= scale;
                    s += a[(i, k)] * a[(i, k)];
                }
                let f = a[(i, l)];
                g = -sign(s.sqrt(), f);
                let h = f * g - s;
                a[(i, l)] = f - g;
                for k in l..n {
                    rv1[k] = a[(i, k)] / h;
                }
                for j in l..m {
                    let s: f64 = (l..n).map(|k| a[(j, k)] * a[(i, k)]).sum();
                    for k in l..n {
                        a[(j, k)] += s * rv1[k];
                    }
                }
                for k in l..n {
                    a[(i, k)] *= scale;
                }
            }
        }
        anorm = anorm.max(w[i].abs() + rv1[i].abs());
    }

    // Accumulation of right-hand transformations.
    for i in (0..n).rev() {
        if i < n - 1 {
            if g != 0.0 {
                for j in l..n {
                    // double division avoids possible underflow
                    v[(j, i)] = (a[(i, j)] / a[(i, l)]) / g;
                }
                for j in l..n {
                    let s: f64 = (l..n).map(|k| a[(i, k)] * v[(k, j)]).sum();
                    for k in l..n {
                        v[(k, j)] += s * v[(k, i)];
                    }
                }
            }
            for j in l..n {
                v[(i, j)] = 0.0;
                v[(j, i)] = 0.0;
            }
        }
        v[(i, i)] = 1.0;
        g = rv1[i];
        l = i;
    }

    // Accumulation of left-hand transformations.
    for i in (0..m.min(n)).rev() {
        let l = i + 1;
        let mut g = w[i];
        for j in l..n {
            a[(i, j)] = 0.0;
        }
        if g != 0.0 {
            g = 1.0 / g;
            for j in l..n {
                let s: f64 = (l..m).map(|k| a[(k, i)] * a[(k, j)]).sum();
                let f = (s / a[(i, i)]) * g;
                for k in i..m {
                    a[(k, j)] += f * a[(k, i)];
                }
            }
            for j in i..m {
                a[(j, i)] *= g;
            }
        } else {
            for j in i..m {
                a[(j, i)] = 0.0;
            }
        }
        a[(i, i)] += 1.0;
    }

    // Diagonalization of the bidiagonal form.
    let mut converged = true;
    for k in (0..n).rev() {
        let mut k_converged = false;
        for _ in 0..SVD_MAX_SWEEPS {
            // test for splitting, rv1[0] is always zero
            let mut flag = true;
            let mut l = k;
            loop {
                if l == 0 || rv1[l].abs() + anorm == anorm {
                    flag = false;
                    break;
                }
                if w[l - 1].abs() + anorm == anorm {
                    break;
                }
                l -= 1;
            }
            if flag {
                // cancellation of rv1[l] if l > 0
                let nm = l - 1;
                let (mut c, mut s) = (0.0, 1.0);
                for i in l..=k {
                    let f = s * rv1[i];
                    rv1[i] *= c;
                    if f.abs() + anorm == anorm {
                        break;
                    }
                    let g = w[i];
                    let mut h = pythag(f, g);
                    w[i] = h;
                    h = 1.0 / h;
                    c = g * h;
                    s = -f * h;
                    for j in 0..m {
                        let y = a[(j, nm)];
                        let z = a[(j, i)];
                        a[(j, nm)] = y * c + z * s;
                        a[(j, i)] = z * c - y * s;
                    }
                }
            }
            let z = w[k];
            if l == k {
                // convergence, make the singular value non-negative
                if z < 0.0 {
                    w[k] = -z;
                    for j in 0..n {
                        v[(j, k)] = -v[(j, k)];
                    }
                }
                k_converged = true;
                break;
            }

            // shift from the bottom 2x2 minor
            let mut x = w[l];
            let nm = k - 1;
            let mut y = w[nm];
            let mut g = rv1[nm];
            let mut h = rv1[k];
            let mut f = ((y - z) * (y + z) + (g - h) * (g + h)) / (2.0 * h * y);
            g = pythag(f, 1.0);
            f = ((x - z) * (x + z) + h * ((y / (f + sign(g, f))) - h)) / x;

            // next QR transformation
            let (mut c, mut s) = (1.0, 1.0);
            for j in l..=nm {
                let i = j + 1;
                g = rv1[i];
                y = w[i];
                h = s * g;
                g *= c;
                let mut z = pythag(f, h);
                rv1[j] = z;
                c = f / z;
                s = h / z;
                f = x * c + g * s;
                g = g * c - x * s;
                h = y * s;
                y *= c;
                for jj in 0..n {
                    let x = v[(jj, j)];
                    let z = v[(jj, i)];
                    v[(jj, j)] = x * c + z * s;
                    v[(jj, i)] = z * c - x * s;
                }
                z = pythag(f, h);
                w[j] = z;
                if z != 0.0 {
                    z = 1.0 / z;
                    c = f * z;
                    s = h * z;
                }
                f = c * g + s * y;
                x = c * y - s * g;
                for jj in 0..m {
                    let y = a[(jj, j)];
                    let z = a[(jj, i)];
                    a[(jj, j)] = y * c + z * s;
                    a[(jj, i)] = z * c - y * s;
                }
            }
            rv1[l] = 0.0;
            rv1[k] = f;
            w[k] = x;
        }
        if !k_converged {
            converged = false;
        }
    }

    if !converged {
        log::warn!(
            "svd: no convergence after {} sweeps on a {}x{} matrix, returning best effort",
            SVD_MAX_SWEEPS,
            m,
            n
        );
    }

    sort_descending(a, &mut w, &mut v);

    Ok(SvdResult { w, v, converged })
}

/// Sort the singular values in descending order, permuting the columns of `u` and `v`.
fn sort_descending(u: &mut DenseMatrix, w: &mut [f64], v: &mut DenseMatrix) {
    let mut order: Vec<usize> = (0..w.len()).collect();
    // stable sort keeps equal singular values in their original order
    order.sort_by(|&a, &b| w[b].total_cmp(&w[a]));
    if order.iter().enumerate().all(|(i, &o)| i == o) {
        return;
    }

    let u_src = u.clone();
    let v_src = v.clone();
    let w_src = w.to_vec();
    for (dst, &src) in order.iter().enumerate() {
        w[dst] = w_src[src];
        for r in 0..u.rows() {
            u[(r, dst)] = u_src[(r, src)];
        }
        for r in 0..v.rows() {
            v[(r, dst)] = v_src[(r, src)];
        }
    }
}
