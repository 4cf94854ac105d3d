use nreg_linalg::{inverse, lu, DenseMatrix, LinalgError, Svd, SVD_THRESHOLD};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn random_well_conditioned(rng: &mut StdRng, n: usize) -> DenseMatrix {
    let mut a = DenseMatrix::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            a[(i, j)] = rng.random_range(-1.0..1.0);
        }
        a[(i, i)] += n as f64;
    }
    a
}

#[test]
fn test_lu_crout_and_svd_agree_on_square_systems() -> Result<(), LinalgError> {
    let mut rng = StdRng::seed_from_u64(42);
    for n in [2, 4, 7, 12] {
        let a = random_well_conditioned(&mut rng, n);
        let b: Vec<f64> = (0..n).map(|_| rng.random_range(-5.0..5.0)).collect();

        let mut x_lu = b.clone();
        let mut factors = a.clone();
        lu::matrix_invert_multiply(&mut factors, &mut x_lu)?;

        let x_crout = inverse::matrix_inverse(&a)?.mul_vec(&b)?;
        let x_svd = Svd::new(&a)?.pseudo_inverse(SVD_THRESHOLD).mul_vec(&b)?;

        for i in 0..n {
            approx::assert_abs_diff_eq!(x_lu[i], x_crout[i], epsilon = 1e-10);
            approx::assert_abs_diff_eq!(x_lu[i], x_svd[i], epsilon = 1e-10);
        }

        let residual = a.mul_vec(&x_lu)?;
        for i in 0..n {
            approx::assert_abs_diff_eq!(residual[i], b[i], epsilon = 1e-10);
        }
    }
    Ok(())
}

#[test]
fn test_svd_in_place_leaves_left_vectors() -> Result<(), LinalgError> {
    let a = DenseMatrix::from_rows(&[[3.0, 1.0], [1.0, 3.0], [0.0, 2.0]]);
    let mut u = a.clone();
    let result = nreg_linalg::svd::svd_in_place(&mut u)?;
    assert!(result.converged);
    let svd = Svd::new(&a)?;
    assert_eq!(svd.u, u);
    assert_eq!(svd.w, result.w);
    Ok(())
}
