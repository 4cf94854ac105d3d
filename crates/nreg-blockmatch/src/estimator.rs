use glam::{DMat3, DMat4, DVec3};
use nreg_linalg::{mat33, mat44, DenseMatrix, Svd, SVD_THRESHOLD};
use serde::{Deserialize, Serialize};

use crate::{config::TrimmedFitConfig, error::EstimationError};

/// Minimum number of pairs for a full affine fit.
pub const MIN_AFFINE_PAIRS: usize = 4;

/// Minimum number of pairs for a rigid fit.
pub const MIN_RIGID_PAIRS: usize = 3;

/// Class of transformation fitted to point pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransformKind {
    /// Rotation and translation.
    Rigid,
    /// Full 12 parameter affine.
    #[default]
    Affine,
}

impl TransformKind {
    /// Minimum number of pairs needed to fit this kind.
    pub fn min_pairs(self) -> usize {
        match self {
            TransformKind::Rigid => MIN_RIGID_PAIRS,
            TransformKind::Affine => MIN_AFFINE_PAIRS,
        }
    }
}

/// Result of the trimmed least-squares fit.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimmedFit {
    /// The fitted transformation, mapping target points onto result points.
    pub transform: DMat4,
    /// The number of trimming iterations performed.
    pub iterations: usize,
    /// Summed squared residual of the pairs kept by the last iteration.
    pub residual: f64,
}

/// Map a point through the affine part of a homogeneous matrix.
#[inline]
pub fn apply_transform(transform: &DMat4, point: DVec3) -> DVec3 {
    mat44::mat44_mul_point(transform, point)
}

fn check_pairs(targets: &[DVec3], results: &[DVec3], required: usize) -> Result<(), EstimationError> {
    if targets.len() != results.len() {
        return Err(EstimationError::LengthMismatch(targets.len(), results.len()));
    }
    if targets.len() < required {
        return Err(EstimationError::InsufficientCorrespondences {
            required,
            found: targets.len(),
        });
    }
    Ok(())
}

/// Least-squares affine transformation mapping `targets` onto `results`.
///
/// Every pair contributes three equations to a `3N x 12` system which is
/// solved through the SVD pseudo-inverse. Singular values below
/// [`SVD_THRESHOLD`] are dropped, which keeps near-degenerate configurations
/// such as coplanar points well defined.
///
/// # Errors
///
/// Returns [`EstimationError::InsufficientCorrespondences`] with fewer than
/// four pairs.
pub fn estimate_affine(targets: &[DVec3], results: &[DVec3]) -> Result<DMat4, EstimationError> {
    check_pairs(targets, results, MIN_AFFINE_PAIRS)?;

    let n = targets.len();
    let mut a = DenseMatrix::zeros(3 * n, 12);
    let mut b = vec![0.0; 3 * n];
    for (k, (t, r)) in targets.iter().zip(results).enumerate() {
        for axis in 0..3 {
            let row = 3 * k + axis;
            a[(row, 3 * axis)] = t.x;
            a[(row, 3 * axis + 1)] = t.y;
            a[(row, 3 * axis + 2)] = t.z;
            a[(row, 9 + axis)] = 1.0;
            b[row] = r[axis];
        }
    }

    let svd = Svd::new(&a)?;
    if !svd.converged {
        log::warn!("affine estimation: SVD did not fully converge");
    }
    let p = svd.pseudo_inverse(SVD_THRESHOLD).mul_vec(&b)?;

    Ok(mat44::mat44_from_rows([
        [p[0], p[1], p[2], p[9]],
        [p[3], p[4], p[5], p[10]],
        [p[6], p[7], p[8], p[11]],
        [0.0, 0.0, 0.0, 1.0],
    ]))
}

/// Least-squares rigid transformation mapping `targets` onto `results`.
///
/// Both point sets are de-meaned and the rotation is recovered from the SVD
/// of their cross-covariance as `V * U^T`. When that product is a reflection
/// the singular vector of the smallest singular value is flipped, so the
/// result is always a proper rotation.
///
/// # Errors
///
/// Returns [`EstimationError::InsufficientCorrespondences`] with fewer than
/// three pairs.
pub fn estimate_rigid(targets: &[DVec3], results: &[DVec3]) -> Result<DMat4, EstimationError> {
    check_pairs(targets, results, MIN_RIGID_PAIRS)?;

    let n = targets.len() as f64;
    let target_centroid = targets.iter().sum::<DVec3>() / n;
    let result_centroid = results.iter().sum::<DVec3>() / n;

    let mut covariance = DenseMatrix::zeros(3, 3);
    for (t, r) in targets.iter().zip(results) {
        let t = *t - target_centroid;
        let r = *r - result_centroid;
        for i in 0..3 {
            for j in 0..3 {
                covariance[(i, j)] += t[i] * r[j];
            }
        }
    }

    let Svd { u, mut v, .. } = Svd::new(&covariance)?;
    let rotation_from = |v: &DenseMatrix| -> DMat3 {
        let mut rows = [[0.0; 3]; 3];
        for (i, row) in rows.iter_mut().enumerate() {
            for (j, value) in row.iter_mut().enumerate() {
                *value = (0..3).map(|k| v[(i, k)] * u[(j, k)]).sum();
            }
        }
        mat33::mat33_from_rows(rows)
    };

    let mut rotation = rotation_from(&v);
    if rotation.determinant() < 0.0 {
        for i in 0..3 {
            v[(i, 2)] = -v[(i, 2)];
        }
        rotation = rotation_from(&v);
    }

    let translation = result_centroid - rotation * target_centroid;
    Ok(mat44::mat44_from_linear_translation(&rotation, translation))
}

/// Fit a transformation of the given kind.
pub fn estimate(
    kind: TransformKind,
    targets: &[DVec3],
    results: &[DVec3],
) -> Result<DMat4, EstimationError> {
    match kind {
        TransformKind::Rigid => estimate_rigid(targets, results),
        TransformKind::Affine => estimate_affine(targets, results),
    }
}

/// Robust fit by iterative trimmed least squares.
///
/// The first fit uses every pair. Each iteration then maps all targets with
/// the current transformation, keeps the `percent_to_keep` percent of pairs
/// with the smallest squared residual (ties resolved by input order) and
/// refits on them. Outlier pairs are thereby progressively excluded.
///
/// The number of iterations is fixed by `config.max_iterations` unless
/// `config.convergence_tolerance` is set, in which case the loop stops as soon
/// as the summed residual of the kept pairs changes by less than the tolerance
/// between two iterations.
///
/// # Arguments
///
/// * `targets` - Points in the reference space.
/// * `results` - Matched points, paired with `targets` by index.
/// * `kind` - The class of transformation to fit.
/// * `config` - The trimming parameters.
///
/// # Errors
///
/// Returns [`EstimationError::InsufficientCorrespondences`] if all the pairs
/// are too few for `kind`, or if at least one trimming iteration runs and the
/// kept subset is too few. With `max_iterations == 0` the fit on every pair
/// is returned as is.
pub fn optimize(
    targets: &[DVec3],
    results: &[DVec3],
    kind: TransformKind,
    config: &TrimmedFitConfig,
) -> Result<TrimmedFit, EstimationError> {
    config.validate()?;
    check_pairs(targets, results, kind.min_pairs())?;

    let num_to_keep = targets.len() * config.percent_to_keep / 100;
    let transform = estimate(kind, targets, results)?;
    let mut fit = TrimmedFit {
        transform,
        iterations: 0,
        residual: residuals(&transform, targets, results).iter().sum(),
    };

    let mut kept_targets = Vec::with_capacity(num_to_keep);
    let mut kept_results = Vec::with_capacity(num_to_keep);
    let mut last_residual: Option<f64> = None;

    for iteration in 0..config.max_iterations {
        if num_to_keep < kind.min_pairs() {
            return Err(EstimationError::InsufficientCorrespondences {
                required: kind.min_pairs(),
                found: num_to_keep,
            });
        }
        let distances = residuals(&fit.transform, targets, results);
        let mut order: Vec<usize> = (0..targets.len()).collect();
        order.sort_by(|&a, &b| distances[a].total_cmp(&distances[b]).then(a.cmp(&b)));
        order.truncate(num_to_keep);

        let residual: f64 = order.iter().map(|&i| distances[i]).sum();
        log::debug!("trimmed fit iteration {}: residual {}", iteration, residual);

        if let (Some(tolerance), Some(last)) = (config.convergence_tolerance, last_residual) {
            if (residual - last).abs() < tolerance {
                fit.residual = residual;
                break;
            }
        }
        last_residual = Some(residual);

        kept_targets.clear();
        kept_results.clear();
        kept_targets.extend(order.iter().map(|&i| targets[i]));
        kept_results.extend(order.iter().map(|&i| results[i]));

        fit.transform = estimate(kind, &kept_targets, &kept_results)?;
        fit.iterations = iteration + 1;
        fit.residual = residual;
    }

    Ok(fit)
}

/// Squared distance between each transformed target and its result.
fn residuals(transform: &DMat4, targets: &[DVec3], results: &[DVec3]) -> Vec<f64> {
    targets
        .iter()
        .zip(results)
        .map(|(t, r)| apply_transform(transform, *t).distance_squared(*r))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube_corners() -> Vec<DVec3> {
        let mut points = Vec::new();
        for z in [0.0, 10.0] {
            for y in [0.0, 10.0] {
                for x in [0.0, 10.0] {
                    points.push(DVec3::new(x, y, z));
                }
            }
        }
        points
    }

    #[test]
    fn test_affine_translation() -> Result<(), EstimationError> {
        let targets = cube_corners();
        let shift = DVec3::new(1.5, -2.0, 0.25);
        let results: Vec<DVec3> = targets.iter().map(|p| *p + shift).collect();
        let m = estimate_affine(&targets, &results)?;
        assert!(m.abs_diff_eq(DMat4::from_translation(shift), 1e-9));
        Ok(())
    }

    #[test]
    fn test_insufficient_pairs() {
        let targets = vec![DVec3::ZERO, DVec3::X, DVec3::Y];
        let res = estimate_affine(&targets, &targets);
        assert_eq!(
            res,
            Err(EstimationError::InsufficientCorrespondences {
                required: 4,
                found: 3
            })
        );
        assert!(estimate_rigid(&targets, &targets).is_ok());
        assert_eq!(
            estimate_rigid(&targets[..2], &targets[..2]),
            Err(EstimationError::InsufficientCorrespondences {
                required: 3,
                found: 2
            })
        );
        assert_eq!(
            estimate_rigid(&targets, &targets[..2]),
            Err(EstimationError::LengthMismatch(3, 2))
        );
    }

    #[test]
    fn test_rigid_planar_points_stay_proper() -> Result<(), EstimationError> {
        // Coplanar points leave one singular value at zero, where V * U^T may
        // come out as a reflection.
        let targets: Vec<DVec3> = (0..6)
            .map(|i| {
                let a = i as f64;
                DVec3::new(a.cos() * (3.0 + a), a.sin() * (2.0 + a), 0.0)
            })
            .collect();
        let rotation = DMat3::from_rotation_z(0.7);
        let shift = DVec3::new(4.0, 1.0, -3.0);
        let results: Vec<DVec3> = targets.iter().map(|p| rotation * *p + shift).collect();

        let m = estimate_rigid(&targets, &results)?;
        let linear = mat44::mat44_to_mat33(&m);
        approx::assert_relative_eq!(linear.determinant(), 1.0, epsilon = 1e-9);
        assert!(linear.abs_diff_eq(rotation, 1e-9));
        for (t, r) in targets.iter().zip(&results) {
            assert!(apply_transform(&m, *t).abs_diff_eq(*r, 1e-9));
        }
        Ok(())
    }

    #[test]
    fn test_optimize_kept_too_few() {
        let targets = cube_corners();
        let config = TrimmedFitConfig {
            percent_to_keep: 40,
            ..Default::default()
        };
        let res = optimize(&targets, &targets, TransformKind::Affine, &config);
        assert_eq!(
            res,
            Err(EstimationError::InsufficientCorrespondences {
                required: 4,
                found: 3
            })
        );
    }

    #[test]
    fn test_optimize_early_stop() -> Result<(), EstimationError> {
        let targets = cube_corners();
        let shift = DVec3::new(0.5, 0.5, 0.5);
        let results: Vec<DVec3> = targets.iter().map(|p| *p + shift).collect();

        let fixed = optimize(&targets, &results, TransformKind::Rigid, &Default::default())?;
        assert_eq!(fixed.iterations, 30);

        let config = TrimmedFitConfig {
            convergence_tolerance: Some(1e-6),
            ..Default::default()
        };
        let early = optimize(&targets, &results, TransformKind::Rigid, &config)?;
        assert_eq!(early.iterations, 1);
        assert!(early.transform.abs_diff_eq(DMat4::from_translation(shift), 1e-9));
        assert!(early.residual < 1e-12);
        Ok(())
    }
}
