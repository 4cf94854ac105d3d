use glam::{DMat3, DMat4, DVec3};
use nreg_blockmatch::{
    apply_transform, estimate_affine, estimate_rigid, optimize, EstimationError, TransformKind,
    TrimmedFitConfig,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn random_points(rng: &mut StdRng, n: usize) -> Vec<DVec3> {
    (0..n)
        .map(|_| {
            DVec3::new(
                rng.random_range(-20.0..20.0),
                rng.random_range(-20.0..20.0),
                rng.random_range(-20.0..20.0),
            )
        })
        .collect()
}

fn rigid(rotation: DMat3, translation: DVec3) -> DMat4 {
    DMat4::from_translation(translation) * DMat4::from_mat3(rotation)
}

fn max_abs_diff(a: &DMat4, b: &DMat4) -> f64 {
    (*a - *b)
        .to_cols_array()
        .iter()
        .fold(0.0, |acc, v| acc.max(v.abs()))
}

#[test]
fn test_rigid_recovers_exact_transform() -> Result<(), EstimationError> {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..10 {
        let axis = DVec3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(0.1..1.0),
        )
        .normalize();
        let angle = rng.random_range(-3.0..3.0);
        let truth = rigid(
            DMat3::from_axis_angle(axis, angle),
            DVec3::new(rng.random_range(-10.0..10.0), 3.0, -1.0),
        );

        let targets = random_points(&mut rng, 12);
        let results: Vec<DVec3> = targets.iter().map(|p| apply_transform(&truth, *p)).collect();

        let m = estimate_rigid(&targets, &results)?;
        assert!(max_abs_diff(&m, &truth) < 1e-5);
        approx::assert_relative_eq!(DMat3::from_mat4(m).determinant(), 1.0, epsilon = 1e-9);
    }
    Ok(())
}

#[test]
fn test_affine_recovers_exact_transform() -> Result<(), EstimationError> {
    let mut rng = StdRng::seed_from_u64(11);
    let truth = DMat4::from_cols_array_2d(&[
        [1.1, 0.1, -0.05, 0.0],
        [0.2, 0.9, 0.1, 0.0],
        [0.0, -0.15, 1.2, 0.0],
        [4.0, -3.0, 2.5, 1.0],
    ]);
    let targets = random_points(&mut rng, 20);
    let results: Vec<DVec3> = targets.iter().map(|p| apply_transform(&truth, *p)).collect();
    let m = estimate_affine(&targets, &results)?;
    assert!(max_abs_diff(&m, &truth) < 1e-5);
    Ok(())
}

/// Results where the first `outliers` pairs follow `wrong` and the rest follow `truth`.
fn corrupted(targets: &[DVec3], truth: &DMat4, wrong: &DMat4, outliers: usize) -> Vec<DVec3> {
    targets
        .iter()
        .enumerate()
        .map(|(i, p)| {
            if i < outliers {
                apply_transform(wrong, *p)
            } else {
                apply_transform(truth, *p)
            }
        })
        .collect()
}

#[test]
fn test_trimmed_affine_rejects_outliers_below_trim_fraction() -> Result<(), EstimationError> {
    let mut rng = StdRng::seed_from_u64(3);
    let targets = random_points(&mut rng, 40);
    let truth = rigid(DMat3::from_rotation_z(0.2), DVec3::new(3.0, -2.0, 1.0))
        * DMat4::from_scale(DVec3::splat(1.1));
    let wrong = rigid(DMat3::from_rotation_z(-0.5), DVec3::new(-12.0, 9.0, 6.0))
        * DMat4::from_scale(DVec3::splat(0.8));
    let config = TrimmedFitConfig::default();

    // 25% outliers, 50% kept
    let results = corrupted(&targets, &truth, &wrong, 10);
    let naive = estimate_affine(&targets, &results)?;
    assert!(max_abs_diff(&naive, &truth) > 0.1);

    let fit = optimize(&targets, &results, TransformKind::Affine, &config)?;
    assert!(max_abs_diff(&fit.transform, &truth) < 1e-5);
    assert_eq!(fit.iterations, 30);
    assert!(fit.residual < 1e-8);

    // 60% outliers: the trimmed fit locks onto the wrong transform
    let results = corrupted(&targets, &truth, &wrong, 24);
    let fit = optimize(&targets, &results, TransformKind::Affine, &config)?;
    assert!(max_abs_diff(&fit.transform, &truth) > 1.0);
    Ok(())
}

#[test]
fn test_trimmed_rigid_rejects_outliers_below_trim_fraction() -> Result<(), EstimationError> {
    let mut rng = StdRng::seed_from_u64(5);
    let targets = random_points(&mut rng, 40);
    let truth = rigid(DMat3::from_rotation_z(0.3), DVec3::new(2.0, 1.0, -4.0));
    let wrong = rigid(DMat3::from_rotation_x(-0.6), DVec3::new(10.0, -8.0, 5.0));
    let config = TrimmedFitConfig::default();

    let results = corrupted(&targets, &truth, &wrong, 10);
    let fit = optimize(&targets, &results, TransformKind::Rigid, &config)?;
    assert!(max_abs_diff(&fit.transform, &truth) < 1e-5);

    let results = corrupted(&targets, &truth, &wrong, 28);
    let fit = optimize(&targets, &results, TransformKind::Rigid, &config)?;
    assert!(max_abs_diff(&fit.transform, &truth) > 1.0);
    Ok(())
}

#[test]
fn test_coplanar_affine_stays_finite() -> Result<(), EstimationError> {
    // All targets on z = 0: the z column of the affine is unobservable and
    // its singular values are dropped instead of blowing up.
    let targets: Vec<DVec3> = (0..9)
        .map(|i| DVec3::new((i % 3) as f64 * 5.0, (i / 3) as f64 * 5.0, 0.0))
        .collect();
    let shift = DVec3::new(1.0, 2.0, 3.0);
    let results: Vec<DVec3> = targets.iter().map(|p| *p + shift).collect();
    let m = estimate_affine(&targets, &results)?;
    assert!(m.is_finite());
    for (t, r) in targets.iter().zip(&results) {
        assert!(apply_transform(&m, *t).abs_diff_eq(*r, 1e-6));
    }
    Ok(())
}

#[test]
fn test_zero_iterations_returns_fit_on_every_pair() -> Result<(), EstimationError> {
    let mut rng = StdRng::seed_from_u64(5);
    let truth = rigid(DMat3::from_rotation_z(0.3), DVec3::new(1.0, -2.0, 0.5));
    let targets = random_points(&mut rng, 5);
    let results: Vec<DVec3> = targets.iter().map(|p| apply_transform(&truth, *p)).collect();

    // 50% of five pairs keeps two, fewer than an affine fit needs
    let mut config = TrimmedFitConfig {
        percent_to_keep: 50,
        max_iterations: 0,
        convergence_tolerance: None,
    };
    let fit = optimize(&targets, &results, TransformKind::Affine, &config)?;
    assert_eq!(fit.iterations, 0);
    assert!(max_abs_diff(&fit.transform, &truth) < 1e-5);
    assert!(fit.residual < 1e-8);

    config.max_iterations = 1;
    assert_eq!(
        optimize(&targets, &results, TransformKind::Affine, &config),
        Err(EstimationError::InsufficientCorrespondences {
            required: 4,
            found: 2
        })
    );
    Ok(())
}
