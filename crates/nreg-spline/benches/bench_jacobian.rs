use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::DVec3;
use nreg_image::{ImageGeometry, VolumeSize};
use nreg_spline::{
    jacobian_penalty, jacobian_penalty_gradient, ControlPointGrid, JacobianConfig,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn perturbed_grid(rng: &mut StdRng, reference: &ImageGeometry) -> ControlPointGrid {
    let mut grid = ControlPointGrid::identity(reference, DVec3::splat(5.0)).unwrap();
    for p in grid.positions_mut() {
        *p += DVec3::new(
            rng.random_range(-0.5..0.5),
            rng.random_range(-0.5..0.5),
            rng.random_range(-0.5..0.5),
        );
    }
    grid
}

fn bench_penalty(c: &mut Criterion) {
    let mut group = c.benchmark_group("jacobian_penalty");
    let mut rng = StdRng::seed_from_u64(0);

    for n in [32, 64] {
        let reference = ImageGeometry::new(VolumeSize::from([n, n, n]), DVec3::ONE).unwrap();
        let grid = perturbed_grid(&mut rng, &reference);
        for (name, approx, fast_path) in [
            ("exact", false, true),
            ("exact_scalar", false, false),
            ("approx", true, true),
        ] {
            let config = JacobianConfig {
                fast_path,
                ..Default::default()
            };
            group.bench_with_input(BenchmarkId::new(name, n), &grid, |b, g| {
                b.iter(|| black_box(jacobian_penalty(g, &reference, approx, &config).unwrap()))
            });
        }
    }
    group.finish();
}

fn bench_gradient(c: &mut Criterion) {
    let mut group = c.benchmark_group("jacobian_gradient");
    let mut rng = StdRng::seed_from_u64(1);

    for n in [32, 64] {
        let reference = ImageGeometry::new(VolumeSize::from([n, n, n]), DVec3::ONE).unwrap();
        let grid = perturbed_grid(&mut rng, &reference);
        let config = JacobianConfig::default();
        for (name, approx) in [("exact", false), ("approx", true)] {
            group.bench_with_input(BenchmarkId::new(name, n), &grid, |b, g| {
                let mut gradient = vec![DVec3::ZERO; g.len()];
                b.iter(|| {
                    jacobian_penalty_gradient(g, &reference, &mut gradient, 0.01, approx, &config)
                        .unwrap();
                    black_box(&gradient);
                })
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_penalty, bench_gradient);
criterion_main!(benches);
