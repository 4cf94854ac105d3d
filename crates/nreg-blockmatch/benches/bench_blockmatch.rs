use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::DVec3;
use nreg_blockmatch::{
    block_matching, optimize, BlockMatchingConfig, BlockMatchingState, TransformKind,
    TrimmedFitConfig,
};
use nreg_image::{ExecutionStrategy, ImageGeometry, VolumeSize, VolumetricImage};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn random_image(rng: &mut StdRng, n: usize) -> VolumetricImage {
    let size = VolumeSize::from([n, n, n]);
    let geometry = ImageGeometry::new(size, DVec3::ONE).unwrap();
    let data: Vec<f32> = (0..size.voxel_count())
        .map(|_| rng.random_range(1.0..100.0))
        .collect();
    VolumetricImage::from_vec(geometry, data).unwrap()
}

fn bench_block_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_matching");
    let mut rng = StdRng::seed_from_u64(0);

    for n in [32, 64] {
        let reference = random_image(&mut rng, n);
        let floating = random_image(&mut rng, n);
        for (name, execution) in [
            ("serial", ExecutionStrategy::Serial),
            ("parallel", ExecutionStrategy::Parallel),
        ] {
            let config = BlockMatchingConfig {
                execution,
                ..Default::default()
            };
            let state = BlockMatchingState::initialise(&reference, &config, None).unwrap();
            group.bench_with_input(
                BenchmarkId::new(name, n),
                &(&reference, &floating),
                |b, (r, f)| b.iter(|| black_box(block_matching(r, f, &state, &config).unwrap())),
            );
        }
    }
    group.finish();
}

fn bench_optimize(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimize");
    let mut rng = StdRng::seed_from_u64(1);

    for n in [100, 1000] {
        let targets: Vec<DVec3> = (0..n)
            .map(|_| DVec3::new(rng.random(), rng.random(), rng.random()) * 100.0)
            .collect();
        let results: Vec<DVec3> = targets
            .iter()
            .map(|p| *p + DVec3::new(rng.random(), rng.random(), rng.random()))
            .collect();
        let config = TrimmedFitConfig::default();
        for kind in [TransformKind::Rigid, TransformKind::Affine] {
            group.bench_with_input(
                BenchmarkId::new(format!("{kind:?}"), n),
                &(&targets, &results),
                |b, (t, r)| b.iter(|| black_box(optimize(t, r, kind, &config).unwrap())),
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_block_matching, bench_optimize);
criterion_main!(benches);
