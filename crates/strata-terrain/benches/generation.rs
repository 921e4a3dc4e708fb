use criterion::{Criterion, black_box, criterion_group, criterion_main};
use strata_terrain::*;
use strata_voxel::{Chunk, ChunkCoord};

fn bench_noise_sample3(c: &mut Criterion) {
    let field = NoiseField::new(42);
    c.bench_function("noise_sample3", |bencher| {
        bencher.iter(|| black_box(field.sample3(black_box(12.3), black_box(-4.5), black_box(6.7))))
    });
}

fn bench_fill_surface_chunk(c: &mut Criterion) {
    let generator = TerrainGenerator::new(TerrainParams {
        seed: 7,
        ..TerrainParams::default()
    });
    c.bench_function("fill_surface_chunk", |bencher| {
        bencher.iter(|| {
            let chunk = Chunk::new(ChunkCoord::new(3, 0, -2));
            generator.fill(&chunk);
            black_box(chunk)
        })
    });
}

fn bench_sample_density(c: &mut Criterion) {
    let generator = TerrainGenerator::new(TerrainParams::default());
    c.bench_function("sample_density", |bencher| {
        bencher.iter(|| {
            black_box(generator.sample_density(black_box(100.0), black_box(20.0), black_box(-50.0)))
        })
    });
}

criterion_group!(
    benches,
    bench_noise_sample3,
    bench_fill_surface_chunk,
    bench_sample_density
);
criterion_main!(benches);
