use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use strata_mesh::{Mesher, build_smooth};
use strata_terrain::{TerrainGenerator, TerrainParams};
use strata_voxel::{BlockAccess, Chunk, ChunkCoord};

/// Meshes a chunk with no resident neighbors.
struct Isolated;

impl BlockAccess for Isolated {
    fn loaded_chunk(&self, _coord: ChunkCoord) -> Option<Arc<Chunk>> {
        None
    }

    fn loaded_chunk_ys(&self, _cx: i64, _cz: i64) -> Vec<i64> {
        Vec::new()
    }
}

fn surface_chunk(generator: &TerrainGenerator) -> Chunk {
    let chunk = Chunk::new(ChunkCoord::new(1, 0, 1));
    generator.fill(&chunk);
    chunk
}

fn bench_greedy(c: &mut Criterion) {
    let generator = TerrainGenerator::new(TerrainParams::default());
    let chunk = surface_chunk(&generator);
    let origin = chunk.coord().world_origin();
    c.bench_function("greedy_surface_chunk", |bencher| {
        bencher.iter(|| black_box(Mesher::build(&Isolated, &chunk, origin)))
    });
}

fn bench_lod(c: &mut Criterion) {
    let generator = TerrainGenerator::new(TerrainParams::default());
    let chunk = surface_chunk(&generator);
    let origin = chunk.coord().world_origin();
    c.bench_function("lod4_surface_chunk", |bencher| {
        bencher.iter(|| black_box(Mesher::build_lod(&Isolated, &chunk, origin, 4)))
    });
}

fn bench_smooth(c: &mut Criterion) {
    let generator = TerrainGenerator::new(TerrainParams::default());
    let origin = ChunkCoord::new(1, 0, 1).world_origin();
    c.bench_function("smooth_surface_chunk", |bencher| {
        bencher.iter(|| black_box(build_smooth(&generator, origin, 16)))
    });
}

criterion_group!(benches, bench_greedy, bench_lod, bench_smooth);
criterion_main!(benches);
