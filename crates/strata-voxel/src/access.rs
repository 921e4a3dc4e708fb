//! Read-only seams between the chunk store and the algorithms that query it.

use std::sync::Arc;

use crate::chunk::Chunk;
use crate::coords::{BlockPos, ChunkCoord};
use crate::voxel::Voxel;

/// Read-only, non-blocking view over the currently resident chunks.
///
/// Meshers and surface queries go through this trait so they never trigger
/// generation or disk I/O.
pub trait BlockAccess {
    /// Returns the chunk at `coord` if it is resident.
    fn loaded_chunk(&self, coord: ChunkCoord) -> Option<Arc<Chunk>>;

    /// Returns the chunk-y coordinates of every resident chunk in the column
    /// `(cx, cz)`, in any order.
    fn loaded_chunk_ys(&self, cx: i64, cz: i64) -> Vec<i64>;

    /// Returns the voxel at `pos`, or `None` if its chunk is not resident.
    fn block_if_loaded(&self, pos: BlockPos) -> Option<Voxel> {
        let (coord, local) = pos.split();
        self.loaded_chunk(coord)
            .map(|chunk| chunk.get(local.x, local.y, local.z))
    }
}

/// A continuous density field: positive is solid, non-positive is empty.
///
/// Implemented by the terrain generator and consumed by isosurface extraction.
pub trait DensitySampler {
    /// Samples the density at a world-space point.
    fn sample_density(&self, x: f64, y: f64, z: f64) -> f64;

    /// Height at or below which empty space fills with liquid.
    fn water_line(&self) -> f64;

    /// Height above which exposed surfaces freeze.
    fn snow_line(&self) -> f64;
}
