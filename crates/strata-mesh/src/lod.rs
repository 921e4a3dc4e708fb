//! Reduced-detail heightmap meshing for distant chunks.
//!
//! The chunk footprint is split into `step x step` cells. Each cell becomes
//! one flat top quad at the highest solid voxel in its footprint, plus side
//! walls wherever a horizontal neighbor cell is lower. The result covers the
//! same world-space extent as the full mesh with far fewer quads.

use strata_voxel::{BlockAccess, BlockPos, CHUNK_SIZE, Chunk, ChunkMesh, FaceDirection, Voxel};

use crate::Mesher;
use crate::palette::shaded_color;

/// The tallest column in one LOD cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Cell {
    /// One past the local y of the highest solid voxel.
    top: usize,
    /// Kind of that voxel, used to color the cell.
    voxel: Voxel,
}

/// Scans every `step x step` footprint of `chunk` for its highest solid voxel.
///
/// Returned in `cx * cells + cz` order; `None` marks an all-empty footprint.
fn cell_heights(chunk: &Chunk, step: usize) -> Vec<Option<Cell>> {
    let cells = CHUNK_SIZE / step;
    let mut heights = vec![None; cells * cells];
    for cx in 0..cells {
        for cz in 0..cells {
            let mut best: Option<Cell> = None;
            for x in cx * step..(cx + 1) * step {
                for z in cz * step..(cz + 1) * step {
                    let Some(y) = (0..CHUNK_SIZE).rev().find(|&y| chunk.get(x, y, z).is_solid())
                    else {
                        continue;
                    };
                    if best.is_none_or(|b| y + 1 > b.top) {
                        best = Some(Cell {
                            top: y + 1,
                            voxel: chunk.get(x, y, z),
                        });
                    }
                }
            }
            heights[cx * cells + cz] = best;
        }
    }
    heights
}

const HORIZONTAL: [FaceDirection; 4] = [
    FaceDirection::PosX,
    FaceDirection::NegX,
    FaceDirection::PosZ,
    FaceDirection::NegZ,
];

impl Mesher {
    /// Builds a heightmap approximation of `chunk` using cells `step` voxels
    /// wide.
    ///
    /// At the chunk boundary the neighbor chunk's matching cell decides
    /// whether a wall is needed; if that neighbor is not resident no wall is
    /// emitted. The result therefore depends on the horizontal neighbors, and
    /// callers rely on [`Chunk::mark_lod_dirty`] to learn when they change.
    ///
    /// # Panics
    ///
    /// Panics if `step` is not a power of two in `2..=CHUNK_SIZE`.
    pub fn build_lod(
        world: &impl BlockAccess,
        chunk: &Chunk,
        origin: BlockPos,
        step: u32,
    ) -> ChunkMesh {
        let step = step as usize;
        assert!(
            step >= 2 && step <= CHUNK_SIZE && step.is_power_of_two(),
            "LOD step {step} out of range"
        );
        let cells = CHUNK_SIZE / step;
        let heights = cell_heights(chunk, step);
        let neighbor_heights =
            HORIZONTAL.map(|dir| {
                world
                    .loaded_chunk(chunk.coord().neighbor(dir))
                    .map(|n| cell_heights(&n, step))
            });

        let base = [origin.x as f32, origin.y as f32, origin.z as f32];
        let s = step as f32;
        let mut mesh = ChunkMesh::new();

        for cx in 0..cells {
            for cz in 0..cells {
                let Some(cell) = heights[cx * cells + cz] else {
                    continue;
                };
                let x0 = base[0] + cx as f32 * s;
                let z0 = base[2] + cz as f32 * s;
                let top = base[1] + cell.top as f32;

                mesh.push_quad(
                    FaceDirection::PosY,
                    [x0, top, z0],
                    s,
                    s,
                    cell.voxel,
                    shaded_color(cell.voxel, FaceDirection::PosY),
                );

                for (slot, dir) in HORIZONTAL.into_iter().enumerate() {
                    let [dx, _, dz] = dir.delta();
                    let nx = cx as i64 + dx;
                    let nz = cz as i64 + dz;
                    let inside = (0..cells as i64).contains(&nx) && (0..cells as i64).contains(&nz);

                    let neighbor_top = if inside {
                        heights[nx as usize * cells + nz as usize].map_or(0, |c| c.top)
                    } else {
                        let Some(across) = &neighbor_heights[slot] else {
                            continue;
                        };
                        let mx = nx.rem_euclid(cells as i64) as usize;
                        let mz = nz.rem_euclid(cells as i64) as usize;
                        across[mx * cells + mz].map_or(0, |c| c.top)
                    };
                    if neighbor_top >= cell.top {
                        continue;
                    }

                    let wall = (cell.top - neighbor_top) as f32;
                    let bottom = base[1] + neighbor_top as f32;
                    let corner = match dir {
                        FaceDirection::PosX => [x0 + s, bottom, z0],
                        FaceDirection::NegX => [x0, bottom, z0],
                        FaceDirection::PosZ => [x0, bottom, z0 + s],
                        _ => [x0, bottom, z0],
                    };
                    // X faces sweep u along Z, Z faces sweep u along X; v is Y.
                    mesh.push_quad(dir, corner, s, wall, cell.voxel, shaded_color(cell.voxel, dir));
                }
            }
        }

        mesh
    }
}
