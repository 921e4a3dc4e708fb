//! Greedy meshing: merges coplanar, same-kind exposed faces into maximal
//! rectangles so a flat run of blocks costs one quad instead of one per voxel.

use std::sync::Arc;

use strata_voxel::{BlockAccess, BlockPos, CHUNK_SIZE, Chunk, ChunkMesh, FaceDirection, Voxel};

use crate::palette::shaded_color;

/// Builds renderable meshes from chunk voxels.
///
/// Cross-chunk lookups go through [`BlockAccess`], which never blocks or
/// loads; a neighbor chunk that is not resident counts as solid so that
/// in-flight loads never show holes at chunk seams.
pub struct Mesher;

/// Converts abstract axis coordinates back to concrete `(x, y, z)`.
///
/// `layer_axis`, `u_axis`, `v_axis` are 0=X, 1=Y, 2=Z.
pub(crate) fn axes_to_xyz(
    layer_axis: usize,
    u_axis: usize,
    v_axis: usize,
    layer: usize,
    u: usize,
    v: usize,
) -> (usize, usize, usize) {
    let mut coords = [0usize; 3];
    coords[layer_axis] = layer;
    coords[u_axis] = u;
    coords[v_axis] = v;
    (coords[0], coords[1], coords[2])
}

/// Face visibility across a chunk boundary.
struct Exposure<'a> {
    chunk: &'a Chunk,
    neighbors: [Option<Arc<Chunk>>; 6],
}

impl<'a> Exposure<'a> {
    fn new(world: &impl BlockAccess, chunk: &'a Chunk) -> Self {
        let coord = chunk.coord();
        Self {
            chunk,
            neighbors: FaceDirection::ALL.map(|dir| world.loaded_chunk(coord.neighbor(dir))),
        }
    }

    /// Returns `true` if the voxel next to `(x, y, z)` in `direction` is empty.
    fn is_exposed(&self, x: usize, y: usize, z: usize, direction: FaceDirection) -> bool {
        let [dx, dy, dz] = direction.delta();
        let n = [x as i64 + dx, y as i64 + dy, z as i64 + dz];
        let size = CHUNK_SIZE as i64;
        if n.iter().all(|&c| (0..size).contains(&c)) {
            return self
                .chunk
                .get(n[0] as usize, n[1] as usize, n[2] as usize)
                .is_empty();
        }
        match &self.neighbors[direction.index()] {
            Some(neighbor) => {
                let [nx, ny, nz] = n.map(|c| c.rem_euclid(size) as usize);
                neighbor.get(nx, ny, nz).is_empty()
            }
            None => false,
        }
    }
}

impl Mesher {
    /// Meshes `chunk` at full resolution with vertices placed relative to the
    /// world-space `origin` of the chunk.
    pub fn build(world: &impl BlockAccess, chunk: &Chunk, origin: BlockPos) -> ChunkMesh {
        let exposure = Exposure::new(world, chunk);
        let origin = [origin.x as f32, origin.y as f32, origin.z as f32];
        let size = CHUNK_SIZE;

        let mut mesh = ChunkMesh::new();
        let mut mask: Vec<Option<Voxel>> = vec![None; size * size];
        let mut visited = vec![false; size * size];

        for direction in FaceDirection::ALL {
            let (layer_axis, u_axis, v_axis) = direction.sweep_axes();

            for layer in 0..size {
                visited.fill(false);

                // Exposed face kind per cell of this slice.
                for v in 0..size {
                    for u in 0..size {
                        let (x, y, z) = axes_to_xyz(layer_axis, u_axis, v_axis, layer, u, v);
                        let voxel = chunk.get(x, y, z);
                        mask[v * size + u] = (voxel.is_solid()
                            && exposure.is_exposed(x, y, z, direction))
                        .then_some(voxel);
                    }
                }

                for v in 0..size {
                    for u in 0..size {
                        let idx = v * size + u;
                        if visited[idx] {
                            continue;
                        }
                        let Some(voxel) = mask[idx] else {
                            continue;
                        };

                        // Extend width along u-axis.
                        let mut w = 1;
                        while u + w < size
                            && !visited[idx + w]
                            && mask[idx + w] == Some(voxel)
                        {
                            w += 1;
                        }

                        // Extend height along v-axis.
                        let mut h = 1;
                        'outer: while v + h < size {
                            for du in 0..w {
                                let i = (v + h) * size + u + du;
                                if visited[i] || mask[i] != Some(voxel) {
                                    break 'outer;
                                }
                            }
                            h += 1;
                        }

                        for dv in 0..h {
                            for du in 0..w {
                                visited[(v + dv) * size + u + du] = true;
                            }
                        }

                        let mut corner = origin;
                        corner[layer_axis] +=
                            layer as f32 + if direction.is_positive() { 1.0 } else { 0.0 };
                        corner[u_axis] += u as f32;
                        corner[v_axis] += v as f32;
                        mesh.push_quad(
                            direction,
                            corner,
                            w as f32,
                            h as f32,
                            voxel,
                            shaded_color(voxel, direction),
                        );
                    }
                }
            }
        }

        mesh
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_world::TestWorld;
    use strata_voxel::ChunkCoord;

    fn mesh_single(chunk: Chunk) -> ChunkMesh {
        let mut world = TestWorld::default();
        let chunk = world.insert(chunk);
        Mesher::build(&world, &chunk, chunk.coord().world_origin())
    }

    #[test]
    fn test_empty_chunk_produces_empty_mesh() {
        let mesh = mesh_single(Chunk::new(ChunkCoord::new(0, 0, 0)));
        assert!(mesh.is_empty());
        assert_eq!(mesh.quad_count(), 0);
    }

    #[test]
    fn test_single_voxel_produces_six_quads() {
        let chunk = Chunk::new(ChunkCoord::new(0, 0, 0));
        chunk.set(8, 8, 8, Voxel::Stone);
        let mesh = mesh_single(chunk);
        assert_eq!(mesh.quad_count(), 6);
        for dir in FaceDirection::ALL {
            assert_eq!(mesh.count_quads_for_direction(dir), 1, "{dir:?}");
        }
    }

    #[test]
    fn test_two_by_one_by_one_merges_into_six_quads() {
        let chunk = Chunk::new(ChunkCoord::new(0, 0, 0));
        chunk.set(5, 5, 5, Voxel::Stone);
        chunk.set(6, 5, 5, Voxel::Stone);
        let mesh = mesh_single(chunk);

        assert_eq!(mesh.quad_count(), 6, "one quad per cube face");
        for quad in &mesh.quads {
            let area = quad.width * quad.height;
            match quad.direction {
                FaceDirection::PosX | FaceDirection::NegX => assert_eq!(area, 1.0),
                _ => assert_eq!(area, 2.0, "{:?} should span the long axis", quad.direction),
            }
        }
    }

    #[test]
    fn test_different_kinds_do_not_merge() {
        let chunk = Chunk::new(ChunkCoord::new(0, 0, 0));
        chunk.set(5, 5, 5, Voxel::Stone);
        chunk.set(6, 5, 5, Voxel::Dirt);
        let mesh = mesh_single(chunk);
        assert_eq!(mesh.count_quads_for_direction(FaceDirection::PosY), 2);
        assert_eq!(mesh.quad_count(), 10);
    }

    #[test]
    fn test_flat_layer_merges_to_one_quad_per_side() {
        let chunk = Chunk::new(ChunkCoord::new(0, 0, 0));
        for x in 0..CHUNK_SIZE {
            for z in 0..CHUNK_SIZE {
                chunk.set(x, 4, z, Voxel::Grass);
            }
        }
        let mesh = mesh_single(chunk);
        assert_eq!(mesh.count_quads_for_direction(FaceDirection::PosY), 1);
        assert_eq!(mesh.count_quads_for_direction(FaceDirection::NegY), 1);
        // Unloaded neighbors count as solid, so the rim has no side faces.
        assert_eq!(mesh.count_quads_for_direction(FaceDirection::PosX), 0);
        assert_eq!(mesh.count_quads_for_direction(FaceDirection::NegZ), 0);
    }

    #[test]
    fn test_loaded_empty_neighbor_exposes_boundary() {
        let mut world = TestWorld::default();
        let chunk = Chunk::new(ChunkCoord::new(0, 0, 0));
        chunk.set(CHUNK_SIZE - 1, 3, 3, Voxel::Stone);
        let chunk = world.insert(chunk);

        let without = Mesher::build(&world, &chunk, chunk.coord().world_origin());
        assert_eq!(without.count_quads_for_direction(FaceDirection::PosX), 0);

        world.insert(Chunk::new(ChunkCoord::new(1, 0, 0)));
        let with = Mesher::build(&world, &chunk, chunk.coord().world_origin());
        assert_eq!(with.count_quads_for_direction(FaceDirection::PosX), 1);
    }

    #[test]
    fn test_solid_neighbor_hides_boundary() {
        let mut world = TestWorld::default();
        let chunk = Chunk::new(ChunkCoord::new(0, 0, 0));
        chunk.set(0, 3, 3, Voxel::Stone);
        let chunk = world.insert(chunk);
        let neighbor = Chunk::new(ChunkCoord::new(-1, 0, 0));
        neighbor.set(CHUNK_SIZE - 1, 3, 3, Voxel::Stone);
        world.insert(neighbor);

        let mesh = Mesher::build(&world, &chunk, chunk.coord().world_origin());
        assert_eq!(mesh.count_quads_for_direction(FaceDirection::NegX), 0);
        assert_eq!(mesh.quad_count(), 5);
    }

    #[test]
    fn test_vertices_are_in_world_space() {
        let mut world = TestWorld::default();
        let chunk = Chunk::new(ChunkCoord::new(-1, 2, 0));
        chunk.set(0, 0, 0, Voxel::Stone);
        let chunk = world.insert(chunk);
        let mesh = Mesher::build(&world, &chunk, chunk.coord().world_origin());

        for vertex in &mesh.vertices {
            let [x, y, z] = vertex.position;
            assert!((-16.0..=-15.0).contains(&x), "x = {x}");
            assert!((32.0..=33.0).contains(&y), "y = {y}");
            assert!((0.0..=1.0).contains(&z), "z = {z}");
        }
    }

    #[test]
    fn test_every_exposed_face_covered_once() {
        // An L-shaped step: coverage area per direction equals exposed faces.
        let chunk = Chunk::new(ChunkCoord::new(0, 0, 0));
        let cells = [(2, 2, 2), (3, 2, 2), (4, 2, 2), (2, 3, 2), (2, 2, 3)];
        for (x, y, z) in cells {
            chunk.set(x, y, z, Voxel::Stone);
        }
        let mesh = mesh_single(chunk);

        for dir in FaceDirection::ALL {
            let [dx, dy, dz] = dir.delta();
            let exposed = cells
                .iter()
                .filter(|(x, y, z)| {
                    let n = (*x as i64 + dx, *y as i64 + dy, *z as i64 + dz);
                    !cells
                        .iter()
                        .any(|c| (c.0 as i64, c.1 as i64, c.2 as i64) == n)
                })
                .count();
            let covered: f32 = mesh
                .quads
                .iter()
                .filter(|q| q.direction == dir)
                .map(|q| q.width * q.height)
                .sum();
            assert_eq!(covered, exposed as f32, "{dir:?} coverage");
        }
    }

    #[test]
    fn test_face_colors_are_shaded() {
        let chunk = Chunk::new(ChunkCoord::new(0, 0, 0));
        chunk.set(1, 1, 1, Voxel::Stone);
        let mesh = mesh_single(chunk);
        let bottom = mesh
            .vertices
            .iter()
            .find(|v| v.normal == [0.0, -1.0, 0.0])
            .expect("bottom face");
        assert_eq!(bottom.color, [0.25, 0.25, 0.25]);
    }
}
