//! Smooth isosurface extraction by marching tetrahedra.
//!
//! Each grid cube is split into six tetrahedra around one of its main
//! diagonals. The diagonal alternates by cube parity so neighboring cubes
//! share face triangulations. Within a tetrahedron the surface crosses each
//! edge whose endpoints disagree on solidity, producing one triangle (one
//! corner isolated) or a quad (two and two).

use glam::Vec3;
use strata_voxel::{BlockPos, ChunkMesh, DensitySampler, Voxel};

use crate::palette::base_color;

/// Unit cube corners. Used both to sample density and to place vertices.
const CUBE_CORNERS: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [1, 1, 0],
    [0, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [1, 1, 1],
    [0, 1, 1],
];

/// Split around the 0-6 diagonal.
const TETRAHEDRA_A: [[usize; 4]; 6] = [
    [0, 5, 1, 6],
    [0, 1, 2, 6],
    [0, 2, 3, 6],
    [0, 3, 7, 6],
    [0, 7, 4, 6],
    [0, 4, 5, 6],
];

/// Split around the 1-7 diagonal.
const TETRAHEDRA_B: [[usize; 4]; 6] = [
    [1, 6, 2, 7],
    [1, 2, 3, 7],
    [1, 3, 0, 7],
    [1, 0, 4, 7],
    [1, 4, 5, 7],
    [1, 5, 6, 7],
];

/// Returns `t` in `[0, 1]` where the density crosses zero between `a` and `b`.
#[inline]
fn crossing(da: f32, db: f32) -> f32 {
    let denom = da - db;
    if denom.abs() < f32::EPSILON {
        0.5
    } else {
        (da / denom).clamp(0.0, 1.0)
    }
}

/// Surface color by altitude.
fn surface_color(y: f32, water_line: f32, snow_line: f32) -> [f32; 3] {
    if y <= water_line {
        base_color(Voxel::Water)
    } else if y > snow_line {
        base_color(Voxel::Snow)
    } else {
        base_color(Voxel::Grass)
    }
}

struct Extractor {
    mesh: ChunkMesh,
    water_line: f32,
    snow_line: f32,
}

impl Extractor {
    fn emit(&mut self, mut tri: [Vec3; 3], inside: Vec3) {
        let normal = (tri[1] - tri[0]).cross(tri[2] - tri[0]);
        let centroid = (tri[0] + tri[1] + tri[2]) / 3.0;
        // Face away from solid.
        if normal.dot(centroid - inside) < 0.0 {
            tri.swap(1, 2);
        }
        let colors = tri.map(|p| surface_color(p.y, self.water_line, self.snow_line));
        self.mesh.push_triangle(tri.map(|v| v.to_array()), colors);
    }

    fn tetrahedron(&mut self, positions: [Vec3; 4], densities: [f32; 4]) {
        let (solid, empty): (Vec<usize>, Vec<usize>) = (0..4).partition(|&i| densities[i] > 0.0);
        if solid.is_empty() || empty.is_empty() {
            return;
        }

        let point = |a: usize, b: usize| {
            positions[a].lerp(positions[b], crossing(densities[a], densities[b]))
        };
        let inside = solid.iter().map(|&i| positions[i]).sum::<Vec3>() / solid.len() as f32;

        match (solid.as_slice(), empty.as_slice()) {
            (&[s], &[e0, e1, e2]) => {
                self.emit([point(s, e0), point(s, e1), point(s, e2)], inside);
            }
            (&[s0, s1, s2], &[e]) => {
                self.emit([point(s0, e), point(s1, e), point(s2, e)], inside);
            }
            (&[a, b], &[c, d]) => {
                // Walk the crossing edges as a loop so the two triangles
                // tile the quad instead of overlapping.
                let quad = [point(a, c), point(a, d), point(b, d), point(b, c)];
                self.emit([quad[0], quad[1], quad[2]], inside);
                self.emit([quad[0], quad[2], quad[3]], inside);
            }
            _ => {}
        }
    }
}

/// Extracts a smooth surface from `sampler` over a `size`-cube of cells whose
/// minimum corner is `origin`.
///
/// Vertices are in world space and colored by altitude against the
/// sampler's water and snow lines.
pub fn build_smooth(sampler: &impl DensitySampler, origin: BlockPos, size: usize) -> ChunkMesh {
    let dim = size + 1;
    let mut grid = vec![0.0f32; dim * dim * dim];
    for x in 0..dim {
        for y in 0..dim {
            for z in 0..dim {
                grid[(x * dim + y) * dim + z] = sampler.sample_density(
                    (origin.x + x as i64) as f64,
                    (origin.y + y as i64) as f64,
                    (origin.z + z as i64) as f64,
                ) as f32;
            }
        }
    }

    let base = Vec3::new(origin.x as f32, origin.y as f32, origin.z as f32);
    let mut extractor = Extractor {
        mesh: ChunkMesh::new(),
        water_line: sampler.water_line() as f32,
        snow_line: sampler.snow_line() as f32,
    };

    for x in 0..size {
        for y in 0..size {
            for z in 0..size {
                let corner_density = CUBE_CORNERS
                    .map(|[cx, cy, cz]| grid[((x + cx) * dim + y + cy) * dim + z + cz]);
                if corner_density.iter().all(|&d| d > 0.0)
                    || corner_density.iter().all(|&d| d <= 0.0)
                {
                    continue;
                }
                let corner_position = CUBE_CORNERS.map(|[cx, cy, cz]| {
                    base + Vec3::new((x + cx) as f32, (y + cy) as f32, (z + cz) as f32)
                });

                let tetrahedra = if (x ^ y ^ z) & 1 == 0 {
                    &TETRAHEDRA_A
                } else {
                    &TETRAHEDRA_B
                };
                for tet in tetrahedra {
                    extractor.tetrahedron(
                        tet.map(|i| corner_position[i]),
                        tet.map(|i| corner_density[i]),
                    );
                }
            }
        }
    }

    extractor.mesh
}
