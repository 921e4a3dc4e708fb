//! Mesh buffers produced by the meshers and cached on each [`crate::Chunk`].
//!
//! A [`ChunkMesh`] is opaque to the voxel core: it is built off the render
//! thread, cached per LOD step on the chunk, and uploaded by the rendering
//! layer through [`ChunkMesh::vertex_bytes`] and [`ChunkMesh::index_bytes`].

use glam::Vec3;

use crate::face::FaceDirection;
use crate::voxel::Voxel;

/// A single mesh vertex in world space, laid out for direct GPU upload.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    /// World-space position.
    pub position: [f32; 3],
    /// Unit face normal.
    pub normal: [f32; 3],
    /// Linear RGB color with face shading applied.
    pub color: [f32; 3],
}

static_assertions::assert_eq_size!(MeshVertex, [u8; 36]);

/// Metadata for a single merged quad, used for statistics and tests.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuadInfo {
    /// Which face direction this quad belongs to.
    pub direction: FaceDirection,
    /// Block kind the quad was merged over.
    pub voxel: Voxel,
    /// Extent along the face's u axis, in voxels.
    pub width: f32,
    /// Extent along the face's v axis, in voxels.
    pub height: f32,
}

/// The mesh output of a meshing pass: vertices plus triangle indices.
#[derive(Clone, Debug, Default)]
pub struct ChunkMesh {
    /// Vertex buffer.
    pub vertices: Vec<MeshVertex>,
    /// Index buffer (triangles, 3 indices per triangle).
    pub indices: Vec<u32>,
    /// One entry per emitted quad. Triangles from isosurface extraction are
    /// not recorded here.
    pub quads: Vec<QuadInfo>,
}

impl ChunkMesh {
    /// Creates an empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes one axis-aligned quad.
    ///
    /// `corner` is the world-space corner with the smallest u and v
    /// coordinates, already placed on the face plane. `width` and `height`
    /// extend it along the direction's u and v sweep axes. Winding is chosen
    /// so the quad is front-facing when seen from the side its normal points to.
    pub fn push_quad(
        &mut self,
        direction: FaceDirection,
        corner: [f32; 3],
        width: f32,
        height: f32,
        voxel: Voxel,
        color: [f32; 3],
    ) {
        let (_, u_axis, v_axis) = direction.sweep_axes();
        let normal = direction.normal();

        let corners = [(0.0, 0.0), (width, 0.0), (width, height), (0.0, height)];
        let base = self.vertices.len() as u32;
        for (du, dv) in corners {
            let mut position = corner;
            position[u_axis] += du;
            position[v_axis] += dv;
            self.vertices.push(MeshVertex {
                position,
                normal,
                color,
            });
        }

        // u x v points along +normal for PosZ, NegX and NegY.
        let ccw = matches!(
            direction,
            FaceDirection::PosZ | FaceDirection::NegX | FaceDirection::NegY
        );
        if ccw {
            self.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        } else {
            self.indices
                .extend_from_slice(&[base, base + 2, base + 1, base, base + 3, base + 2]);
        }

        self.quads.push(QuadInfo {
            direction,
            voxel,
            width,
            height,
        });
    }

    /// Pushes one free-form triangle with per-vertex colors.
    pub fn push_triangle(&mut self, positions: [[f32; 3]; 3], colors: [[f32; 3]; 3]) {
        let normal = triangle_normal(positions);
        let base = self.vertices.len() as u32;
        for (position, color) in positions.into_iter().zip(colors) {
            self.vertices.push(MeshVertex {
                position,
                normal,
                color,
            });
        }
        self.indices.extend_from_slice(&[base, base + 1, base + 2]);
    }

    /// Returns `true` if the mesh contains no geometry.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Returns the number of merged quads.
    pub fn quad_count(&self) -> usize {
        self.quads.len()
    }

    /// Returns the number of quads emitted for the given direction.
    pub fn count_quads_for_direction(&self, direction: FaceDirection) -> usize {
        self.quads
            .iter()
            .filter(|q| q.direction == direction)
            .count()
    }

    /// Returns the number of triangles in the mesh.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Returns the vertex data as a byte slice for GPU upload.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Returns the index data as a byte slice for GPU upload.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

/// Unit normal of a counter-clockwise triangle; degenerate triangles face up.
fn triangle_normal([a, b, c]: [[f32; 3]; 3]) -> [f32; 3] {
    let a = Vec3::from(a);
    (Vec3::from(b) - a)
        .cross(Vec3::from(c) - a)
        .try_normalize()
        .unwrap_or(Vec3::Y)
        .to_array()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_winding_faces_normal() {
        for dir in FaceDirection::ALL {
            let mut mesh = ChunkMesh::new();
            mesh.push_quad(dir, [0.0, 0.0, 0.0], 2.0, 3.0, Voxel::Stone, [1.0; 3]);
            for tri in mesh.indices.chunks(3) {
                let [p0, p1, p2] =
                    [0, 1, 2].map(|i| Vec3::from(mesh.vertices[tri[i] as usize].position));
                let n = (p1 - p0).cross(p2 - p0);
                assert!(
                    n.dot(Vec3::from(dir.normal())) > 0.0,
                    "{dir:?} triangle is back-facing"
                );
            }
        }
    }

    #[test]
    fn test_quad_counts() {
        let mut mesh = ChunkMesh::new();
        mesh.push_quad(FaceDirection::PosY, [0.0; 3], 1.0, 1.0, Voxel::Grass, [1.0; 3]);
        mesh.push_quad(FaceDirection::PosY, [1.0, 0.0, 0.0], 1.0, 1.0, Voxel::Grass, [1.0; 3]);
        mesh.push_quad(FaceDirection::NegX, [0.0; 3], 1.0, 1.0, Voxel::Grass, [1.0; 3]);
        assert_eq!(mesh.quad_count(), 3);
        assert_eq!(mesh.count_quads_for_direction(FaceDirection::PosY), 2);
        assert_eq!(mesh.triangle_count(), 6);
        assert_eq!(mesh.vertex_bytes().len(), 12 * 36);
        assert_eq!(mesh.index_bytes().len(), 18 * 4);
    }

    #[test]
    fn test_triangle_normal_is_unit() {
        let mut mesh = ChunkMesh::new();
        mesh.push_triangle(
            [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            [[1.0; 3]; 3],
        );
        assert_eq!(mesh.vertices[0].normal, [0.0, 0.0, 1.0]);
        assert_eq!(mesh.quad_count(), 0);
        assert!(!mesh.is_empty());
    }

    #[test]
    fn test_degenerate_triangle_faces_up() {
        let mut mesh = ChunkMesh::new();
        mesh.push_triangle([[2.0, 5.0, 1.0]; 3], [[1.0; 3]; 3]);
        assert_eq!(mesh.vertices[0].normal, [0.0, 1.0, 0.0]);

        let collinear = [[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [2.0, 2.0, 2.0]];
        assert_eq!(triangle_normal(collinear), [0.0, 1.0, 0.0]);
    }
}
