//! Voxel storage: block kinds, coordinates, chunks with their derived mesh
//! state, and the region-file store that persists them.

pub mod access;
pub mod chunk;
pub mod coords;
pub mod face;
pub mod mesh;
pub mod region;
pub mod voxel;

pub use access::{BlockAccess, DensitySampler};
pub use chunk::{Chunk, ChunkOrigin, voxel_index};
pub use coords::{
    BlockPos, CHUNK_SIZE, CHUNK_VOLUME, ChunkCoord, LocalPos, MAX_CHUNK_COORD, REGION_SIZE,
    REGION_VOLUME, RegionCoord,
};
pub use face::FaceDirection;
pub use mesh::{ChunkMesh, MeshVertex, QuadInfo};
pub use region::{HEADER_BYTES, RegionError, RegionStore, SLOT_BYTES};
pub use voxel::Voxel;
