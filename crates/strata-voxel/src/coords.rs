//! Chunk, region, and voxel coordinate types.
//!
//! World voxel coordinates are split into a chunk coordinate and a local
//! offset with floor division and floor modulo, so negative coordinates land
//! in the chunk below zero rather than being truncated toward it.

use crate::face::FaceDirection;

/// Edge length of a chunk in voxels.
pub const CHUNK_SIZE: usize = 16;

/// Number of voxels in a chunk.
pub const CHUNK_VOLUME: usize = CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE;

/// Edge length of a region in chunks.
pub const REGION_SIZE: usize = 32;

/// Number of chunk slots in a region.
pub const REGION_VOLUME: usize = REGION_SIZE * REGION_SIZE * REGION_SIZE;

const CHUNK_SIZE_I64: i64 = CHUNK_SIZE as i64;
const REGION_SIZE_I64: i64 = REGION_SIZE as i64;

/// Largest chunk coordinate magnitude whose voxels are addressable in `i64`.
pub const MAX_CHUNK_COORD: i64 = i64::MAX / CHUNK_SIZE_I64;

/// Identifies a chunk's position in chunk space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoord {
    /// Chunk-grid X coordinate.
    pub x: i64,
    /// Chunk-grid Y coordinate.
    pub y: i64,
    /// Chunk-grid Z coordinate.
    pub z: i64,
}

impl ChunkCoord {
    /// Creates a new chunk coordinate.
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    /// Returns the coordinate offset by `(dx, dy, dz)` chunks.
    pub fn offset(self, dx: i64, dy: i64, dz: i64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }

    /// Returns the axis-adjacent chunk in the given direction.
    pub fn neighbor(self, dir: FaceDirection) -> Self {
        let [dx, dy, dz] = dir.delta();
        self.offset(dx, dy, dz)
    }

    /// Returns the world voxel coordinate of this chunk's minimum corner.
    ///
    /// # Panics
    ///
    /// Panics if any component exceeds [`MAX_CHUNK_COORD`] in magnitude.
    pub fn world_origin(self) -> BlockPos {
        let scale = |c: i64| {
            c.checked_mul(CHUNK_SIZE_I64)
                .unwrap_or_else(|| panic!("chunk coordinate {self} out of range"))
        };
        BlockPos::new(scale(self.x), scale(self.y), scale(self.z))
    }

    /// Returns the world coordinate of a voxel inside this chunk.
    pub fn block(self, local: LocalPos) -> BlockPos {
        let origin = self.world_origin();
        BlockPos::new(
            origin.x + local.x as i64,
            origin.y + local.y as i64,
            origin.z + local.z as i64,
        )
    }

    /// Squared Euclidean distance to `other`, in chunk units.
    ///
    /// Saturates at `u64::MAX` for coordinates far apart.
    pub fn distance_sq(self, other: ChunkCoord) -> u64 {
        let axis = |a: i64, b: i64| {
            let d = (i128::from(a) - i128::from(b)).unsigned_abs();
            d.saturating_mul(d)
        };
        let sum = axis(self.x, other.x)
            .saturating_add(axis(self.y, other.y))
            .saturating_add(axis(self.z, other.z));
        u64::try_from(sum).unwrap_or(u64::MAX)
    }

    /// Returns the region containing this chunk.
    pub fn region(self) -> RegionCoord {
        RegionCoord {
            x: self.x.div_euclid(REGION_SIZE_I64),
            y: self.y.div_euclid(REGION_SIZE_I64),
            z: self.z.div_euclid(REGION_SIZE_I64),
        }
    }

    /// Returns this chunk's slot index inside its region:
    /// `((lx * R) + ly) * R + lz`.
    pub fn region_slot(self) -> usize {
        let lx = self.x.rem_euclid(REGION_SIZE_I64) as usize;
        let ly = self.y.rem_euclid(REGION_SIZE_I64) as usize;
        let lz = self.z.rem_euclid(REGION_SIZE_I64) as usize;
        (lx * REGION_SIZE + ly) * REGION_SIZE + lz
    }
}

impl std::fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Identifies a region file: chunk coordinates floor-divided by [`REGION_SIZE`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionCoord {
    /// Region-grid X coordinate.
    pub x: i64,
    /// Region-grid Y coordinate.
    pub y: i64,
    /// Region-grid Z coordinate.
    pub z: i64,
}

/// A voxel position in world space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockPos {
    /// World X coordinate.
    pub x: i64,
    /// World Y coordinate.
    pub y: i64,
    /// World Z coordinate.
    pub z: i64,
}

impl BlockPos {
    /// Creates a new world position.
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    /// Returns the position offset by `(dx, dy, dz)` voxels.
    pub fn offset(self, dx: i64, dy: i64, dz: i64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }

    /// Splits into the owning chunk and the offset within it.
    pub fn split(self) -> (ChunkCoord, LocalPos) {
        let chunk = ChunkCoord::new(
            self.x.div_euclid(CHUNK_SIZE_I64),
            self.y.div_euclid(CHUNK_SIZE_I64),
            self.z.div_euclid(CHUNK_SIZE_I64),
        );
        let local = LocalPos::new(
            self.x.rem_euclid(CHUNK_SIZE_I64) as usize,
            self.y.rem_euclid(CHUNK_SIZE_I64) as usize,
            self.z.rem_euclid(CHUNK_SIZE_I64) as usize,
        );
        (chunk, local)
    }

    /// Returns the chunk containing this position.
    pub fn chunk(self) -> ChunkCoord {
        self.split().0
    }
}

/// A voxel position inside a chunk. Each component is in `0..CHUNK_SIZE`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LocalPos {
    /// Local X coordinate.
    pub x: usize,
    /// Local Y coordinate.
    pub y: usize,
    /// Local Z coordinate.
    pub z: usize,
}

impl LocalPos {
    /// Creates a local position. Range is checked on chunk access, not here.
    pub const fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    /// Returns the directions whose chunk boundary this position touches.
    ///
    /// An edit at such a position changes face visibility in the neighbor
    /// chunk on that side.
    pub fn boundary_faces(self) -> Vec<FaceDirection> {
        let last = CHUNK_SIZE - 1;
        let mut faces = Vec::new();
        if self.x == 0 {
            faces.push(FaceDirection::NegX);
        }
        if self.x == last {
            faces.push(FaceDirection::PosX);
        }
        if self.y == 0 {
            faces.push(FaceDirection::NegY);
        }
        if self.y == last {
            faces.push(FaceDirection::PosY);
        }
        if self.z == 0 {
            faces.push(FaceDirection::NegZ);
        }
        if self.z == last {
            faces.push(FaceDirection::PosZ);
        }
        faces
    }
}
