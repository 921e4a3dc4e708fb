//! Deterministic seed derivation and content hashing.
//!
//! Every noise purpose gets its own field seeded as the world seed plus a
//! fixed per-purpose offset, so one world seed reproduces every field.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use strata_voxel::Chunk;

// ---------------------------------------------------------------------------
// Per-purpose seed offsets
// ---------------------------------------------------------------------------

/// Offset for the continent-shape field.
pub const CONTINENT_SEED_OFFSET: u64 = 0;
/// Offset for the mountain-amplitude field.
pub const MOUNTAIN_SEED_OFFSET: u64 = 1_013;
/// Offset for the 3D detail field.
pub const DETAIL_SEED_OFFSET: u64 = 2_027;
/// Offset for the cave field.
pub const CAVE_SEED_OFFSET: u64 = 0xCAFE_BABE;
/// Offset for the floating-island field.
pub const ISLAND_SEED_OFFSET: u64 = 4_051;
/// Offset for the monolith field.
pub const MONOLITH_SEED_OFFSET: u64 = 5_077;
/// Offset for the region-blend field.
pub const REGION_SEED_OFFSET: u64 = 6_091;

/// Derives the seed for one noise purpose from the world seed.
#[inline]
pub fn derive_field_seed(world_seed: u64, offset: u64) -> u64 {
    world_seed.wrapping_add(offset)
}

// ---------------------------------------------------------------------------
// Determinism verification
// ---------------------------------------------------------------------------

/// Hashes a chunk's voxel content in index order.
///
/// Two chunks with equal hashes hold identical voxel arrays (modulo hash
/// collisions); used to check that generation is reproducible.
pub fn hash_chunk(chunk: &Chunk) -> u64 {
    let mut hasher = DefaultHasher::new();
    for voxel in chunk.snapshot() {
        voxel.ordinal().hash(&mut hasher);
    }
    hasher.finish()
}
