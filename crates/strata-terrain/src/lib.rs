//! Procedural terrain: seeded gradient noise and the multi-field generator
//! that fills chunks from world coordinates alone.

mod generator;
mod noise_field;
pub mod seed;

pub use generator::{SUBSOIL_DEPTH, TerrainGenerator, TerrainParams};
pub use noise_field::{NoiseField, fbm};
pub use seed::{derive_field_seed, hash_chunk};
