//! Mesh building: greedy block meshing, heightmap LOD meshing and smooth
//! isosurface extraction.

mod greedy;
mod lod;
mod marching;
pub mod palette;

#[cfg(test)]
mod test_world;

pub use greedy::Mesher;
pub use marching::build_smooth;
pub use palette::{base_color, face_shade, shaded_color};
