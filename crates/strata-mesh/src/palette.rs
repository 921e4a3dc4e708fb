//! Block colors and per-face shading.

use strata_voxel::{FaceDirection, Voxel};

/// Base linear RGB color of a block kind.
pub fn base_color(voxel: Voxel) -> [f32; 3] {
    match voxel {
        Voxel::Air => [1.0, 1.0, 1.0],
        Voxel::Grass => [0.235, 0.69, 0.26],
        Voxel::Dirt => [0.545, 0.27, 0.075],
        Voxel::Stone => [0.5, 0.5, 0.5],
        Voxel::Sand => [0.86, 0.8, 0.55],
        Voxel::Water => [0.0, 0.3, 0.8],
        Voxel::Snow => [1.0, 1.0, 1.0],
        Voxel::Ice => [0.7, 0.85, 0.95],
    }
}

/// Brightness multiplier for a face, faking a light from above.
pub fn face_shade(direction: FaceDirection) -> f32 {
    match direction {
        FaceDirection::PosY => 1.0,
        FaceDirection::PosZ => 0.9,
        FaceDirection::NegZ => 0.8,
        FaceDirection::PosX | FaceDirection::NegX => 0.7,
        FaceDirection::NegY => 0.5,
    }
}

/// Color of a block face with shading applied.
pub fn shaded_color(voxel: Voxel, direction: FaceDirection) -> [f32; 3] {
    let shade = face_shade(direction);
    base_color(voxel).map(|c| c * shade)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_face_is_unshaded() {
        assert_eq!(
            shaded_color(Voxel::Grass, FaceDirection::PosY),
            base_color(Voxel::Grass)
        );
    }

    #[test]
    fn test_bottom_face_is_darkest() {
        for dir in FaceDirection::ALL {
            assert!(face_shade(FaceDirection::NegY) <= face_shade(dir));
        }
    }
}
