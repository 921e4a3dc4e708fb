//! The closed set of block kinds a voxel can hold.
//!
//! The discriminant of each variant is its ordinal byte in region files, so
//! variants must never be reordered.

use serde::{Deserialize, Serialize};

/// A single block kind. The kind is the only per-voxel payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Voxel {
    /// Empty space.
    #[default]
    Air = 0,
    /// Subsoil, found just below an exposed surface.
    Dirt = 1,
    /// Standard topsoil.
    Grass = 2,
    /// Bedrock below the subsoil band.
    Stone = 3,
    /// Shoreline topsoil at or below the water line.
    Sand = 4,
    /// Liquid filling empty space at or below the water line.
    Water = 5,
    /// Frozen topsoil above the snow line.
    Snow = 6,
    /// Frozen liquid. Never produced by generation.
    Ice = 7,
}

impl Voxel {
    /// Every variant, in ordinal order.
    pub const ALL: [Voxel; 8] = [
        Self::Air,
        Self::Dirt,
        Self::Grass,
        Self::Stone,
        Self::Sand,
        Self::Water,
        Self::Snow,
        Self::Ice,
    ];

    /// Returns the on-disk ordinal of this kind.
    #[inline]
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Decodes an on-disk ordinal. Returns `None` for bytes that name no kind.
    pub fn from_ordinal(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Air),
            1 => Some(Self::Dirt),
            2 => Some(Self::Grass),
            3 => Some(Self::Stone),
            4 => Some(Self::Sand),
            5 => Some(Self::Water),
            6 => Some(Self::Snow),
            7 => Some(Self::Ice),
            _ => None,
        }
    }

    /// Returns `true` for empty space. Only empty voxels expose faces.
    #[inline]
    pub fn is_empty(self) -> bool {
        matches!(self, Self::Air)
    }

    /// Returns `true` for any kind that occupies its cell.
    #[inline]
    pub fn is_solid(self) -> bool {
        !self.is_empty()
    }

    /// Returns `true` for liquid kinds.
    pub fn is_liquid(self) -> bool {
        matches!(self, Self::Water)
    }

    /// Returns `true` for the surface kinds a column can be topped with.
    pub fn is_topsoil(self) -> bool {
        match self {
            Self::Grass | Self::Sand | Self::Snow => true,
            Self::Air | Self::Dirt | Self::Stone | Self::Water | Self::Ice => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinals_roundtrip() {
        for voxel in Voxel::ALL {
            assert_eq!(Voxel::from_ordinal(voxel.ordinal()), Some(voxel));
        }
    }

    #[test]
    fn test_unknown_ordinal_rejected() {
        assert_eq!(Voxel::from_ordinal(8), None);
        assert_eq!(Voxel::from_ordinal(255), None);
    }

    #[test]
    fn test_only_air_is_empty() {
        for voxel in Voxel::ALL {
            assert_eq!(voxel.is_empty(), voxel == Voxel::Air, "{voxel:?}");
        }
    }

    #[test]
    fn test_default_is_air() {
        assert_eq!(Voxel::default(), Voxel::Air);
    }
}
