//! Column-based terrain synthesis.
//!
//! Seven independently seeded noise fields feed one scalar density function:
//! a very-low-frequency region-blend field decides how much each column looks
//! like rolling plains or jagged peaks, and gates the rarer monolith and
//! floating-island features. Voxels with positive density are solid and are
//! classified top-down so each exposed surface gets topsoil over a band of
//! subsoil over bedrock.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use strata_voxel::{
    BlockAccess, CHUNK_SIZE, CHUNK_VOLUME, Chunk, ChunkCoord, ChunkOrigin, DensitySampler, Voxel,
    voxel_index,
};

use crate::noise_field::{NoiseField, fbm};
use crate::seed::{
    CAVE_SEED_OFFSET, CONTINENT_SEED_OFFSET, DETAIL_SEED_OFFSET, ISLAND_SEED_OFFSET,
    MONOLITH_SEED_OFFSET, MOUNTAIN_SEED_OFFSET, REGION_SEED_OFFSET, derive_field_seed,
};

/// Number of subsoil voxels below an exposed surface before bedrock begins.
pub const SUBSOIL_DEPTH: u32 = 3;

/// Voxels scanned above a chunk's top so depth tracking does not depend on
/// where chunk boundaries fall.
const WARMUP: i64 = SUBSOIL_DEPTH as i64 + 1;

/// Tunable parameters for terrain generation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainParams {
    /// World seed. Every noise field derives from it.
    pub seed: u64,
    /// Empty space at or below this height fills with water, and topsoil
    /// becomes sand.
    pub water_line: i64,
    /// Topsoil above this height becomes snow.
    pub snow_line: i64,
    /// Surface height before any noise is applied.
    pub base_height: f64,
    /// Frequency of the continent-shape field.
    pub continent_frequency: f64,
    /// Peak height contribution of the continent field.
    pub continent_amplitude: f64,
    /// Octaves summed for the continent field.
    pub continent_octaves: u32,
    /// Frequency of the ridged mountain field.
    pub mountain_frequency: f64,
    /// Peak height contribution of mountains in fully mountainous regions.
    pub mountain_amplitude: f64,
    /// Frequency of the 3D detail field that creates overhangs.
    pub detail_frequency: f64,
    /// Density perturbation of the detail field.
    pub detail_amplitude: f64,
    /// Frequency of the region-blend field.
    pub region_frequency: f64,
    /// Whether caves are carved.
    pub caves_enabled: bool,
    /// Frequency of the cave field.
    pub cave_frequency: f64,
    /// Cave noise above this value carves solid voxels.
    pub cave_threshold: f64,
    /// Region blend above which floating islands may appear.
    pub island_threshold: f64,
    /// Frequency of the island field.
    pub island_frequency: f64,
    /// Height of the island band's center.
    pub island_altitude: f64,
    /// Vertical extent of the island band.
    pub island_thickness: f64,
    /// Region blend above which monoliths may appear.
    pub monolith_threshold: f64,
    /// Frequency of the monolith field.
    pub monolith_frequency: f64,
    /// Height a monolith adds on top of the surface.
    pub monolith_height: f64,
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            seed: 0,
            water_line: 0,
            snow_line: 80,
            base_height: 8.0,
            continent_frequency: 0.004,
            continent_amplitude: 24.0,
            continent_octaves: 4,
            mountain_frequency: 0.012,
            mountain_amplitude: 72.0,
            detail_frequency: 0.07,
            detail_amplitude: 4.0,
            region_frequency: 0.0015,
            caves_enabled: true,
            cave_frequency: 0.06,
            cave_threshold: 0.45,
            island_threshold: 0.72,
            island_frequency: 0.03,
            island_altitude: 110.0,
            island_thickness: 24.0,
            monolith_threshold: 0.8,
            monolith_frequency: 0.045,
            monolith_height: 40.0,
        }
    }
}

impl TerrainParams {
    /// A featureless world whose surface sits at `surface_height` everywhere.
    ///
    /// Noise amplitudes are zero and every gated feature is disabled, which
    /// makes classification predictable.
    pub fn flat(surface_height: f64) -> Self {
        Self {
            base_height: surface_height,
            continent_amplitude: 0.0,
            mountain_amplitude: 0.0,
            detail_amplitude: 0.0,
            caves_enabled: false,
            island_threshold: 2.0,
            monolith_threshold: 2.0,
            ..Self::default()
        }
    }
}

/// Per-column values shared by every voxel in the column.
#[derive(Clone, Copy, Debug)]
struct Column {
    /// Region blend factor in `[0, 1]`.
    region: f64,
    /// Surface height before 3D perturbation.
    surface: f64,
}

/// Fills chunks with terrain for one world seed.
pub struct TerrainGenerator {
    params: TerrainParams,
    continent: NoiseField,
    mountain: NoiseField,
    detail: NoiseField,
    cave: NoiseField,
    island: NoiseField,
    monolith: NoiseField,
    region: NoiseField,
    generated: AtomicU64,
}

impl TerrainGenerator {
    /// Seeds every noise field from `params.seed`.
    pub fn new(params: TerrainParams) -> Self {
        let field = |offset| NoiseField::new(derive_field_seed(params.seed, offset));
        Self {
            continent: field(CONTINENT_SEED_OFFSET),
            mountain: field(MOUNTAIN_SEED_OFFSET),
            detail: field(DETAIL_SEED_OFFSET),
            cave: field(CAVE_SEED_OFFSET),
            island: field(ISLAND_SEED_OFFSET),
            monolith: field(MONOLITH_SEED_OFFSET),
            region: field(REGION_SEED_OFFSET),
            params,
            generated: AtomicU64::new(0),
        }
    }

    /// Returns the generation parameters.
    pub fn params(&self) -> &TerrainParams {
        &self.params
    }

    /// Number of chunks this generator has filled.
    pub fn generated_count(&self) -> u64 {
        self.generated.load(Ordering::Relaxed)
    }

    /// Populates every voxel of `chunk` from its coordinate alone.
    ///
    /// The chunk must not yet be visible to other readers. No other chunk is
    /// read or written.
    pub fn fill(&self, chunk: &Chunk) {
        let voxels = self.generate(chunk.coord());
        chunk.fill(&voxels, ChunkOrigin::Generated);
        self.generated.fetch_add(1, Ordering::Relaxed);
    }

    /// Computes the voxels for the chunk at `coord` in index order.
    pub fn generate(&self, coord: ChunkCoord) -> Vec<Voxel> {
        let origin = coord.world_origin();
        let top = origin.y + CHUNK_SIZE as i64 - 1;
        let mut voxels = vec![Voxel::Air; CHUNK_VOLUME];

        for lx in 0..CHUNK_SIZE {
            for lz in 0..CHUNK_SIZE {
                let x = (origin.x + lx as i64) as f64;
                let z = (origin.z + lz as i64) as f64;
                let column = self.column(x, z);

                let start = top + WARMUP;
                let mut run = if self.is_solid_uncarved(x, (start + 1) as f64, z, column) {
                    SUBSOIL_DEPTH + 1
                } else {
                    0
                };

                for y in (origin.y..=start).rev() {
                    let yf = y as f64;
                    let density = self.density_in_column(x, yf, z, column);
                    let voxel = if density > 0.0 && !self.is_cave(x, yf, z) {
                        let voxel = match run {
                            0 => self.surface_kind(y),
                            r if r <= SUBSOIL_DEPTH => Voxel::Dirt,
                            _ => Voxel::Stone,
                        };
                        run = run.saturating_add(1);
                        voxel
                    } else {
                        run = 0;
                        self.empty_kind(y)
                    };
                    if y <= top {
                        let ly = (y - origin.y) as usize;
                        voxels[voxel_index(lx, ly, lz)] = voxel;
                    }
                }
            }
        }
        voxels
    }

    /// Classifies an exposed surface voxel at height `y`.
    pub fn surface_kind(&self, y: i64) -> Voxel {
        if y > self.params.snow_line {
            Voxel::Snow
        } else if y <= self.params.water_line {
            Voxel::Sand
        } else {
            Voxel::Grass
        }
    }

    /// Kind used for non-solid space at height `y`.
    pub fn empty_kind(&self, y: i64) -> Voxel {
        if y <= self.params.water_line {
            Voxel::Water
        } else {
            Voxel::Air
        }
    }

    /// Density at a world point, without classification or caves.
    pub fn sample_density(&self, x: f64, y: f64, z: f64) -> f64 {
        self.density_in_column(x, y, z, self.column(x, z))
    }

    /// Scans every resident chunk in the column containing `(x, z)` from the
    /// top down and returns the highest non-empty world y.
    pub fn find_surface_y(&self, world: &impl BlockAccess, x: i64, z: i64) -> Option<i64> {
        let size = CHUNK_SIZE as i64;
        let (cx, lx) = (x.div_euclid(size), x.rem_euclid(size) as usize);
        let (cz, lz) = (z.div_euclid(size), z.rem_euclid(size) as usize);

        let mut ys = world.loaded_chunk_ys(cx, cz);
        ys.sort_unstable_by(|a, b| b.cmp(a));
        for cy in ys {
            let Some(chunk) = world.loaded_chunk(ChunkCoord::new(cx, cy, cz)) else {
                continue;
            };
            for ly in (0..CHUNK_SIZE).rev() {
                if chunk.get(lx, ly, lz).is_solid() {
                    return Some(cy * size + ly as i64);
                }
            }
        }
        None
    }

    // -----------------------------------------------------------------------
    // Density
    // -----------------------------------------------------------------------

    fn column(&self, x: f64, z: f64) -> Column {
        let p = &self.params;
        let region = (self.region.sample2(x * p.region_frequency, z * p.region_frequency) + 1.0)
            * 0.5;

        let continent = fbm(
            &self.continent,
            x * p.continent_frequency,
            z * p.continent_frequency,
            p.continent_octaves,
            2.0,
            0.5,
        );
        let ridge = 1.0
            - fbm(
                &self.mountain,
                x * p.mountain_frequency,
                z * p.mountain_frequency,
                3,
                2.0,
                0.5,
            )
            .abs();

        let surface = p.base_height
            + continent * p.continent_amplitude * (1.0 - region * 0.5)
            + ridge * ridge * p.mountain_amplitude * region * region;
        Column { region, surface }
    }

    fn density_in_column(&self, x: f64, y: f64, z: f64, column: Column) -> f64 {
        let p = &self.params;
        let mut density = column.surface - y;
        if p.detail_amplitude != 0.0 {
            density += self.detail.sample3(
                x * p.detail_frequency,
                y * p.detail_frequency,
                z * p.detail_frequency,
            ) * p.detail_amplitude;
        }
        if let Some(gate) = gate(column.region, p.monolith_threshold) {
            density += self.monolith_height(x, z) * gate;
        }
        if let Some(gate) = gate(column.region, p.island_threshold) {
            density = density.max(self.island_density(x, y, z, gate));
        }
        density
    }

    /// Extra column height contributed by a monolith pillar.
    fn monolith_height(&self, x: f64, z: f64) -> f64 {
        let f = self.params.monolith_frequency;
        let m = self.monolith.sample2(x * f, z * f);
        // Steep ramp so pillars have near-vertical walls.
        let t = ((m - 0.45) * 10.0).clamp(0.0, 1.0);
        t * self.params.monolith_height
    }

    fn island_density(&self, x: f64, y: f64, z: f64, gate: f64) -> f64 {
        let p = &self.params;
        let half = p.island_thickness * 0.5;
        let dy = (y - p.island_altitude).abs();
        if dy >= p.island_thickness {
            return f64::NEG_INFINITY;
        }
        let f = p.island_frequency;
        let shape = self.island.sample3(x * f, y * f * 2.0, z * f);
        half * gate * (shape + 0.35) - dy
    }

    fn is_cave(&self, x: f64, y: f64, z: f64) -> bool {
        let p = &self.params;
        p.caves_enabled
            && self
                .cave
                .sample3(x * p.cave_frequency, y * p.cave_frequency, z * p.cave_frequency)
                > p.cave_threshold
    }

    fn is_solid_uncarved(&self, x: f64, y: f64, z: f64, column: Column) -> bool {
        self.density_in_column(x, y, z, column) > 0.0 && !self.is_cave(x, y, z)
    }
}

/// Maps a region blend above `threshold` to a `(0, 1]` strength.
fn gate(region: f64, threshold: f64) -> Option<f64> {
    (region > threshold && threshold < 1.0).then(|| (region - threshold) / (1.0 - threshold))
}

impl DensitySampler for TerrainGenerator {
    fn sample_density(&self, x: f64, y: f64, z: f64) -> f64 {
        TerrainGenerator::sample_density(self, x, y, z)
    }

    fn water_line(&self) -> f64 {
        self.params.water_line as f64
    }

    fn snow_line(&self) -> f64 {
        self.params.snow_line as f64
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
