//! Seeded gradient noise.
//!
//! [`NoiseField`] is classic improved gradient noise over a permutation table
//! shuffled from the seed. Sampling uses only IEEE-754 addition,
//! multiplication and `floor`, so the same seed and coordinates produce the
//! same bits on every platform.

use noise::NoiseFn;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Size of the base permutation before duplication.
const PERM_SIZE: usize = 256;

/// An immutable, seeded noise function over ℝ² and ℝ³ with output in `[-1, 1]`.
#[derive(Clone)]
pub struct NoiseField {
    seed: u64,
    /// The shuffled permutation, duplicated so corner lookups never wrap.
    perm: [u8; PERM_SIZE * 2],
}

impl NoiseField {
    /// Builds the permutation for `seed` with a Fisher–Yates shuffle.
    pub fn new(seed: u64) -> Self {
        let mut base: [u8; PERM_SIZE] = std::array::from_fn(|i| i as u8);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        for i in (1..PERM_SIZE).rev() {
            let j = rng.random_range(0..=i);
            base.swap(i, j);
        }

        let mut perm = [0u8; PERM_SIZE * 2];
        perm[..PERM_SIZE].copy_from_slice(&base);
        perm[PERM_SIZE..].copy_from_slice(&base);
        Self { seed, perm }
    }

    /// Returns the seed this field was built from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Samples 2D noise. Equivalent to [`sample3`](Self::sample3) at `z = 0`.
    pub fn sample2(&self, x: f64, y: f64) -> f64 {
        self.sample3(x, y, 0.0)
    }

    /// Samples 3D noise in `[-1, 1]`.
    pub fn sample3(&self, x: f64, y: f64, z: f64) -> f64 {
        let (xf, yf, zf) = (x.floor(), y.floor(), z.floor());
        let xi = lattice(xf);
        let yi = lattice(yf);
        let zi = lattice(zf);

        let (x, y, z) = (x - xf, y - yf, z - zf);
        let (u, v, w) = (fade(x), fade(y), fade(z));

        let p = |i: usize| self.perm[i] as usize;
        let a = p(xi) + yi;
        let aa = p(a) + zi;
        let ab = p(a + 1) + zi;
        let b = p(xi + 1) + yi;
        let ba = p(b) + zi;
        let bb = p(b + 1) + zi;

        let value = lerp(
            w,
            lerp(
                v,
                lerp(u, grad(p(aa), x, y, z), grad(p(ba), x - 1.0, y, z)),
                lerp(
                    u,
                    grad(p(ab), x, y - 1.0, z),
                    grad(p(bb), x - 1.0, y - 1.0, z),
                ),
            ),
            lerp(
                v,
                lerp(
                    u,
                    grad(p(aa + 1), x, y, z - 1.0),
                    grad(p(ba + 1), x - 1.0, y, z - 1.0),
                ),
                lerp(
                    u,
                    grad(p(ab + 1), x, y - 1.0, z - 1.0),
                    grad(p(bb + 1), x - 1.0, y - 1.0, z - 1.0),
                ),
            ),
        );
        value.clamp(-1.0, 1.0)
    }
}

impl std::fmt::Debug for NoiseField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseField")
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}

impl NoiseFn<f64, 2> for NoiseField {
    fn get(&self, point: [f64; 2]) -> f64 {
        self.sample2(point[0], point[1])
    }
}

impl NoiseFn<f64, 3> for NoiseField {
    fn get(&self, point: [f64; 3]) -> f64 {
        self.sample3(point[0], point[1], point[2])
    }
}

/// Sums `octaves` layers of 2D noise, each at `lacunarity` times the previous
/// frequency and `persistence` times the previous amplitude, normalized back
/// into `[-1, 1]`.
pub fn fbm(
    field: &impl NoiseFn<f64, 2>,
    x: f64,
    z: f64,
    octaves: u32,
    lacunarity: f64,
    persistence: f64,
) -> f64 {
    let mut total = 0.0;
    let mut frequency = 1.0;
    let mut amplitude = 1.0;
    let mut max_amplitude = 0.0;
    for _ in 0..octaves.max(1) {
        total += field.get([x * frequency, z * frequency]) * amplitude;
        max_amplitude += amplitude;
        frequency *= lacunarity;
        amplitude *= persistence;
    }
    total / max_amplitude
}

/// Wraps a lattice coordinate into the permutation range.
#[inline]
fn lattice(floor: f64) -> usize {
    ((floor as i64) & (PERM_SIZE as i64 - 1)) as usize
}

/// Quintic smoothing curve `6t⁵ - 15t⁴ + 10t³`.
#[inline]
fn fade(t: f64) -> f64 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

#[inline]
fn lerp(t: f64, a: f64, b: f64) -> f64 {
    a + t * (b - a)
}

/// Dot product of the offset with one of the 12 cube-edge gradients.
#[inline]
fn grad(hash: usize, x: f64, y: f64, z: f64) -> f64 {
    let h = hash & 15;
    let u = if h < 8 { x } else { y };
    let v = if h < 4 {
        y
    } else if h == 12 || h == 14 {
        x
    } else {
        z
    };
    (if h & 1 == 0 { u } else { -u }) + (if h & 2 == 0 { v } else { -v })
}
