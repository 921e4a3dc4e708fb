//! A fixed-size voxel grid plus the derived state the world and meshers track
//! for it: mesh dirtiness, save dirtiness, per-LOD mesh cache, face solidity,
//! occlusion, and where the content came from.
//!
//! Chunks are shared between the world map, worker threads, and the render
//! thread behind an `Arc`, so all state uses interior mutability. Voxels are
//! stored as one atomic byte each: a mesher reading a chunk while it is being
//! edited sees some mix of old and new voxels and is told to rebuild through
//! the dirty flag afterwards.
//!
//! Dirtiness is tracked with epochs rather than booleans. Every write bumps an
//! epoch; a mesh records the epoch it was built from, and the chunk is clean
//! only while no newer epoch exists. This keeps an edit that lands while a
//! mesh is being built from being lost when that mesh is installed.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashMap;

use crate::coords::{CHUNK_SIZE, CHUNK_VOLUME, ChunkCoord};
use crate::face::FaceDirection;
use crate::mesh::ChunkMesh;
use crate::voxel::Voxel;

/// Face-solidity cache value before the first computation. Its version
/// bits never match a real version.
const SOLIDITY_UNKNOWN: u64 = u64::MAX;

/// Packs a face mask with the content version it was computed from.
fn tag_solidity(version: u64, mask: u8) -> u64 {
    (version << 8) | u64::from(mask)
}

/// Where a chunk's current content came from. Diagnostics only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkOrigin {
    /// Produced by the terrain generator.
    Generated = 1,
    /// Read back from a region file.
    Loaded = 2,
}

impl ChunkOrigin {
    fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Generated),
            2 => Some(Self::Loaded),
            _ => None,
        }
    }
}

/// Cached mesh for one coarse LOD step.
#[derive(Debug, Default)]
struct LodSlot {
    mesh: Option<Arc<ChunkMesh>>,
    meshed_epoch: u64,
    known_empty: bool,
}

/// Returns the flat index of a local voxel: x-major, then y, then z.
///
/// This is also the byte order of a chunk slot in a region file.
#[inline]
pub fn voxel_index(x: usize, y: usize, z: usize) -> usize {
    (x * CHUNK_SIZE + y) * CHUNK_SIZE + z
}

/// A cubic grid of [`CHUNK_SIZE`]³ voxels with dirty tracking and a mesh cache.
pub struct Chunk {
    coord: ChunkCoord,
    voxels: Box<[AtomicU8]>,
    origin: AtomicU8,
    /// Incremented on every voxel mutation.
    version: AtomicU64,
    /// Version most recently written to disk.
    saved_version: AtomicU64,
    /// Incremented on voxel mutation and on neighbor-boundary changes.
    mesh_epoch: AtomicU64,
    /// Epoch the primary mesh was built from.
    meshed_epoch: AtomicU64,
    /// Incremented on voxel mutation and on horizontal neighbor changes.
    lod_epoch: AtomicU64,
    primary: Mutex<Option<Arc<ChunkMesh>>>,
    lods: Mutex<FxHashMap<u32, LodSlot>>,
    /// Last face mask, tagged with its version by [`tag_solidity`].
    face_solidity: AtomicU64,
    occluded: AtomicBool,
}

impl Chunk {
    /// Creates an all-empty chunk at `coord`. Its mesh starts dirty.
    pub fn new(coord: ChunkCoord) -> Self {
        let voxels = (0..CHUNK_VOLUME)
            .map(|_| AtomicU8::new(Voxel::Air.ordinal()))
            .collect();
        Self {
            coord,
            voxels,
            origin: AtomicU8::new(0),
            version: AtomicU64::new(0),
            saved_version: AtomicU64::new(0),
            mesh_epoch: AtomicU64::new(1),
            meshed_epoch: AtomicU64::new(0),
            lod_epoch: AtomicU64::new(1),
            primary: Mutex::new(None),
            lods: Mutex::new(FxHashMap::default()),
            face_solidity: AtomicU64::new(SOLIDITY_UNKNOWN),
            occluded: AtomicBool::new(false),
        }
    }

    /// Returns the chunk's coordinate.
    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    // -----------------------------------------------------------------------
    // Voxel access
    // -----------------------------------------------------------------------

    /// Returns the voxel at local `(x, y, z)`.
    ///
    /// # Panics
    ///
    /// Panics if any coordinate is `>= CHUNK_SIZE`.
    pub fn get(&self, x: usize, y: usize, z: usize) -> Voxel {
        assert_in_bounds(x, y, z);
        let raw = self.voxels[voxel_index(x, y, z)].load(Ordering::Relaxed);
        // Only valid ordinals are ever stored.
        Voxel::from_ordinal(raw).unwrap_or_default()
    }

    /// Writes the voxel at local `(x, y, z)`.
    ///
    /// Marks the primary mesh and every LOD mesh dirty, clears known-empty LOD
    /// markers, and flags the chunk as needing a save.
    ///
    /// # Panics
    ///
    /// Panics if any coordinate is `>= CHUNK_SIZE`.
    pub fn set(&self, x: usize, y: usize, z: usize, voxel: Voxel) {
        assert_in_bounds(x, y, z);
        self.voxels[voxel_index(x, y, z)].store(voxel.ordinal(), Ordering::Relaxed);
        self.content_changed();
    }

    /// Replaces every voxel at once, in [`voxel_index`] order.
    ///
    /// Used by generation and loading before the chunk is visible to other
    /// readers. Loaded content counts as already saved.
    ///
    /// # Panics
    ///
    /// Panics if `voxels.len() != CHUNK_VOLUME`.
    pub fn fill(&self, voxels: &[Voxel], origin: ChunkOrigin) {
        assert_eq!(
            voxels.len(),
            CHUNK_VOLUME,
            "chunk fill requires exactly {CHUNK_VOLUME} voxels"
        );
        for (cell, voxel) in self.voxels.iter().zip(voxels) {
            cell.store(voxel.ordinal(), Ordering::Relaxed);
        }
        self.origin.store(origin as u8, Ordering::Relaxed);
        let version = self.content_changed();
        if origin == ChunkOrigin::Loaded {
            self.mark_saved(version);
        }
    }

    /// Copies all voxels out in [`voxel_index`] order.
    pub fn snapshot(&self) -> Vec<Voxel> {
        self.voxels
            .iter()
            .map(|cell| Voxel::from_ordinal(cell.load(Ordering::Relaxed)).unwrap_or_default())
            .collect()
    }

    /// Returns `true` if every voxel is empty.
    pub fn is_empty(&self) -> bool {
        self.voxels
            .iter()
            .all(|cell| cell.load(Ordering::Relaxed) == Voxel::Air.ordinal())
    }

    /// Returns the origin of the current content, or `None` before the first fill.
    pub fn origin(&self) -> Option<ChunkOrigin> {
        ChunkOrigin::from_u8(self.origin.load(Ordering::Relaxed))
    }

    /// Bumps every counter a voxel mutation invalidates. Returns the new version.
    fn content_changed(&self) -> u64 {
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        self.mesh_epoch.fetch_add(1, Ordering::AcqRel);
        self.lod_epoch.fetch_add(1, Ordering::AcqRel);
        for slot in self.lock_lods().values_mut() {
            slot.known_empty = false;
        }
        version
    }

    // -----------------------------------------------------------------------
    // Save tracking
    // -----------------------------------------------------------------------

    /// Returns the content version, incremented on every mutation.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Returns `true` if the content differs from the last successful save.
    pub fn needs_save(&self) -> bool {
        self.saved_version.load(Ordering::Acquire) != self.version()
    }

    /// Records that `version` reached disk.
    ///
    /// Callers snapshot [`version`](Self::version) before serializing. If an
    /// edit arrived after the snapshot the chunk keeps needing a save.
    pub fn mark_saved(&self, version: u64) {
        self.saved_version.fetch_max(version, Ordering::AcqRel);
    }

    // -----------------------------------------------------------------------
    // Primary mesh
    // -----------------------------------------------------------------------

    /// Returns `true` while the primary mesh is absent or stale.
    pub fn is_dirty(&self) -> bool {
        self.meshed_epoch.load(Ordering::Acquire) < self.mesh_epoch.load(Ordering::Acquire)
    }

    /// Marks the primary mesh stale without touching voxels.
    ///
    /// Used when a neighbor's boundary changes. LOD meshes are unaffected.
    pub fn mark_dirty(&self) {
        self.mesh_epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Snapshot to pass to [`set_mesh`](Self::set_mesh) once the build finishes.
    pub fn mesh_epoch(&self) -> u64 {
        self.mesh_epoch.load(Ordering::Acquire)
    }

    /// Returns the cached primary mesh, if one has been built.
    pub fn get_mesh(&self) -> Option<Arc<ChunkMesh>> {
        lock(&self.primary).clone()
    }

    /// Installs a freshly built primary mesh and returns the one it replaces.
    ///
    /// `epoch` is the [`mesh_epoch`](Self::mesh_epoch) read before the build
    /// started; the chunk stays dirty if anything changed since.
    pub fn set_mesh(&self, mesh: ChunkMesh, epoch: u64) -> Option<Arc<ChunkMesh>> {
        let old = lock(&self.primary).replace(Arc::new(mesh));
        self.meshed_epoch.fetch_max(epoch, Ordering::AcqRel);
        old
    }

    /// Removes the primary mesh, leaving the chunk dirty.
    pub fn take_mesh(&self) -> Option<Arc<ChunkMesh>> {
        let old = lock(&self.primary).take();
        self.meshed_epoch.store(0, Ordering::Release);
        old
    }

    // -----------------------------------------------------------------------
    // LOD meshes
    // -----------------------------------------------------------------------

    /// Marks every LOD mesh stale without touching voxels.
    ///
    /// LOD walls at the chunk edge compare against the horizontal neighbors'
    /// cell heights, so any edit or arrival next door calls this.
    pub fn mark_lod_dirty(&self) {
        self.lod_epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Snapshot to pass to [`set_lod_mesh`](Self::set_lod_mesh).
    pub fn lod_epoch(&self) -> u64 {
        self.lod_epoch.load(Ordering::Acquire)
    }

    /// Returns `true` if the LOD mesh for `step` is absent or stale.
    pub fn is_lod_dirty(&self, step: u32) -> bool {
        let current = self.lod_epoch();
        self.lock_lods()
            .get(&step)
            .is_none_or(|slot| slot.meshed_epoch < current)
    }

    /// Returns `true` if the last clean build for `step` produced no geometry.
    pub fn is_lod_known_empty(&self, step: u32) -> bool {
        let current = self.lod_epoch();
        self.lock_lods()
            .get(&step)
            .is_some_and(|slot| slot.known_empty && slot.meshed_epoch >= current)
    }

    /// Returns the cached LOD mesh for `step`.
    pub fn get_lod_mesh(&self, step: u32) -> Option<Arc<ChunkMesh>> {
        self.lock_lods().get(&step).and_then(|slot| slot.mesh.clone())
    }

    /// Installs a LOD mesh built from `epoch` and returns the one it replaces.
    ///
    /// An empty mesh is not stored; the step is recorded as known-empty instead.
    pub fn set_lod_mesh(&self, step: u32, mesh: ChunkMesh, epoch: u64) -> Option<Arc<ChunkMesh>> {
        assert!(step >= 2, "LOD step 1 is the primary mesh");
        let mut lods = self.lock_lods();
        let slot = lods.entry(step).or_default();
        slot.meshed_epoch = slot.meshed_epoch.max(epoch);
        if mesh.is_empty() {
            slot.known_empty = true;
            slot.mesh.take()
        } else {
            slot.known_empty = false;
            slot.mesh.replace(Arc::new(mesh))
        }
    }

    /// Drops the cached mesh for one LOD step and returns it for disposal.
    pub fn take_lod_mesh(&self, step: u32) -> Option<Arc<ChunkMesh>> {
        self.lock_lods().remove(&step).and_then(|slot| slot.mesh)
    }

    /// Drops every cached mesh, primary and LOD, returning them for disposal.
    pub fn take_all_meshes(&self) -> Vec<Arc<ChunkMesh>> {
        let mut meshes: Vec<_> = self.take_mesh().into_iter().collect();
        meshes.extend(self.lock_lods().drain().filter_map(|(_, slot)| slot.mesh));
        meshes
    }

    fn lock_lods(&self) -> MutexGuard<'_, FxHashMap<u32, LodSlot>> {
        lock(&self.lods)
    }

    // -----------------------------------------------------------------------
    // Face solidity and occlusion
    // -----------------------------------------------------------------------

    /// Returns a 6-bit mask with [`FaceDirection::bit`] set for every boundary
    /// face of the chunk that is completely covered by non-empty voxels.
    ///
    /// The cached mask is trusted only while the content version it was
    /// computed from is still current, so a store racing an edit can leave a
    /// stale entry but never a stale answer.
    pub fn face_solidity(&self) -> u8 {
        let version = self.version();
        let cached = self.face_solidity.load(Ordering::Acquire);
        if cached != SOLIDITY_UNKNOWN && cached >> 8 == version {
            return cached as u8;
        }
        let mask = FaceDirection::ALL
            .into_iter()
            .filter(|&dir| self.is_face_solid(dir))
            .fold(0u8, |acc, dir| acc | dir.bit());
        self.face_solidity
            .store(tag_solidity(version, mask), Ordering::Release);
        mask
    }

    /// Returns `true` if the given boundary face is fully covered.
    pub fn is_face_solid(&self, dir: FaceDirection) -> bool {
        let (layer_axis, u_axis, v_axis) = dir.sweep_axes();
        let layer = if dir.is_positive() { CHUNK_SIZE - 1 } else { 0 };
        (0..CHUNK_SIZE).all(|v| {
            (0..CHUNK_SIZE).all(|u| {
                let mut p = [0usize; 3];
                p[layer_axis] = layer;
                p[u_axis] = u;
                p[v_axis] = v;
                self.get(p[0], p[1], p[2]).is_solid()
            })
        })
    }

    /// Returns the occlusion flag last set by the renderer.
    pub fn is_occluded(&self) -> bool {
        self.occluded.load(Ordering::Relaxed)
    }

    /// Records the renderer's occlusion result for this chunk.
    pub fn set_occluded(&self, occluded: bool) {
        self.occluded.store(occluded, Ordering::Relaxed);
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("coord", &self.coord)
            .field("origin", &self.origin())
            .field("version", &self.version())
            .field("dirty", &self.is_dirty())
            .field("needs_save", &self.needs_save())
            .finish_non_exhaustive()
    }
}

fn assert_in_bounds(x: usize, y: usize, z: usize) {
    assert!(
        x < CHUNK_SIZE && y < CHUNK_SIZE && z < CHUNK_SIZE,
        "local voxel ({x}, {y}, {z}) out of range 0..{CHUNK_SIZE}"
    );
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::FaceDirection;

    fn quad_mesh() -> ChunkMesh {
        let mut mesh = ChunkMesh::new();
        mesh.push_quad(FaceDirection::PosY, [0.0; 3], 1.0, 1.0, Voxel::Stone, [1.0; 3]);
        mesh
    }

    fn origin() -> ChunkCoord {
        ChunkCoord::new(0, 0, 0)
    }

    #[test]
    fn test_new_chunk_is_empty_and_dirty() {
        let chunk = Chunk::new(origin());
        assert!(chunk.is_empty());
        assert!(chunk.is_dirty(), "new chunk must start dirty");
        assert!(!chunk.needs_save());
        assert_eq!(chunk.origin(), None);
    }

    #[test]
    fn test_set_get_roundtrip() {
        let chunk = Chunk::new(origin());
        chunk.set(1, 2, 3, Voxel::Stone);
        assert_eq!(chunk.get(1, 2, 3), Voxel::Stone);
        assert_eq!(chunk.get(3, 2, 1), Voxel::Air);
        assert!(chunk.needs_save());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_get_panics() {
        let chunk = Chunk::new(origin());
        chunk.get(CHUNK_SIZE, 0, 0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_set_panics() {
        let chunk = Chunk::new(origin());
        chunk.set(0, 0, 16, Voxel::Dirt);
    }

    #[test]
    fn test_index_order_is_x_major() {
        assert_eq!(voxel_index(0, 0, 1), 1);
        assert_eq!(voxel_index(0, 1, 0), CHUNK_SIZE);
        assert_eq!(voxel_index(1, 0, 0), CHUNK_SIZE * CHUNK_SIZE);
    }

    #[test]
    fn test_generated_fill_needs_save_loaded_does_not() {
        let voxels = vec![Voxel::Stone; CHUNK_VOLUME];

        let generated = Chunk::new(origin());
        generated.fill(&voxels, ChunkOrigin::Generated);
        assert!(generated.needs_save());
        assert_eq!(generated.origin(), Some(ChunkOrigin::Generated));

        let loaded = Chunk::new(origin());
        loaded.fill(&voxels, ChunkOrigin::Loaded);
        assert!(!loaded.needs_save());
        assert_eq!(loaded.origin(), Some(ChunkOrigin::Loaded));
        assert_eq!(loaded.snapshot(), voxels);
    }

    #[test]
    fn test_mark_saved_ignores_stale_version() {
        let chunk = Chunk::new(origin());
        chunk.set(0, 0, 0, Voxel::Dirt);
        let snapshot = chunk.version();
        chunk.set(0, 0, 1, Voxel::Dirt);
        chunk.mark_saved(snapshot);
        assert!(chunk.needs_save(), "edit after snapshot must keep needs_save");
        chunk.mark_saved(chunk.version());
        assert!(!chunk.needs_save());
    }

    #[test]
    fn test_set_mesh_clears_dirty() {
        let chunk = Chunk::new(origin());
        let epoch = chunk.mesh_epoch();
        assert!(chunk.set_mesh(quad_mesh(), epoch).is_none());
        assert!(!chunk.is_dirty());
        assert!(chunk.get_mesh().is_some());
    }

    #[test]
    fn test_edit_during_build_keeps_dirty() {
        let chunk = Chunk::new(origin());
        let epoch = chunk.mesh_epoch();
        chunk.set(4, 4, 4, Voxel::Grass);
        chunk.set_mesh(quad_mesh(), epoch);
        assert!(chunk.is_dirty(), "edit after the snapshot must not be lost");
    }

    #[test]
    fn test_neighbor_mark_dirty_leaves_lod_clean() {
        let chunk = Chunk::new(origin());
        chunk.set_mesh(quad_mesh(), chunk.mesh_epoch());
        chunk.set_lod_mesh(2, quad_mesh(), chunk.lod_epoch());

        chunk.mark_dirty();
        assert!(chunk.is_dirty());
        assert!(!chunk.is_lod_dirty(2));
    }

    #[test]
    fn test_mark_lod_dirty_leaves_primary_clean() {
        let chunk = Chunk::new(origin());
        chunk.set_mesh(quad_mesh(), chunk.mesh_epoch());
        chunk.set_lod_mesh(2, quad_mesh(), chunk.lod_epoch());
        chunk.set_lod_mesh(8, ChunkMesh::new(), chunk.lod_epoch());
        let version = chunk.version();

        chunk.mark_lod_dirty();
        assert!(chunk.is_lod_dirty(2));
        assert!(chunk.is_lod_dirty(8));
        assert!(!chunk.is_lod_known_empty(8), "stale marker is not trusted");
        assert!(!chunk.is_dirty());
        assert_eq!(chunk.version(), version, "no content change");
    }

    #[test]
    fn test_primary_rebuild_does_not_clear_lod_dirty() {
        let chunk = Chunk::new(origin());
        chunk.set_lod_mesh(4, quad_mesh(), chunk.lod_epoch());
        chunk.set(0, 0, 0, Voxel::Stone);
        chunk.set_mesh(quad_mesh(), chunk.mesh_epoch());
        assert!(!chunk.is_dirty());
        assert!(chunk.is_lod_dirty(4));
    }

    #[test]
    fn test_lod_steps_tracked_independently() {
        let chunk = Chunk::new(origin());
        assert!(chunk.is_lod_dirty(2));
        chunk.set_lod_mesh(2, quad_mesh(), chunk.lod_epoch());
        assert!(!chunk.is_lod_dirty(2));
        assert!(chunk.is_lod_dirty(4), "unbuilt step stays dirty");
    }

    #[test]
    fn test_known_empty_cleared_by_edit() {
        let chunk = Chunk::new(origin());
        let old = chunk.set_lod_mesh(2, ChunkMesh::new(), chunk.lod_epoch());
        assert!(old.is_none());
        assert!(chunk.is_lod_known_empty(2));
        assert!(chunk.get_lod_mesh(2).is_none());

        chunk.set(8, 8, 8, Voxel::Stone);
        assert!(!chunk.is_lod_known_empty(2), "edit must clear known-empty");
        assert!(chunk.is_lod_dirty(2));
    }

    #[test]
    fn test_set_lod_mesh_returns_replaced() {
        let chunk = Chunk::new(origin());
        chunk.set_lod_mesh(2, quad_mesh(), chunk.lod_epoch());
        let old = chunk.set_lod_mesh(2, quad_mesh(), chunk.lod_epoch());
        assert!(old.is_some());
        assert_eq!(chunk.take_all_meshes().len(), 1);
        assert!(chunk.get_lod_mesh(2).is_none());
    }

    #[test]
    fn test_face_solidity() {
        let chunk = Chunk::new(origin());
        assert_eq!(chunk.face_solidity(), 0);

        for x in 0..CHUNK_SIZE {
            for z in 0..CHUNK_SIZE {
                chunk.set(x, 0, z, Voxel::Stone);
            }
        }
        assert_eq!(chunk.face_solidity(), FaceDirection::NegY.bit());

        chunk.set(3, 0, 3, Voxel::Air);
        assert_eq!(chunk.face_solidity(), 0, "cache must invalidate on write");
    }

    #[test]
    fn test_face_solidity_ignores_mask_from_older_version() {
        let chunk = Chunk::new(origin());
        for x in 0..CHUNK_SIZE {
            for y in 0..CHUNK_SIZE {
                chunk.set(x, y, 0, Voxel::Stone);
            }
        }
        let before = chunk.version();
        let solid = chunk.face_solidity();
        assert_eq!(solid, FaceDirection::NegZ.bit());

        // A reader that sampled the old content stores its mask after the edit.
        chunk.set(0, 0, 0, Voxel::Air);
        chunk
            .face_solidity
            .store(tag_solidity(before, solid), Ordering::Release);

        assert_eq!(chunk.face_solidity(), 0);
        assert_eq!(chunk.face_solidity(), 0, "recomputed mask is cached");
    }

    #[test]
    fn test_occlusion_flag() {
        let chunk = Chunk::new(origin());
        assert!(!chunk.is_occluded());
        chunk.set_occluded(true);
        assert!(chunk.is_occluded());
    }
}
