//! The authoritative chunk store.
//!
//! Chunks are materialized exactly once per coordinate, either loaded from a
//! region file or generated, and then stay resident until [`World::clear`].
//! Synchronous access ([`World::get_chunk`]) blocks on materialization;
//! asynchronous access ([`World::request_chunk`]) only enqueues work for the
//! worker pool.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use dashmap::{DashMap, DashSet};
use strata_config::{Config, WorldConfig};
use strata_terrain::{TerrainGenerator, TerrainParams};
use strata_voxel::{BlockAccess, BlockPos, Chunk, ChunkCoord, FaceDirection, RegionError, RegionStore, Voxel};
use tracing::{debug, error, info, trace, warn};

use crate::error::WorldError;
use crate::pool::{ShutdownReport, WorkerPool, resolve_thread_count};
use crate::queue::TaskQueue;

/// Runtime options for a [`World`].
#[derive(Clone, Debug, PartialEq)]
pub struct WorldOptions {
    /// Chunk worker threads; 0 means one per logical core.
    pub worker_threads: usize,
    /// Queued requests beyond this are dropped.
    pub queue_capacity: usize,
    /// How long [`World::shutdown`] waits for running tasks.
    pub shutdown_grace: Duration,
    /// Log save progress every this many chunks.
    pub save_progress_interval: usize,
    /// Log each generated or loaded chunk at debug level.
    pub log_chunk_events: bool,
}

impl WorldOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            worker_threads: config.world.worker_threads,
            queue_capacity: config.world.queue_capacity,
            shutdown_grace: Duration::from_millis(config.world.shutdown_grace_ms),
            save_progress_interval: config.world.save_progress_interval,
            log_chunk_events: config.debug.log_chunk_events,
        }
    }
}

impl Default for WorldOptions {
    fn default() -> Self {
        let world = WorldConfig::default();
        Self {
            worker_threads: world.worker_threads,
            queue_capacity: world.queue_capacity,
            shutdown_grace: Duration::from_millis(world.shutdown_grace_ms),
            save_progress_interval: world.save_progress_interval,
            log_chunk_events: false,
        }
    }
}

/// Outcome of [`World::request_chunk`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestStatus {
    /// The chunk is already resident; nothing was queued.
    Resident,
    /// A task for this coordinate is already queued or running.
    AlreadyPending,
    /// A new task was queued.
    Queued,
    /// The queue is full or shut down; the caller should ask again later.
    Dropped,
}

/// Incremental progress reported by [`World::save_all_with`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SaveProgress {
    /// Chunks processed so far, failures included.
    pub saved: usize,
    pub total: usize,
    pub elapsed: Duration,
    /// Remaining time extrapolated from the average so far.
    pub eta: Duration,
}

/// Result of a [`World::save_all`] pass.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SaveSummary {
    pub saved: usize,
    pub failed: usize,
    pub total: usize,
    pub elapsed: Duration,
}

/// Materialization counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorldStats {
    /// Chunks produced by the terrain generator.
    pub generated: u64,
    /// Chunks read back from region files.
    pub loaded: u64,
    pub resident: usize,
    pub pending: usize,
}

type Slot = Arc<OnceLock<Arc<Chunk>>>;

/// State shared between the [`World`] handle and its workers.
struct Shared {
    chunks: DashMap<ChunkCoord, Slot>,
    pending: DashSet<ChunkCoord>,
    generator: TerrainGenerator,
    store: RegionStore,
    generated: AtomicU64,
    loaded: AtomicU64,
    log_chunk_events: bool,
}

impl Shared {
    fn get_chunk_if_loaded(&self, coord: ChunkCoord) -> Option<Arc<Chunk>> {
        self.chunks
            .get(&coord)
            .and_then(|slot| slot.value().get().cloned())
    }

    fn get_chunk(&self, coord: ChunkCoord) -> Arc<Chunk> {
        // Clone the slot out so no map guard is held during materialization.
        let slot = Arc::clone(self.chunks.entry(coord).or_default().value());
        let mut created = false;
        let chunk = slot
            .get_or_init(|| {
                created = true;
                Arc::new(self.materialize(coord))
            })
            .clone();
        if created {
            self.mark_neighbors_dirty(coord);
        }
        chunk
    }

    /// Loads `coord` from disk, or generates it if absent or unreadable.
    fn materialize(&self, coord: ChunkCoord) -> Chunk {
        match self.store.load(coord) {
            Ok(Some(chunk)) => {
                self.loaded.fetch_add(1, Ordering::Relaxed);
                if self.log_chunk_events {
                    debug!(%coord, "chunk loaded");
                }
                return chunk;
            }
            Ok(None) => {}
            Err(err) => warn!(%coord, error = %err, "chunk load failed, regenerating"),
        }

        let chunk = Chunk::new(coord);
        self.generator.fill(&chunk);
        self.generated.fetch_add(1, Ordering::Relaxed);
        if self.log_chunk_events {
            debug!(%coord, "chunk generated");
        }
        chunk
    }

    /// A new chunk changes what its neighbors' boundary faces can see.
    fn mark_neighbors_dirty(&self, coord: ChunkCoord) {
        for dir in FaceDirection::ALL {
            if let Some(neighbor) = self.get_chunk_if_loaded(coord.neighbor(dir)) {
                neighbor.mark_dirty();
                if dir.is_horizontal() {
                    neighbor.mark_lod_dirty();
                }
            }
        }
    }

    fn persist(&self, chunk: &Chunk) -> Result<(), RegionError> {
        let version = self.store.save(chunk)?;
        chunk.mark_saved(version);
        Ok(())
    }

    /// Worker entry point. A panicking task is logged and not retried.
    fn run_task(&self, coord: ChunkCoord) {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.get_chunk(coord);
        }));
        self.pending.remove(&coord);
        if outcome.is_err() {
            error!(%coord, "chunk task panicked");
        }
    }

    fn resident_chunks(&self) -> Vec<Arc<Chunk>> {
        self.chunks
            .iter()
            .filter_map(|slot| slot.value().get().cloned())
            .collect()
    }
}

/// Concurrent map of resident chunks with a background materialization pool.
pub struct World {
    shared: Arc<Shared>,
    queue: Arc<TaskQueue>,
    pool: Mutex<Option<WorkerPool>>,
    options: WorldOptions,
}

impl World {
    /// Starts a world over `store`, generating missing chunks with `generator`.
    pub fn new(
        generator: TerrainGenerator,
        store: RegionStore,
        options: WorldOptions,
    ) -> Result<Self, WorldError> {
        let shared = Arc::new(Shared {
            chunks: DashMap::new(),
            pending: DashSet::new(),
            generator,
            store,
            generated: AtomicU64::new(0),
            loaded: AtomicU64::new(0),
            log_chunk_events: options.log_chunk_events,
        });
        let queue = Arc::new(TaskQueue::new(options.queue_capacity));
        let threads = resolve_thread_count(options.worker_threads);

        let worker_state = Arc::clone(&shared);
        let pool = WorkerPool::spawn("chunk-worker", threads, Arc::clone(&queue), move |coord| {
            worker_state.run_task(coord)
        })
        .map_err(WorldError::SpawnWorker)?;

        info!(
            threads,
            queue_capacity = options.queue_capacity,
            save_dir = %shared.store.root().display(),
            seed = shared.generator.params().seed,
            "world started"
        );

        Ok(Self {
            shared,
            queue,
            pool: Mutex::new(Some(pool)),
            options,
        })
    }

    /// Validates `config`, creates the save directory and starts a world.
    pub fn open(config: &Config) -> Result<Self, WorldError> {
        config.validate()?;
        let save_dir = &config.world.save_dir;
        std::fs::create_dir_all(save_dir).map_err(|source| WorldError::CreateSaveDir {
            path: save_dir.clone(),
            source,
        })?;
        let params = TerrainParams {
            seed: config.terrain.seed,
            water_line: config.terrain.water_line,
            snow_line: config.terrain.snow_line,
            ..TerrainParams::default()
        };
        Self::new(
            TerrainGenerator::new(params),
            RegionStore::new(save_dir),
            WorldOptions::from_config(config),
        )
    }

    // -----------------------------------------------------------------------
    // Chunk access
    // -----------------------------------------------------------------------

    /// Returns the chunk at `coord`, loading or generating it first if needed.
    ///
    /// Blocks for the duration of generation or disk I/O. Concurrent callers
    /// for the same coordinate wait for a single materialization.
    pub fn get_chunk(&self, coord: ChunkCoord) -> Arc<Chunk> {
        self.shared.get_chunk(coord)
    }

    /// Returns the chunk at `coord` only if it is already resident.
    pub fn get_chunk_if_loaded(&self, coord: ChunkCoord) -> Option<Arc<Chunk>> {
        self.shared.get_chunk_if_loaded(coord)
    }

    /// Asks the worker pool to materialize `coord`, nearest to `requester`
    /// first. Never blocks.
    pub fn request_chunk(&self, coord: ChunkCoord, requester: ChunkCoord) -> RequestStatus {
        if self.get_chunk_if_loaded(coord).is_some() {
            return RequestStatus::Resident;
        }
        if !self.shared.pending.insert(coord) {
            return RequestStatus::AlreadyPending;
        }
        match self.queue.push(coord, coord.distance_sq(requester)) {
            Ok(()) => RequestStatus::Queued,
            Err(reason) => {
                self.shared.pending.remove(&coord);
                trace!(%coord, ?reason, "chunk request dropped");
                RequestStatus::Dropped
            }
        }
    }

    // -----------------------------------------------------------------------
    // Block access
    // -----------------------------------------------------------------------

    /// Returns the voxel at `pos`, or `Air` if its chunk is not resident.
    pub fn get_block(&self, pos: BlockPos) -> Voxel {
        let (coord, local) = pos.split();
        self.get_chunk_if_loaded(coord)
            .map_or(Voxel::Air, |chunk| chunk.get(local.x, local.y, local.z))
    }

    /// Writes the voxel at `pos` and saves the owning chunk right away.
    ///
    /// Materializes the chunk if needed. Neighbors across any chunk face the
    /// voxel touches get a primary-mesh rebuild, and every resident
    /// horizontal neighbor gets its LOD meshes marked stale since its edge
    /// walls follow this chunk's cell heights. A failed save is logged and
    /// leaves the chunk needing a save.
    pub fn set_block(&self, pos: BlockPos, voxel: Voxel) {
        let (coord, local) = pos.split();
        let chunk = self.get_chunk(coord);
        chunk.set(local.x, local.y, local.z, voxel);

        for dir in local.boundary_faces() {
            if let Some(neighbor) = self.get_chunk_if_loaded(coord.neighbor(dir)) {
                neighbor.mark_dirty();
            }
        }
        for dir in FaceDirection::ALL.into_iter().filter(|d| d.is_horizontal()) {
            if let Some(neighbor) = self.get_chunk_if_loaded(coord.neighbor(dir)) {
                neighbor.mark_lod_dirty();
            }
        }

        if let Err(err) = self.shared.persist(&chunk) {
            warn!(%coord, error = %err, "eager chunk save failed");
        }
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Saves one resident chunk if it has unsaved changes. Returns whether a
    /// write happened.
    pub fn save_chunk(&self, coord: ChunkCoord) -> Result<bool, RegionError> {
        match self.get_chunk_if_loaded(coord) {
            Some(chunk) if chunk.needs_save() => {
                self.shared.persist(&chunk)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Saves every resident chunk with unsaved changes.
    pub fn save_all(&self) -> SaveSummary {
        self.save_all_with(|_| {})
    }

    /// Like [`save_all`](Self::save_all), calling `progress` after each chunk.
    pub fn save_all_with(&self, mut progress: impl FnMut(&SaveProgress)) -> SaveSummary {
        let start = Instant::now();
        let dirty: Vec<_> = self
            .shared
            .resident_chunks()
            .into_iter()
            .filter(|chunk| chunk.needs_save())
            .collect();
        let total = dirty.len();
        let interval = self.options.save_progress_interval.max(1);

        let mut summary = SaveSummary {
            total,
            ..SaveSummary::default()
        };
        for (i, chunk) in dirty.iter().enumerate() {
            match self.shared.persist(chunk) {
                Ok(()) => summary.saved += 1,
                Err(err) => {
                    summary.failed += 1;
                    warn!(coord = %chunk.coord(), error = %err, "chunk save failed");
                }
            }

            let done = i + 1;
            let elapsed = start.elapsed();
            let eta = elapsed.mul_f64((total - done) as f64 / done as f64);
            if done % interval == 0 || done == total {
                info!(
                    saved = done,
                    total,
                    eta_ms = eta.as_millis() as u64,
                    "saving chunks"
                );
            }
            progress(&SaveProgress {
                saved: done,
                total,
                elapsed,
                eta,
            });
        }

        summary.elapsed = start.elapsed();
        if total > 0 {
            info!(
                saved = summary.saved,
                failed = summary.failed,
                elapsed_ms = summary.elapsed.as_millis() as u64,
                "save complete"
            );
        }
        summary
    }

    /// Stops the worker pool and saves everything.
    ///
    /// Queued tasks that have not started are discarded. Running tasks get
    /// the configured grace period; threads still busy after that are
    /// detached. Returns `None` if the world was already shut down.
    pub fn shutdown(&self) -> Option<ShutdownReport> {
        let pool = self
            .pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;

        info!("world shutting down");
        let report = pool.shutdown(self.options.shutdown_grace);
        self.shared.pending.clear();
        if report.detached > 0 {
            warn!(
                detached = report.detached,
                grace_ms = self.options.shutdown_grace.as_millis() as u64,
                "chunk workers still busy after grace period, detaching"
            );
        }
        debug!(
            discarded = report.discarded,
            joined = report.joined,
            "worker pool stopped"
        );

        self.save_all();
        Some(report)
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn resident_coords(&self) -> Vec<ChunkCoord> {
        self.shared
            .chunks
            .iter()
            .filter(|slot| slot.value().get().is_some())
            .map(|slot| *slot.key())
            .collect()
    }

    pub fn resident_count(&self) -> usize {
        self.shared
            .chunks
            .iter()
            .filter(|slot| slot.value().get().is_some())
            .count()
    }

    /// Coordinates queued or running in the pool.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.len()
    }

    pub fn stats(&self) -> WorldStats {
        WorldStats {
            generated: self.shared.generated.load(Ordering::Relaxed),
            loaded: self.shared.loaded.load(Ordering::Relaxed),
            resident: self.resident_count(),
            pending: self.pending_count(),
        }
    }

    /// Evicts every resident chunk without saving and returns them, so the
    /// caller can release their meshes.
    pub fn clear(&self) -> Vec<Arc<Chunk>> {
        let evicted = self.shared.resident_chunks();
        self.shared.chunks.clear();
        info!(evicted = evicted.len(), "world cleared");
        evicted
    }

    pub fn generator(&self) -> &TerrainGenerator {
        &self.shared.generator
    }

    pub fn store(&self) -> &RegionStore {
        &self.shared.store
    }
}

impl BlockAccess for World {
    fn loaded_chunk(&self, coord: ChunkCoord) -> Option<Arc<Chunk>> {
        self.get_chunk_if_loaded(coord)
    }

    fn loaded_chunk_ys(&self, cx: i64, cz: i64) -> Vec<i64> {
        self.shared
            .chunks
            .iter()
            .filter(|slot| {
                let coord = slot.key();
                coord.x == cx && coord.z == cz && slot.value().get().is_some()
            })
            .map(|slot| slot.key().y)
            .collect()
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
