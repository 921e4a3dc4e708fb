//! Background mesh building for resident chunks.
//!
//! The frame thread submits `(coord, step)` pairs; workers mesh against the
//! live [`World`] through its read-only [`BlockAccess`] view and install the
//! result into the chunk's mesh cache. Meshes displaced by a newer build are
//! handed to a [`DisposeQueue`] for the owning thread to release.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use dashmap::DashSet;
use strata_mesh::Mesher;
use strata_voxel::{ChunkCoord, ChunkMesh};
use tracing::{error, trace};

use crate::dispose::DisposeQueue;
use crate::error::WorldError;
use crate::world::World;

/// Step 1 is the full-resolution primary mesh.
pub const PRIMARY_STEP: u32 = 1;

/// A queued mesh build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshingTask {
    pub coord: ChunkCoord,
    /// 1 for the primary mesh, otherwise a LOD step.
    pub step: u32,
}

/// Outcome of one mesh build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeshingResult {
    pub coord: ChunkCoord,
    pub step: u32,
    /// Chunk epoch the mesh was built from.
    pub epoch: u64,
    /// Quads in the new mesh.
    pub quads: usize,
    /// `false` if the chunk was not resident or the build panicked.
    pub installed: bool,
}

/// Worker pool that builds and installs chunk meshes off the frame thread.
pub struct MeshingPipeline {
    task_sender: Option<Sender<MeshingTask>>,
    result_receiver: Receiver<MeshingResult>,
    worker_handles: Vec<JoinHandle<()>>,
    /// Maximum in-flight tasks.
    budget: usize,
    in_flight: Arc<AtomicUsize>,
    /// Tasks submitted and not yet finished, for coalescing.
    queued: Arc<DashSet<MeshingTask>>,
}

impl MeshingResult {
    fn skipped(task: MeshingTask) -> Self {
        Self {
            coord: task.coord,
            step: task.step,
            epoch: 0,
            quads: 0,
            installed: false,
        }
    }
}

fn build(world: &World, task: MeshingTask, disposal: &DisposeQueue<Arc<ChunkMesh>>) -> MeshingResult {
    let origin = task.coord.world_origin();
    let Some(chunk) = world.get_chunk_if_loaded(task.coord) else {
        return MeshingResult::skipped(task);
    };

    let (epoch, quads, replaced) = if task.step <= PRIMARY_STEP {
        let epoch = chunk.mesh_epoch();
        let mesh = Mesher::build(world, &chunk, origin);
        let quads = mesh.quad_count();
        (epoch, quads, chunk.set_mesh(mesh, epoch))
    } else {
        let epoch = chunk.lod_epoch();
        let mesh = Mesher::build_lod(world, &chunk, origin, task.step);
        let quads = mesh.quad_count();
        (epoch, quads, chunk.set_lod_mesh(task.step, mesh, epoch))
    };
    if let Some(old) = replaced {
        disposal.defer(old);
    }

    MeshingResult {
        coord: task.coord,
        step: task.step,
        epoch,
        quads,
        installed: true,
    }
}

impl MeshingPipeline {
    /// Spawns `worker_count` threads named `mesh-worker-N` meshing chunks of
    /// `world`, with at most `budget` tasks in flight.
    pub fn new(
        world: Arc<World>,
        worker_count: usize,
        budget: usize,
        disposal: DisposeQueue<Arc<ChunkMesh>>,
    ) -> Result<Self, WorldError> {
        let (task_tx, task_rx) = bounded::<MeshingTask>(budget.max(1));
        let (result_tx, result_rx) = unbounded();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let queued = Arc::new(DashSet::new());

        let mut handles = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let rx = task_rx.clone();
            let tx = result_tx.clone();
            let world = Arc::clone(&world);
            let disposal = disposal.clone();
            let flight = Arc::clone(&in_flight);
            let queued = Arc::clone(&queued);

            let handle = std::thread::Builder::new()
                .name(format!("mesh-worker-{i}"))
                .spawn(move || {
                    while let Ok(task) = rx.recv() {
                        let result =
                            catch_unwind(AssertUnwindSafe(|| build(&world, task, &disposal)))
                                .unwrap_or_else(|_| {
                                    error!(coord = %task.coord, step = task.step, "mesh build panicked");
                                    MeshingResult::skipped(task)
                                });
                        trace!(coord = %task.coord, step = task.step, quads = result.quads, "mesh built");
                        queued.remove(&task);
                        flight.fetch_sub(1, Ordering::Relaxed);
                        let _ = tx.send(result);
                    }
                })
                .map_err(WorldError::SpawnWorker)?;
            handles.push(handle);
        }

        Ok(Self {
            task_sender: Some(task_tx),
            result_receiver: result_rx,
            worker_handles: handles,
            budget,
            in_flight,
            queued,
        })
    }

    /// Queues a mesh build for `coord` at `step` (1 = primary).
    ///
    /// Returns `false` if the same build is already queued, the budget is
    /// exhausted, or the pipeline has shut down.
    ///
    /// # Panics
    ///
    /// Panics if `step` is not 1 or a power of two up to the chunk size.
    pub fn submit(&self, coord: ChunkCoord, step: u32) -> bool {
        assert!(
            step.is_power_of_two() && step as usize <= strata_voxel::CHUNK_SIZE,
            "mesh step {step} out of range"
        );
        let Some(sender) = &self.task_sender else {
            return false;
        };
        if self.in_flight.load(Ordering::Relaxed) >= self.budget {
            return false;
        }
        let task = MeshingTask { coord, step };
        if !self.queued.insert(task) {
            return false;
        }
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        if sender.try_send(task).is_err() {
            self.in_flight.fetch_sub(1, Ordering::Relaxed);
            self.queued.remove(&task);
            return false;
        }
        true
    }

    /// Drain all completed results. Called once per frame.
    pub fn drain_results(&self) -> Vec<MeshingResult> {
        self.result_receiver.try_iter().collect()
    }

    /// Number of tasks currently being processed or queued by workers.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Closes the task channel and joins the workers after they finish the
    /// tasks already queued.
    pub fn shutdown(&mut self) {
        self.task_sender.take();
        for handle in self.worker_handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for MeshingPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::WorldOptions;
    use std::time::{Duration, Instant};
    use strata_terrain::{TerrainGenerator, TerrainParams};
    use strata_voxel::{BlockPos, RegionStore, Voxel};

    fn flat_world(dir: &std::path::Path) -> Arc<World> {
        Arc::new(
            World::new(
                TerrainGenerator::new(TerrainParams::flat(8.5)),
                RegionStore::new(dir),
                WorldOptions {
                    worker_threads: 1,
                    ..WorldOptions::default()
                },
            )
            .unwrap(),
        )
    }

    fn collect(pipeline: &MeshingPipeline, expected: usize) -> Vec<MeshingResult> {
        let mut results = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(20);
        while results.len() < expected && Instant::now() < deadline {
            results.extend(pipeline.drain_results());
            std::thread::sleep(Duration::from_millis(5));
        }
        results
    }

    #[test]
    fn test_primary_mesh_installed() {
        let dir = tempfile::tempdir().unwrap();
        let world = flat_world(dir.path());
        let coord = ChunkCoord::new(0, 0, 0);
        let chunk = world.get_chunk(coord);
        assert!(chunk.is_dirty());

        let disposal = DisposeQueue::new();
        let pipeline = MeshingPipeline::new(Arc::clone(&world), 2, 8, disposal.clone()).unwrap();
        assert!(pipeline.submit(coord, PRIMARY_STEP));

        let results = collect(&pipeline, 1);
        assert_eq!(results.len(), 1);
        assert!(results[0].installed);
        // No resident neighbors, so only the flat top is exposed.
        assert_eq!(results[0].quads, 1);
        assert!(!chunk.is_dirty());
        assert_eq!(chunk.get_mesh().map(|m| m.quad_count()), Some(1));
        assert_eq!(disposal.pending(), 0, "nothing replaced yet");
    }

    #[test]
    fn test_rebuild_defers_old_mesh() {
        let dir = tempfile::tempdir().unwrap();
        let world = flat_world(dir.path());
        let coord = ChunkCoord::new(0, 0, 0);
        world.get_chunk(coord);

        let disposal = DisposeQueue::new();
        let pipeline = MeshingPipeline::new(Arc::clone(&world), 1, 8, disposal.clone()).unwrap();
        assert!(pipeline.submit(coord, PRIMARY_STEP));
        assert_eq!(collect(&pipeline, 1).len(), 1);

        world.set_block(BlockPos::new(4, 9, 4), Voxel::Stone);
        assert!(pipeline.submit(coord, PRIMARY_STEP));
        assert_eq!(collect(&pipeline, 1).len(), 1);

        let mut released = Vec::new();
        assert_eq!(disposal.drain(|mesh| released.push(mesh.quad_count())), 1);
        assert_eq!(released, vec![1]);
    }

    #[test]
    fn test_lod_mesh_installed_per_step() {
        let dir = tempfile::tempdir().unwrap();
        let world = flat_world(dir.path());
        let coord = ChunkCoord::new(0, 0, 0);
        let chunk = world.get_chunk(coord);

        let pipeline = MeshingPipeline::new(Arc::clone(&world), 2, 8, DisposeQueue::new()).unwrap();
        assert!(pipeline.submit(coord, 4));
        assert!(pipeline.submit(coord, 8));
        let results = collect(&pipeline, 2);
        assert_eq!(results.len(), 2);

        assert!(!chunk.is_lod_dirty(4));
        assert!(!chunk.is_lod_dirty(8));
        assert_eq!(chunk.get_lod_mesh(4).map(|m| m.quad_count()), Some(16));
        assert_eq!(chunk.get_lod_mesh(8).map(|m| m.quad_count()), Some(4));
        assert!(chunk.is_dirty(), "LOD builds leave the primary mesh alone");
    }

    #[test]
    fn test_non_resident_chunk_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let world = flat_world(dir.path());
        let pipeline = MeshingPipeline::new(Arc::clone(&world), 1, 8, DisposeQueue::new()).unwrap();
        assert!(pipeline.submit(ChunkCoord::new(7, 7, 7), PRIMARY_STEP));

        let results = collect(&pipeline, 1);
        assert_eq!(results.len(), 1);
        assert!(!results[0].installed);
        assert_eq!(world.resident_count(), 0, "meshing never materializes");
    }

    #[test]
    fn test_budget_and_shutdown_reject_submissions() {
        let dir = tempfile::tempdir().unwrap();
        let world = flat_world(dir.path());
        let mut pipeline =
            MeshingPipeline::new(Arc::clone(&world), 1, 0, DisposeQueue::new()).unwrap();
        assert!(!pipeline.submit(ChunkCoord::new(0, 0, 0), PRIMARY_STEP), "zero budget");

        pipeline.shutdown();
        pipeline.budget = 8;
        assert!(!pipeline.submit(ChunkCoord::new(0, 0, 0), PRIMARY_STEP), "shut down");
        assert_eq!(pipeline.in_flight_count(), 0);
    }

    #[test]
    fn test_panicking_build_releases_budget() {
        let dir = tempfile::tempdir().unwrap();
        let world = flat_world(dir.path());
        let coord = ChunkCoord::new(0, 0, 0);
        world.get_chunk(coord);
        let pipeline = MeshingPipeline::new(Arc::clone(&world), 1, 1, DisposeQueue::new()).unwrap();

        // Its world origin overflows i64, so the build panics.
        let broken = ChunkCoord::new(strata_voxel::MAX_CHUNK_COORD + 1, 0, 0);
        assert!(pipeline.submit(broken, PRIMARY_STEP));
        let results = collect(&pipeline, 1);
        assert_eq!(results.len(), 1);
        assert!(!results[0].installed);
        assert_eq!(pipeline.in_flight_count(), 0, "budget slot returned");

        assert!(pipeline.submit(broken, PRIMARY_STEP), "task no longer queued");
        assert_eq!(collect(&pipeline, 1).len(), 1);

        assert!(pipeline.submit(coord, PRIMARY_STEP), "worker still running");
        let results = collect(&pipeline, 1);
        assert!(results[0].installed);
        assert!(!world.get_chunk(coord).is_dirty());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_rejects_bad_step() {
        let dir = tempfile::tempdir().unwrap();
        let world = flat_world(dir.path());
        let pipeline = MeshingPipeline::new(world, 1, 8, DisposeQueue::new()).unwrap();
        pipeline.submit(ChunkCoord::new(0, 0, 0), 3);
    }
}
