//! The chunk-based world: a concurrent store of resident chunks backed by
//! region files and procedural terrain, with worker pools for chunk
//! materialization and mesh building.

mod dispose;
mod error;
mod meshing;
mod pool;
mod queue;
mod world;

pub use dispose::DisposeQueue;
pub use error::WorldError;
pub use meshing::{MeshingPipeline, MeshingResult, MeshingTask, PRIMARY_STEP};
pub use pool::ShutdownReport;
pub use world::{RequestStatus, SaveProgress, SaveSummary, World, WorldOptions, WorldStats};
