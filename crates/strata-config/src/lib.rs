//! Configuration for the Strata voxel engine.
//!
//! Settings persist to disk as a RON file and every section tolerates
//! missing or unknown fields, so old and new config files keep loading.

mod config;
mod error;

pub use config::{Config, DebugConfig, TerrainConfig, WorldConfig};
pub use error::ConfigError;
