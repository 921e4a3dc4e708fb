//! World error types.

use std::path::PathBuf;

use strata_config::ConfigError;

/// Errors from creating or starting a [`World`](crate::World).
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// The save directory could not be created.
    #[error("failed to create save directory {path}: {source}")]
    CreateSaveDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config holds values the world cannot run with.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    SpawnWorker(#[source] std::io::Error),
}
