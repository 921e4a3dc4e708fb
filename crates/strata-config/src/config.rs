//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Chunk store, worker pool and persistence settings.
    pub world: WorldConfig,
    /// Terrain generation settings.
    pub terrain: TerrainConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// World runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorldConfig {
    /// Directory holding region files. Relative paths resolve against the
    /// working directory.
    pub save_dir: PathBuf,
    /// Chunk worker threads; 0 means one per logical core.
    pub worker_threads: usize,
    /// Maximum queued chunk requests before new ones are dropped.
    pub queue_capacity: usize,
    /// How long shutdown waits for in-flight chunk tasks, in milliseconds.
    pub shutdown_grace_ms: u64,
    /// Log save progress every this many chunks.
    pub save_progress_interval: usize,
}

/// Terrain generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerrainConfig {
    /// World seed.
    pub seed: u64,
    /// Height at or below which empty space is water and surfaces are sand.
    pub water_line: i64,
    /// Height above which surfaces are snow.
    pub snow_line: i64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Log every chunk generation and load at debug level.
    pub log_chunk_events: bool,
}

// --- Default implementations ---

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("world"),
            worker_threads: 0,
            queue_capacity: 1024,
            shutdown_grace_ms: 2_000,
            save_progress_interval: 64,
        }
    }
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            water_line: 0,
            snow_line: 80,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_chunk_events: false,
        }
    }
}

// --- Load / Save / Reload ---

const FILE_NAME: &str = "config.ron";

fn read_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = ron::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Platform config directory for Strata, e.g. `~/.config/strata`.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("strata"))
    }

    /// Rejects values the world cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.world.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "world.queue_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.terrain.snow_line <= self.terrain.water_line {
            return Err(ConfigError::Invalid {
                field: "terrain.snow_line",
                reason: format!(
                    "{} is not above water_line {}",
                    self.terrain.snow_line, self.terrain.water_line
                ),
            });
        }
        Ok(())
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(FILE_NAME);

        if config_path.exists() {
            let config = read_file(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        let config_path = config_dir.join(FILE_NAME);
        let write_err = |source| ConfigError::Write {
            path: config_path.clone(),
            source,
        };
        std::fs::create_dir_all(config_dir).map_err(write_err)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;

        std::fs::write(&config_path, serialized).map_err(write_err)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = read_file(&config_dir.join(FILE_NAME))?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}
