//! Structured logging for Strata.
//!
//! Console output with uptime timestamps and module paths, plus a JSON log
//! file in debug builds for post-mortem analysis. The level comes from
//! `RUST_LOG` when set, otherwise from the config's debug section.

use std::path::Path;

use strata_config::Config;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither `RUST_LOG` nor the config names a level.
pub const DEFAULT_FILTER: &str = "info";

/// Name of the JSON log file written in debug builds.
pub const LOG_FILE_NAME: &str = "strata.log";

/// Crates whose per-chunk events are raised to `debug` by
/// `debug.log_chunk_events`.
const CHUNK_EVENT_TARGETS: [&str; 3] = ["strata_world", "strata_voxel", "strata_terrain"];

/// Builds the filter directive string for a config.
pub fn filter_directives(config: Option<&Config>) -> String {
    let Some(config) = config else {
        return DEFAULT_FILTER.to_string();
    };
    let mut directives = if config.debug.log_level.is_empty() {
        DEFAULT_FILTER.to_string()
    } else {
        config.debug.log_level.clone()
    };
    if config.debug.log_chunk_events {
        for target in CHUNK_EVENT_TARGETS {
            directives.push_str(&format!(",{target}=debug"));
        }
    }
    directives
}

/// Initialize the global tracing subscriber.
///
/// * `log_dir` - directory for the JSON log file (debug builds only)
/// * `debug_build` - whether to also write `strata.log`
/// * `config` - supplies the log level and chunk-event switch
///
/// ```no_run
/// use strata_config::Config;
/// use strata_log::init_logging;
///
/// let config = Config::default();
/// init_logging(Some(std::path::Path::new("./logs")), true, Some(&config));
/// ```
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    let filter_str = filter_directives(config);

    // RUST_LOG wins over the config.
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(true) // chunk-worker-N, mesh-worker-N
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if debug_build
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = std::fs::File::create(log_dir.join(LOG_FILE_NAME))
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        subscriber.with(file_layer).init();
        return;
    }

    subscriber.init();
}

/// Create an `EnvFilter` with [`DEFAULT_FILTER`].
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_default_log_level() {
        let filter = default_env_filter();
        assert!(format!("{}", filter).contains("info"));
        assert_eq!(filter_directives(None), "info");
    }

    #[test]
    fn test_config_level_used() {
        let mut config = Config::default();
        config.debug.log_level = "warn".to_string();
        assert_eq!(filter_directives(Some(&config)), "warn");

        config.debug.log_level.clear();
        assert_eq!(filter_directives(Some(&config)), DEFAULT_FILTER);
    }

    #[test]
    fn test_chunk_events_raise_world_targets() {
        let mut config = Config::default();
        config.debug.log_chunk_events = true;
        let directives = filter_directives(Some(&config));
        assert!(directives.starts_with("info,"));
        assert!(directives.contains("strata_world=debug"));
        assert!(directives.contains("strata_voxel=debug"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }

    #[test]
    fn test_env_filter_parsing() {
        let valid_filters = [
            "info",
            "debug,strata_world=trace",
            "warn,strata_voxel::region=debug,strata_mesh=trace",
            "error",
        ];

        for filter_str in &valid_filters {
            let result = EnvFilter::try_new(*filter_str);
            assert!(result.is_ok(), "Failed to parse filter: {}", filter_str);
        }
    }

    #[test]
    fn test_json_file_layer_writes_structured_lines() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(LOG_FILE_NAME);
        let file = std::fs::File::create(&path).unwrap();

        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .json(),
        );
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(chunk = "(1, 2, 3)", "chunk generated");
        });

        let contents = std::fs::read_to_string(&path).unwrap();
        let line = contents.lines().next().expect("one log line");
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(value["level"], "INFO");
        assert_eq!(value["fields"]["message"], "chunk generated");
        assert_eq!(value["fields"]["chunk"], "(1, 2, 3)");
    }
}
