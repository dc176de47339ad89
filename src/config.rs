//! Loader and writer configuration.

use std::env;

use serde::{Deserialize, Serialize};

/// Set to `1` or `true` to decode chunks on the calling thread.
pub const ENV_SINGLE_THREADED: &str = "FLIGHTREC_SINGLE_THREADED";
/// Number of chunk decoding workers.
pub const ENV_WORKERS: &str = "FLIGHTREC_WORKERS";

/// Options for loading a recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Drop experimental event types and fields.
    pub hide_experimentals: bool,
    /// Keep what was loaded when a chunk turns out to be truncated.
    pub ignore_truncated_chunk: bool,
    /// Decode chunks on the calling thread.
    pub single_threaded: bool,
    /// Worker count, defaults to the available parallelism.
    pub workers: Option<usize>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            hide_experimentals: false,
            ignore_truncated_chunk: false,
            single_threaded: false,
            workers: None,
        }
    }
}

impl LoaderConfig {
    /// Defaults overridden by `FLIGHTREC_SINGLE_THREADED` and
    /// `FLIGHTREC_WORKERS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = env::var(ENV_SINGLE_THREADED) {
            config.single_threaded = matches!(value.trim(), "1" | "true" | "yes");
        }
        if let Ok(value) = env::var(ENV_WORKERS) {
            match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.workers = Some(n),
                _ => tracing::warn!("Ignoring invalid {}={:?}", ENV_WORKERS, value),
            }
        }
        config
    }

    pub fn worker_count(&self) -> usize {
        if self.single_threaded {
            return 1;
        }
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }
}

/// Options for a new recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    /// Tick value at the start of the recording. Ticks are nanoseconds.
    pub start_ticks: Option<i64>,
    /// Wall clock start in nanoseconds since the epoch.
    pub start_nanos: Option<i64>,
    /// Fixed duration written to every chunk header instead of the elapsed time.
    pub duration_nanos: Option<i64>,
    /// Register the structural JDK types (threads, stack traces, classes).
    pub initialize_jdk_types: bool,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            start_ticks: None,
            start_nanos: None,
            duration_nanos: None,
            initialize_jdk_types: true,
        }
    }
}
