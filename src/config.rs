//! Runtime configuration.
//!
//! Built once at startup from command line flags and handed by reference
//! to the tailer, pipeline and sinks. Nothing reads configuration from
//! global state.

use std::path::PathBuf;
use std::time::Duration;

/// Read size used when the caller does not override it.
pub const DEFAULT_CHUNK_SIZE: usize = 2048;

/// How long the tailer sleeps at end of file before retrying.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Prefix prepended to every metric name by the reporting sinks.
pub const DEFAULT_METRIC_PREFIX: &str = "jvm.gc.";

/// Consecutive wait cycles the log path may be missing before giving up.
pub const DEFAULT_MAX_MISSING_POLLS: u32 = 5;

/// Immutable settings for one tailing session.
#[derive(Debug, Clone, PartialEq)]
pub struct GcStatsConfig {
    /// GC log file to follow.
    pub path: PathBuf,
    /// Seek to the end on open (tail mode) instead of replaying from 0.
    pub start_at_end: bool,
    /// Sleep between end-of-file retries.
    pub poll_interval: Duration,
    /// Maximum bytes requested per read call.
    pub chunk_size: usize,
    /// Prepended to metric names by sinks that publish them.
    pub metric_prefix: String,
    /// Echo every classified and ignored line at INFO.
    pub debug: bool,
    /// Wait cycles with an unreachable path tolerated before failing.
    pub max_missing_polls: u32,
}

impl Default for GcStatsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("stdout"),
            start_at_end: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            chunk_size: DEFAULT_CHUNK_SIZE,
            metric_prefix: DEFAULT_METRIC_PREFIX.to_string(),
            debug: false,
            max_missing_polls: DEFAULT_MAX_MISSING_POLLS,
        }
    }
}

impl GcStatsConfig {
    /// Default configuration for the given log path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Check values that would make the tailer misbehave.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk size must be greater than zero".to_string());
        }
        if self.poll_interval.is_zero() {
            return Err("poll interval must be greater than zero".to_string());
        }
        if self.path.as_os_str().is_empty() {
            return Err("log path is empty".to_string());
        }
        Ok(())
    }
}
