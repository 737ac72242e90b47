use std::path::PathBuf;
use std::time::Duration;

use crate::limits::DEFAULT_STORE_TIMEOUT;

pub const WAL_FILE_NAME: &str = "appointments.wal";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub data_dir: PathBuf,
    /// Upper bound on every store call.
    pub store_timeout: Duration,
    /// Compact once this many events were appended since the last compaction.
    pub compact_threshold: u64,
    /// Serve `/metrics` on this port; `None` leaves metrics unexported.
    pub metrics_port: Option<u16>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            compact_threshold: 1000,
            metrics_port: None,
        }
    }
}

impl SchedulerConfig {
    /// Read `VIEWINGS_*` variables; anything unset or unparsable keeps its default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: lookup("VIEWINGS_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            store_timeout: lookup("VIEWINGS_STORE_TIMEOUT_MS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.store_timeout),
            compact_threshold: lookup("VIEWINGS_COMPACT_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.compact_threshold),
            metrics_port: lookup("VIEWINGS_METRICS_PORT").and_then(|s| s.parse().ok()),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(WAL_FILE_NAME)
    }
}
