//! Collector configuration, built once at startup.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::collector::filter::UnitFilter;

/// Startup configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {which} pattern {pattern:?}: {source}")]
    InvalidPattern {
        which: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Immutable settings shared by every collection cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorConfig {
    /// Units must match this pattern to be collected.
    pub unit_whitelist: String,
    /// Units matching this pattern are skipped.
    pub unit_blacklist: String,
    /// Connect to `/run/systemd/private` instead of the system bus.
    pub private: bool,
    pub procfs_path: PathBuf,
    pub cgroupfs_path: PathBuf,
    /// Export `service_restart_total` (needs systemd 235+).
    pub enable_restart_count: bool,
    /// Export `process_open_fds` (needs access to `/proc/[pid]/fd`).
    pub enable_fd_metrics: bool,
    /// Upper bound for one cycle. `None` waits for every unit.
    pub timeout: Option<Duration>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            unit_whitelist: ".+".to_string(),
            unit_blacklist: r".+\.(device)".to_string(),
            private: false,
            procfs_path: PathBuf::from("/proc"),
            cgroupfs_path: PathBuf::from("/sys/fs/cgroup"),
            enable_restart_count: false,
            enable_fd_metrics: false,
            timeout: None,
        }
    }
}

impl CollectorConfig {
    /// Compiles the whitelist and blacklist.
    pub fn unit_filter(&self) -> Result<UnitFilter, ConfigError> {
        UnitFilter::new(&self.unit_whitelist, &self.unit_blacklist)
    }
}
