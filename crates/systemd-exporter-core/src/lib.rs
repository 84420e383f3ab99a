//! systemd-exporter-core: collection engine for systemd unit metrics.
//!
//! Provides:
//! - `collector`: unit discovery and filtering, per-unit-type collectors,
//!   cgroupfs/procfs readers, the management bus client and the metric
//!   catalogue
//!
//! With `dbus` feature (default):
//! - `collector::SystemdConnector`: zbus-backed connection to systemd

pub mod collector;

/// Crate version, reported by the exporter's landing page and logs.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
