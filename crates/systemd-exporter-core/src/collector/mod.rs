//! systemd unit metrics collector.
//!
//! Reads unit state from systemd's management bus and resource usage from
//! cgroupfs and procfs, with test doubles for both so the whole engine runs
//! without Linux.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Collector                           │
//! │   connect ─► ListUnits ─► UnitFilter ─► one thread per unit  │
//! │                                               │              │
//! │        ┌──────────────────────────────────────┤              │
//! │        │                  │                   │              │
//! │  ┌─────▼─────┐     ┌──────▼──────┐     ┌──────▼──────┐       │
//! │  │ resolver  │     │  CgroupFs   │     │ProcessReader│       │
//! │  │ (cgroup   │     │ cpu.stat    │     │ /proc/[pid] │       │
//! │  │  path)    │     │ memory.stat │     │             │       │
//! │  └─────┬─────┘     └──────┬──────┘     └──────┬──────┘       │
//! │        │                  └─────────┬─────────┘              │
//! │  ┌─────▼─────┐               ┌──────▼──────┐                 │
//! │  │  UnitBus  │ (trait)       │  FileSystem │ (trait)         │
//! │  └─────┬─────┘               └──────┬──────┘                 │
//! └────────┼────────────────────────────┼────────────────────────┘
//!          │                            │
//!    ┌─────┴──────┐              ┌──────┴─────┐
//!    │ SystemdBus │ MockBus      │   RealFs   │ MockFs
//!    └────────────┘              └────────────┘
//! ```
//!
//! Workers send [`Sample`]s over a channel; the cycle ends when the last
//! worker drops its sender or the optional deadline passes.
//!
//! # Usage
//!
//! ## Production (Linux)
//!
//! ```ignore
//! use systemd_exporter_core::collector::{Collector, CollectorConfig, RealFs, SystemdConnector};
//!
//! let config = CollectorConfig::default();
//! let connector = SystemdConnector::new(config.private);
//! let collector = Collector::new(connector, RealFs::new(), config)?;
//! let samples = collector.collect();
//! ```
//!
//! ## Testing (with MockHost)
//!
//! ```
//! use systemd_exporter_core::collector::mock::{CGROUP_ROOT, MockConnector, MockHost};
//! use systemd_exporter_core::collector::{Collector, CollectorConfig};
//!
//! let host = MockHost::typical();
//! let config = CollectorConfig {
//!     cgroupfs_path: CGROUP_ROOT.into(),
//!     ..Default::default()
//! };
//! let collector = Collector::new(MockConnector::new(host.bus), host.fs, config).unwrap();
//! assert!(!collector.collect().is_empty());
//! ```

pub mod bus;
pub mod cgroup;
#[allow(clippy::module_inception)]
mod collector;
mod config;
mod filter;
pub mod metrics;
pub mod mock;
pub mod procfs;
pub mod resolver;
pub mod traits;
pub mod unit;
mod units;

#[cfg(feature = "dbus")]
pub use bus::{SystemdBus, SystemdConnector};
pub use bus::{BusConnector, BusError, BusValue, UnitBus, UnitStatus};
pub use collector::{CollectError, Collector, CollectorTiming, Cycle};
pub use config::{CollectorConfig, ConfigError};
pub use filter::UnitFilter;
pub use metrics::{METRICS, MetricDesc, MetricId, MetricKind, Sample};
pub use mock::{MockBus, MockFs};
pub use resolver::{AbsentReason, ControlGroupPath};
pub use traits::{FileSystem, ReadError, RealFs};
pub use unit::{PropertyError, UnitDescriptor, UnitError, UnitType};
