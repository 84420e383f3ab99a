//! Collection orchestrator.
//!
//! One cycle opens a bus connection, lists and filters units, runs every
//! unit's collectors on its own thread and gathers the samples they send.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::collector::bus::{BusConnector, BusError, UnitBus};
use crate::collector::config::{CollectorConfig, ConfigError};
use crate::collector::filter::UnitFilter;
use crate::collector::metrics::{Sample, SampleSink};
use crate::collector::traits::FileSystem;
use crate::collector::unit::UnitDescriptor;
use crate::collector::units::{UnitContext, collect_unit};

/// Error that aborts a whole cycle.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("couldn't get dbus connection: {0}")]
    Connect(#[source] BusError),
    #[error("could not get list of systemd units from dbus: {0}")]
    ListUnits(#[source] BusError),
}

/// Timing information for each cycle phase.
///
/// Used for debugging and performance monitoring.
#[derive(Debug, Clone, Default)]
pub struct CollectorTiming {
    /// Total cycle time.
    pub total: Duration,
    /// Time to open the bus connection.
    pub connect: Duration,
    /// Time of the `ListUnits` call.
    pub list_units: Duration,
    /// Time to apply the unit filter.
    pub filter: Duration,
    /// Time from the first worker spawn until the last sample arrived.
    pub units: Duration,
}

/// Result of one collection cycle.
#[derive(Debug, Clone, Default)]
pub struct Cycle {
    pub samples: Vec<Sample>,
    pub timing: CollectorTiming,
    /// Units that passed the filter.
    pub units: usize,
    /// Unit workers still running when the deadline passed.
    pub unfinished: usize,
}

/// Collects systemd unit metrics.
///
/// Holds no state between cycles besides its configuration; every call to
/// [`Collector::try_collect`] starts from a fresh connection.
pub struct Collector<C: BusConnector, F: FileSystem> {
    connector: C,
    fs: F,
    config: CollectorConfig,
    filter: UnitFilter,
}

impl<C, F> Collector<C, F>
where
    C: BusConnector,
    F: FileSystem + Clone + 'static,
{
    /// Creates a new collector.
    ///
    /// # Arguments
    /// * `connector` - Opens the bus connection for each cycle
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `config` - Unit patterns, mount points and optional metrics
    pub fn new(connector: C, fs: F, config: CollectorConfig) -> Result<Self, ConfigError> {
        let filter = config.unit_filter()?;
        Ok(Self {
            connector,
            fs,
            config,
            filter,
        })
    }

    /// Runs one cycle, or fails if systemd cannot be reached or listed.
    ///
    /// Per-unit errors are logged and never fail the cycle.
    pub fn try_collect(&self) -> Result<Cycle, CollectError> {
        let total_start = Instant::now();
        let mut timing = CollectorTiming::default();

        let start = Instant::now();
        let bus = self.connector.connect().map_err(CollectError::Connect)?;
        timing.connect = start.elapsed();

        let start = Instant::now();
        let units = bus.list_units().map_err(CollectError::ListUnits)?;
        timing.list_units = start.elapsed();
        debug!("systemd ListUnits took {:?}", timing.list_units);

        let start = Instant::now();
        let units = self
            .filter
            .filter(units.into_iter().map(UnitDescriptor::new).collect());
        timing.filter = start.elapsed();
        debug!("systemd filterUnits took {:?}", timing.filter);

        let start = Instant::now();
        let unit_count = units.len();
        let deadline = self.config.timeout.map(|timeout| start + timeout);
        let running = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();

        // The connection closes when the last worker drops its context.
        let ctx = Arc::new(UnitContext::new(bus, self.fs.clone(), &self.config));
        for unit in units {
            let name = unit.name.clone();
            let ctx = Arc::clone(&ctx);
            let sink = SampleSink::new(tx.clone());
            let worker_running = Arc::clone(&running);

            running.fetch_add(1, Ordering::SeqCst);
            let spawned = thread::Builder::new()
                .name("unit-worker".to_string())
                .spawn(move || {
                    collect_unit(&ctx, &unit, &sink);
                    drop(ctx);
                    worker_running.fetch_sub(1, Ordering::SeqCst);
                    drop(sink);
                });
            if let Err(e) = spawned {
                running.fetch_sub(1, Ordering::SeqCst);
                warn!("couldn't spawn worker for unit {}: {}", name, e);
            }
        }
        drop(tx);
        drop(ctx);

        let samples = receive(rx, deadline);
        timing.units = start.elapsed();

        let unfinished = running.load(Ordering::SeqCst);
        if unfinished > 0 {
            warn!(
                "collection deadline passed with {} of {} unit(s) still running, their samples are dropped",
                unfinished, unit_count
            );
        }

        timing.total = total_start.elapsed();
        debug!(
            "collected {} samples from {} units in {:?} (connect {:?}, list {:?}, filter {:?}, units {:?})",
            samples.len(),
            unit_count,
            timing.total,
            timing.connect,
            timing.list_units,
            timing.filter,
            timing.units
        );

        Ok(Cycle {
            samples,
            timing,
            units: unit_count,
            unfinished,
        })
    }

    /// Runs one cycle and returns its samples. A cycle-level failure is
    /// logged and yields no samples.
    pub fn collect(&self) -> Vec<Sample> {
        match self.try_collect() {
            Ok(cycle) => cycle.samples,
            Err(e) => {
                error!("{}", e);
                Vec::new()
            }
        }
    }
}

/// Drains the sample channel until every sender is gone or the deadline
/// passes.
fn receive(rx: Receiver<Sample>, deadline: Option<Instant>) -> Vec<Sample> {
    let Some(deadline) = deadline else {
        return rx.iter().collect();
    };

    let mut samples = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(sample) => samples.push(sample),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
        }
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::bus::BusValue;
    use crate::collector::metrics::MetricId;
    use crate::collector::mock::{CGROUP_ROOT, MockConnector, MockFs, MockHost};

    fn config() -> CollectorConfig {
        CollectorConfig {
            cgroupfs_path: CGROUP_ROOT.into(),
            ..Default::default()
        }
    }

    fn collector(host: MockHost, config: CollectorConfig) -> (Collector<MockConnector, MockFs>, MockConnector) {
        let connector = MockConnector::new(host.bus);
        let collector = Collector::new(connector.clone(), host.fs, config).unwrap();
        (collector, connector)
    }

    fn unit_samples<'a>(samples: &'a [Sample], unit: &str, metric: MetricId) -> Vec<&'a Sample> {
        samples
            .iter()
            .filter(|s| s.metric() == metric && s.label("name") == Some(unit))
            .collect()
    }

    #[test]
    fn test_collect_typical_host() {
        let (collector, _) = collector(MockHost::typical(), config());
        let cycle = collector.try_collect().unwrap();

        // dev-sda.device is blacklisted, ghost.service is not loaded.
        assert_eq!(cycle.units, 8);
        assert_eq!(cycle.unfinished, 0);
        assert_eq!(
            cycle
                .samples
                .iter()
                .filter(|s| s.metric() == MetricId::UnitState)
                .count(),
            8 * 5
        );
        assert!(cycle.samples.iter().all(|s| s.label("name") != Some("dev-sda.device")));
        assert!(cycle.samples.iter().all(|s| s.label("name") != Some("ghost.service")));
    }

    #[test]
    fn test_foo_service_end_to_end() {
        let (collector, _) = collector(MockHost::typical(), config());
        let samples = collector.collect();

        let cpu = unit_samples(&samples, "foo.service", MetricId::UnitCpuSecondsTotal);
        let user = cpu.iter().find(|s| s.label("mode") == Some("user")).unwrap();
        let system = cpu.iter().find(|s| s.label("mode") == Some("system")).unwrap();
        assert!((user.value() - 0.06).abs() < 1e-9);
        assert!((system.value() - 0.04).abs() < 1e-9);

        let anon = unit_samples(&samples, "foo.service", MetricId::UnitAnonBytes);
        assert_eq!(anon.len(), 1);
        assert_eq!(anon[0].value(), 4096.0);
        assert_eq!(anon[0].label("type"), Some("service"));

        let file = unit_samples(&samples, "foo.service", MetricId::UnitFileCacheBytes);
        assert_eq!(file[0].value(), 8192.0);

        let states = unit_samples(&samples, "foo.service", MetricId::UnitState);
        assert_eq!(states.len(), 5);
        for state in states {
            let expected = if state.label("state") == Some("active") { 1.0 } else { 0.0 };
            assert_eq!(state.value(), expected);
        }
    }

    #[test]
    fn test_connection_closed_after_cycle() {
        let (collector, connector) = collector(MockHost::typical(), config());

        collector.try_collect().unwrap();
        assert_eq!(connector.opened(), 1);
        assert_eq!(connector.live(), 0);

        collector.try_collect().unwrap();
        assert_eq!(connector.opened(), 2);
        assert_eq!(connector.live(), 0);
    }

    #[test]
    fn test_connect_failure() {
        let collector = Collector::new(
            MockConnector::unreachable("connection refused"),
            MockFs::new(),
            config(),
        )
        .unwrap();

        let err = collector.try_collect().unwrap_err();
        assert!(matches!(err, CollectError::Connect(_)));
        assert!(err.to_string().starts_with("couldn't get dbus connection"));
        assert!(collector.collect().is_empty());
    }

    #[test]
    fn test_list_units_failure() {
        let mut host = MockHost::typical();
        host.bus.fail_list_units("timed out");
        let (collector, connector) = collector(host, config());

        assert!(matches!(
            collector.try_collect(),
            Err(CollectError::ListUnits(_))
        ));
        assert!(collector.collect().is_empty());
        assert_eq!(connector.live(), 0);
    }

    #[test]
    fn test_empty_after_filter() {
        let config = CollectorConfig {
            unit_whitelist: r"nothing\.matches".to_string(),
            ..config()
        };
        let (collector, _) = collector(MockHost::typical(), config);
        let cycle = collector.try_collect().unwrap();
        assert_eq!(cycle.units, 0);
        assert!(cycle.samples.is_empty());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let config = CollectorConfig {
            unit_whitelist: "(".to_string(),
            ..config()
        };
        let result = Collector::new(MockConnector::new(Default::default()), MockFs::new(), config);
        assert!(result.is_err());
    }

    #[test]
    fn test_deadline_drops_slow_units() {
        let mut host = MockHost::typical();
        host.add_unit("slow.service", "active");
        host.bus.set_type_property(
            "slow.service",
            "Service",
            "TasksCurrent",
            BusValue::U64(1),
        );
        host.bus.set_delay("slow.service", Duration::from_secs(2));

        let config = CollectorConfig {
            timeout: Some(Duration::from_millis(300)),
            ..config()
        };
        let (collector, _) = collector(host, config);

        let started = Instant::now();
        let cycle = collector.try_collect().unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));

        assert_eq!(cycle.unfinished, 1);
        assert!(unit_samples(&cycle.samples, "slow.service", MetricId::UnitTasksCurrent).is_empty());
        assert_eq!(
            unit_samples(&cycle.samples, "foo.service", MetricId::UnitAnonBytes).len(),
            1
        );
    }

    #[test]
    fn test_no_deadline_waits_for_all_units() {
        let mut host = MockHost::new();
        host.add_unit("slow.service", "active");
        host.bus.set_type_property(
            "slow.service",
            "Service",
            "TasksCurrent",
            BusValue::U64(1),
        );
        host.bus.set_delay("slow.service", Duration::from_millis(50));
        let (collector, _) = collector(host, config());

        let cycle = collector.try_collect().unwrap();
        assert_eq!(cycle.unfinished, 0);
        assert_eq!(
            unit_samples(&cycle.samples, "slow.service", MetricId::UnitTasksCurrent).len(),
            1
        );
    }
}
