//! Metric catalogue and the samples a collection cycle produces.

use std::sync::mpsc::Sender;

use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;

/// Prometheus metric type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

/// Every metric the collector can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricId {
    UnitState,
    UnitInfo,
    UnitStartTimeSeconds,
    UnitTasksCurrent,
    UnitTasksMax,
    ServiceRestartTotal,
    TimerLastTriggerSeconds,
    SocketAcceptedConnectionsTotal,
    SocketCurrentConnections,
    SocketRefusedConnectionsTotal,
    ProcessCpuSecondsTotal,
    UnitCpuSecondsTotal,
    UnitFileCacheBytes,
    UnitAnonBytes,
    UnitKernelStackBytes,
    UnitFileCacheDirtyBytes,
    UnitFileMappedBytes,
    ProcessOpenFds,
    ProcessMaxFds,
    ProcessVirtualMemoryBytes,
    ProcessVirtualMemoryMaxBytes,
    ProcessResidentMemoryBytes,
}

/// Static description of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDesc {
    pub id: MetricId,
    pub name: &'static str,
    pub help: &'static str,
    pub labels: &'static [&'static str],
    pub kind: MetricKind,
}

const NAME: &[&str] = &["name"];
const NAME_TYPE: &[&str] = &["name", "type"];

macro_rules! metric {
    ($id:ident, $name:literal, $kind:ident, $labels:expr, $help:literal) => {
        MetricDesc {
            id: MetricId::$id,
            name: concat!("systemd_", $name),
            help: $help,
            labels: $labels,
            kind: MetricKind::$kind,
        }
    };
}

/// The full metric schema, in `MetricId` declaration order.
pub const METRICS: &[MetricDesc] = &[
    metric!(UnitState, "unit_state", Gauge, &["name", "type", "state"], "Systemd unit"),
    metric!(
        UnitInfo,
        "unit_info",
        Gauge,
        &["name", "type", "mount_type", "service_type"],
        "Mostly-static metadata for all unit types"
    ),
    metric!(
        UnitStartTimeSeconds,
        "unit_start_time_seconds",
        Gauge,
        NAME_TYPE,
        "Start time of the unit since unix epoch in seconds."
    ),
    metric!(
        UnitTasksCurrent,
        "unit_tasks_current",
        Gauge,
        NAME,
        "Current number of tasks per Systemd unit"
    ),
    metric!(
        UnitTasksMax,
        "unit_tasks_max",
        Gauge,
        NAME_TYPE,
        "Maximum number of tasks per Systemd unit"
    ),
    metric!(
        ServiceRestartTotal,
        "service_restart_total",
        Counter,
        &["state"],
        "Service unit count of Restart triggers"
    ),
    metric!(
        TimerLastTriggerSeconds,
        "timer_last_trigger_seconds",
        Gauge,
        NAME,
        "Seconds since epoch of last trigger."
    ),
    metric!(
        SocketAcceptedConnectionsTotal,
        "socket_accepted_connections_total",
        Counter,
        NAME,
        "Total number of accepted socket connections"
    ),
    metric!(
        SocketCurrentConnections,
        "socket_current_connections",
        Gauge,
        NAME,
        "Current number of socket connections"
    ),
    metric!(
        SocketRefusedConnectionsTotal,
        "socket_refused_connections_total",
        Counter,
        NAME,
        "Total number of refused socket connections"
    ),
    metric!(
        ProcessCpuSecondsTotal,
        "process_cpu_seconds_total",
        Counter,
        NAME,
        "Total user and system CPU time spent in seconds."
    ),
    metric!(
        UnitCpuSecondsTotal,
        "unit_cpu_seconds_total",
        Counter,
        &["name", "type", "mode"],
        "Unit CPU time in seconds"
    ),
    metric!(
        UnitFileCacheBytes,
        "unit_file_cache_bytes",
        Gauge,
        NAME_TYPE,
        "Unit bytes used to cache filesystem data, including tmpfs and shared memory"
    ),
    metric!(
        UnitAnonBytes,
        "unit_anon_bytes",
        Gauge,
        NAME_TYPE,
        "Unit bytes used in anonymous mappings such as mmap(MAP_ANONYMOUS)"
    ),
    metric!(
        UnitKernelStackBytes,
        "unit_kernel_stack_bytes",
        Gauge,
        NAME_TYPE,
        "Unit bytes allocated to kernel stacks"
    ),
    metric!(
        UnitFileCacheDirtyBytes,
        "unit_file_cache_dirty_bytes",
        Gauge,
        NAME_TYPE,
        "Unit bytes waiting to get written to disk"
    ),
    metric!(
        UnitFileMappedBytes,
        "unit_file_mapped_bytes",
        Gauge,
        NAME_TYPE,
        "Unit bytes of cached filesystem data mapped with mmap()"
    ),
    metric!(
        ProcessOpenFds,
        "process_open_fds",
        Gauge,
        NAME,
        "Number of open file descriptors."
    ),
    metric!(
        ProcessMaxFds,
        "process_max_fds",
        Gauge,
        NAME,
        "Maximum number of open file descriptors."
    ),
    metric!(
        ProcessVirtualMemoryBytes,
        "process_virtual_memory_bytes",
        Gauge,
        NAME,
        "Virtual memory size in bytes."
    ),
    metric!(
        ProcessVirtualMemoryMaxBytes,
        "process_virtual_memory_max_bytes",
        Gauge,
        NAME,
        "Maximum amount of virtual memory available in bytes."
    ),
    metric!(
        ProcessResidentMemoryBytes,
        "process_resident_memory_bytes",
        Gauge,
        NAME,
        "Resident memory size in bytes."
    ),
];

impl MetricId {
    pub fn desc(self) -> &'static MetricDesc {
        &METRICS[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.desc().name
    }
}

/// One measurement: metric, label values in schema order, value.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    metric: MetricId,
    labels: Vec<String>,
    value: f64,
}

impl Sample {
    pub fn new(metric: MetricId, labels: &[&str], value: f64) -> Self {
        debug_assert_eq!(
            labels.len(),
            metric.desc().labels.len(),
            "label arity mismatch for {}",
            metric.name()
        );
        Self {
            metric,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            value,
        }
    }

    pub fn metric(&self) -> MetricId {
        self.metric
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Value of a label by name.
    pub fn label(&self, name: &str) -> Option<&str> {
        let index = self.metric.desc().labels.iter().position(|l| *l == name)?;
        self.labels.get(index).map(String::as_str)
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

struct LabelMap<'a>(&'a [&'static str], &'a [String]);

impl Serialize for LabelMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().zip(self.1.iter()))
    }
}

impl Serialize for Sample {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let desc = self.metric.desc();
        let mut state = serializer.serialize_struct("Sample", 4)?;
        state.serialize_field("name", desc.name)?;
        state.serialize_field("kind", &desc.kind)?;
        state.serialize_field("labels", &LabelMap(desc.labels, &self.labels))?;
        state.serialize_field("value", &self.value)?;
        state.end()
    }
}

/// Sending half of a cycle's sample channel.
///
/// Sends after the cycle stopped listening (deadline passed) are dropped.
#[derive(Debug, Clone)]
pub struct SampleSink {
    tx: Sender<Sample>,
}

impl SampleSink {
    pub fn new(tx: Sender<Sample>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, metric: MetricId, labels: &[&str], value: f64) {
        let _ = self.tx.send(Sample::new(metric, labels, value));
    }
}
