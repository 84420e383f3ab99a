//! Per-unit-type collectors.
//!
//! Every collector is independently fallible: its error is logged against
//! the unit and the remaining collectors still run.

use tracing::{debug, trace, warn};

use crate::collector::bus::UnitBus;
use crate::collector::cgroup::{CgroupError, CgroupFs};
use crate::collector::config::CollectorConfig;
use crate::collector::metrics::{MetricId, SampleSink};
use crate::collector::procfs::ProcessReader;
use crate::collector::resolver::{ControlGroupPath, resolve_or_explain};
use crate::collector::traits::FileSystem;
use crate::collector::unit::{
    Interface, UNIT_STATES, UnitDescriptor, UnitError, UnitProperties, UnitType, non_sentinel,
};

const SERVICE: Interface<'static> = Interface::Type("Service");
const SOCKET: Interface<'static> = Interface::Type("Socket");
const MOUNT: Interface<'static> = Interface::Type("Mount");
const TIMER: Interface<'static> = Interface::Type("Timer");

/// Read-only state shared by all unit workers of one cycle.
pub struct UnitContext<B: UnitBus, F: FileSystem> {
    pub bus: B,
    pub cgroups: CgroupFs<F>,
    pub procs: ProcessReader<F>,
    pub enable_restart_count: bool,
    pub enable_fd_metrics: bool,
}

impl<B: UnitBus, F: FileSystem + Clone> UnitContext<B, F> {
    pub fn new(bus: B, fs: F, config: &CollectorConfig) -> Self {
        Self {
            bus,
            cgroups: CgroupFs::new(fs.clone(), &config.cgroupfs_path),
            procs: ProcessReader::new(fs, &config.procfs_path),
            enable_restart_count: config.enable_restart_count,
            enable_fd_metrics: config.enable_fd_metrics,
        }
    }
}

fn report(unit: &UnitDescriptor, result: Result<(), UnitError>) {
    if let Err(e) = result {
        warn!(unit = %unit.name, "couldn't get unit's metrics: {}", e);
    }
}

/// Runs every collector that applies to `unit`.
pub fn collect_unit<B: UnitBus, F: FileSystem>(
    ctx: &UnitContext<B, F>,
    unit: &UnitDescriptor,
    sink: &SampleSink,
) {
    collect_state(unit, sink);

    if unit.unit_type().has_control_group() {
        collect_control_group(ctx, unit, sink);
    }

    match unit.unit_type() {
        UnitType::Service => {
            report(unit, collect_service_info(ctx, unit, sink));
            report(unit, collect_start_time(ctx, unit, sink));
            if ctx.enable_restart_count {
                report(unit, collect_restart_count(ctx, unit, sink));
            }
            report(unit, collect_tasks(ctx, unit, sink));
            report(unit, collect_process(ctx, unit, sink));
        }
        UnitType::Mount => report(unit, collect_mount_info(ctx, unit, sink)),
        UnitType::Timer => report(unit, collect_timer(ctx, unit, sink)),
        UnitType::Socket => collect_socket(ctx, unit, sink),
        UnitType::Swap | UnitType::Slice | UnitType::Target | UnitType::Other => {
            debug!("no unit type handler for {}", unit.name);
        }
    }
}

/// One-hot `unit_state` over the five active states.
pub fn collect_state(unit: &UnitDescriptor, sink: &SampleSink) {
    for state in UNIT_STATES {
        let value = if unit.active_state == state { 1.0 } else { 0.0 };
        sink.emit(
            MetricId::UnitState,
            &[&unit.name, unit.type_label(), state],
            value,
        );
    }
}

fn collect_control_group<B: UnitBus, F: FileSystem>(
    ctx: &UnitContext<B, F>,
    unit: &UnitDescriptor,
    sink: &SampleSink,
) {
    let path = match resolve_or_explain(&ctx.bus, unit) {
        Ok(ControlGroupPath::Present(path)) => path,
        Ok(ControlGroupPath::Absent(reason)) => {
            trace!(unit = %unit.name, "no control group: {:?}", reason);
            return;
        }
        Err(e) => {
            warn!(unit = %unit.name, "couldn't get unit's metrics: {}", e);
            return;
        }
    };

    if let Err(e) = collect_cpu(ctx, unit, &path, sink) {
        // Most sockets have no CPU accounting of their own.
        if unit.unit_type() == UnitType::Socket {
            debug!(unit = %unit.name, "couldn't get unit's metrics: {}", e);
        } else {
            warn!(unit = %unit.name, "couldn't get unit's metrics: {}", e);
        }
    }
    report(unit, collect_memory(ctx, unit, &path, sink));
}

/// Maps an unreadable accounting file to "nothing to report".
fn skip_unavailable<T>(
    what: &'static str,
    result: Result<T, CgroupError>,
) -> Result<Option<T>, UnitError> {
    match result {
        Ok(stat) => Ok(Some(stat)),
        Err(e) if e.is_unavailable() => {
            trace!("{} not available: {}", what, e);
            Ok(None)
        }
        Err(source) => Err(UnitError::ControlGroup { what, source }),
    }
}

fn collect_cpu<B: UnitBus, F: FileSystem>(
    ctx: &UnitContext<B, F>,
    unit: &UnitDescriptor,
    path: &str,
    sink: &SampleSink,
) -> Result<(), UnitError> {
    let Some(cpu) = skip_unavailable("CPU usage", ctx.cgroups.cpu_stat(path))? else {
        return Ok(());
    };

    let labels = |mode: &'static str| [unit.name.as_str(), unit.type_label(), mode];
    sink.emit(
        MetricId::UnitCpuSecondsTotal,
        &labels("user"),
        cpu.user_usec as f64 / 1_000_000.0,
    );
    sink.emit(
        MetricId::UnitCpuSecondsTotal,
        &labels("system"),
        cpu.system_usec as f64 / 1_000_000.0,
    );
    Ok(())
}

fn collect_memory<B: UnitBus, F: FileSystem>(
    ctx: &UnitContext<B, F>,
    unit: &UnitDescriptor,
    path: &str,
    sink: &SampleSink,
) -> Result<(), UnitError> {
    let Some(mem) = skip_unavailable("Memory stat", ctx.cgroups.memory_stat(path))? else {
        return Ok(());
    };

    let labels = [unit.name.as_str(), unit.type_label()];
    for (metric, value) in [
        (MetricId::UnitFileCacheBytes, mem.file_bytes),
        (MetricId::UnitAnonBytes, mem.anon_bytes),
        (MetricId::UnitKernelStackBytes, mem.kernel_stack_bytes),
        (MetricId::UnitFileCacheDirtyBytes, mem.file_dirty_bytes),
        (MetricId::UnitFileMappedBytes, mem.file_mapped_bytes),
    ] {
        sink.emit(metric, &labels, value as f64);
    }
    Ok(())
}

fn collect_service_info<B: UnitBus, F: FileSystem>(
    ctx: &UnitContext<B, F>,
    unit: &UnitDescriptor,
    sink: &SampleSink,
) -> Result<(), UnitError> {
    let service_type = UnitProperties::new(&ctx.bus, &unit.name).string(SERVICE, "Type")?;
    sink.emit(
        MetricId::UnitInfo,
        &[&unit.name, unit.type_label(), "", &service_type],
        1.0,
    );
    Ok(())
}

fn collect_mount_info<B: UnitBus, F: FileSystem>(
    ctx: &UnitContext<B, F>,
    unit: &UnitDescriptor,
    sink: &SampleSink,
) -> Result<(), UnitError> {
    let mount_type = UnitProperties::new(&ctx.bus, &unit.name).string(MOUNT, "Type")?;
    sink.emit(
        MetricId::UnitInfo,
        &[&unit.name, unit.type_label(), &mount_type, ""],
        1.0,
    );
    Ok(())
}

fn collect_start_time<B: UnitBus, F: FileSystem>(
    ctx: &UnitContext<B, F>,
    unit: &UnitDescriptor,
    sink: &SampleSink,
) -> Result<(), UnitError> {
    let start_usec = if unit.is_active() {
        UnitProperties::new(&ctx.bus, &unit.name).u64(Interface::Unit, "ActiveEnterTimestamp")?
    } else {
        0
    };

    if let Some(usec) = non_sentinel(start_usec) {
        sink.emit(
            MetricId::UnitStartTimeSeconds,
            &[&unit.name, unit.type_label()],
            usec as f64 / 1e6,
        );
    }
    Ok(())
}

fn collect_restart_count<B: UnitBus, F: FileSystem>(
    ctx: &UnitContext<B, F>,
    unit: &UnitDescriptor,
    sink: &SampleSink,
) -> Result<(), UnitError> {
    let restarts = UnitProperties::new(&ctx.bus, &unit.name).u32(SERVICE, "NRestarts")?;
    sink.emit(MetricId::ServiceRestartTotal, &[&unit.name], restarts as f64);
    Ok(())
}

fn collect_tasks<B: UnitBus, F: FileSystem>(
    ctx: &UnitContext<B, F>,
    unit: &UnitDescriptor,
    sink: &SampleSink,
) -> Result<(), UnitError> {
    let props = UnitProperties::new(&ctx.bus, &unit.name);

    if let Some(current) = non_sentinel(props.u64(SERVICE, "TasksCurrent")?) {
        sink.emit(MetricId::UnitTasksCurrent, &[&unit.name], current as f64);
    }
    if let Some(max) = non_sentinel(props.u64(SERVICE, "TasksMax")?) {
        sink.emit(
            MetricId::UnitTasksMax,
            &[&unit.name, unit.type_label()],
            max as f64,
        );
    }
    Ok(())
}

fn collect_process<B: UnitBus, F: FileSystem>(
    ctx: &UnitContext<B, F>,
    unit: &UnitDescriptor,
    sink: &SampleSink,
) -> Result<(), UnitError> {
    let pid = UnitProperties::new(&ctx.bus, &unit.name).u32(SERVICE, "MainPID")?;
    // 0 while the service has no main process.
    if pid == 0 {
        return Ok(());
    }

    let labels = [unit.name.as_str()];
    let stats = ctx.procs.stats(pid)?;
    sink.emit(MetricId::ProcessCpuSecondsTotal, &labels, stats.cpu_seconds);
    sink.emit(
        MetricId::ProcessVirtualMemoryBytes,
        &labels,
        stats.virtual_memory_bytes as f64,
    );
    sink.emit(
        MetricId::ProcessResidentMemoryBytes,
        &labels,
        stats.resident_memory_bytes as f64,
    );

    let limits = ctx.procs.limits(pid)?;
    if let Some(open_files) = limits.open_files {
        sink.emit(MetricId::ProcessMaxFds, &labels, open_files as f64);
    }
    if let Some(address_space) = limits.address_space {
        sink.emit(
            MetricId::ProcessVirtualMemoryMaxBytes,
            &labels,
            address_space as f64,
        );
    }

    if ctx.enable_fd_metrics {
        let fds = ctx.procs.open_fds(pid)?;
        sink.emit(MetricId::ProcessOpenFds, &labels, fds as f64);
    }
    Ok(())
}

fn collect_timer<B: UnitBus, F: FileSystem>(
    ctx: &UnitContext<B, F>,
    unit: &UnitDescriptor,
    sink: &SampleSink,
) -> Result<(), UnitError> {
    let last = UnitProperties::new(&ctx.bus, &unit.name).u64(TIMER, "LastTriggerUSec")?;
    if let Some(usec) = non_sentinel(last) {
        sink.emit(
            MetricId::TimerLastTriggerSeconds,
            &[&unit.name],
            usec as f64 / 1e6,
        );
    }
    Ok(())
}

/// The three socket counters are read independently.
fn collect_socket<B: UnitBus, F: FileSystem>(
    ctx: &UnitContext<B, F>,
    unit: &UnitDescriptor,
    sink: &SampleSink,
) {
    let props = UnitProperties::new(&ctx.bus, &unit.name);

    for (property, metric) in [
        ("NAccepted", MetricId::SocketAcceptedConnectionsTotal),
        ("NConnections", MetricId::SocketCurrentConnections),
        ("NRefused", MetricId::SocketRefusedConnectionsTotal),
    ] {
        match props.u32(SOCKET, property) {
            Ok(value) => sink.emit(metric, &[&unit.name], value as f64),
            // NRefused needs systemd 239+.
            Err(e) if property == "NRefused" && e.is_missing() => {
                debug!(unit = %unit.name, "{}", e);
            }
            Err(e) => warn!(unit = %unit.name, "couldn't get unit's metrics: {}", e),
        }
    }
}
