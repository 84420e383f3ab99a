//! Pre-built host scenarios for testing.
//!
//! A scenario is a consistent pair of bus state and filesystem: every unit
//! that reports a `ControlGroup` has matching accounting files, and every
//! `MainPID` has a `/proc/[pid]` tree.

use super::bus::MockBus;
use super::filesystem::MockFs;
use crate::collector::bus::{BusValue, UnitStatus};

/// Cgroup mount point used by all scenarios.
pub const CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Main PID of `foo.service` in [`MockHost::typical`].
pub const FOO_PID: u32 = 812;

const FOO_STAT: &str = "812 (foo) S 1 812 812 0 -1 4194560 2315 15231 11 3 150 75 12 8 20 0 4 0 1520 16515072 1852 18446744073709551615 1 1 0 0 0 0 0 4096 81925 0 0 0 17 2 0 0 0 0 0 0 0 0 0 0 0 0 0";

const FOO_LIMITS: &str = "\
Limit                     Soft Limit           Hard Limit           Units
Max cpu time              unlimited            unlimited            seconds
Max open files            1024                 524288               files
Max address space         unlimited            unlimited            bytes
";

/// Bus and filesystem of a simulated host.
#[derive(Debug, Clone, Default)]
pub struct MockHost {
    pub bus: MockBus,
    pub fs: MockFs,
}

impl MockHost {
    /// Creates an empty host with a unified cgroup hierarchy.
    pub fn new() -> Self {
        let mut fs = MockFs::new();
        fs.add_unified_cgroup_root(CGROUP_ROOT);
        Self {
            bus: MockBus::new(),
            fs,
        }
    }

    /// Adds a loaded unit with the given active state.
    pub fn add_unit(&mut self, name: &str, active_state: &str) {
        let sub_state = match active_state {
            "active" => "running",
            "inactive" => "dead",
            "failed" => "failed",
            other => other,
        };
        self.bus
            .add_unit(UnitStatus::new(name, "loaded", active_state, sub_state));
    }

    /// Sets the type-specific `ControlGroup` property of a unit and, when
    /// the path is non-empty, creates its accounting files.
    pub fn add_control_group(
        &mut self,
        name: &str,
        interface: &str,
        path: &str,
        cpu_stat: &str,
        memory_stat: &str,
    ) {
        self.bus.set_type_property(
            name,
            interface,
            "ControlGroup",
            BusValue::Str(path.to_string()),
        );
        if !path.is_empty() {
            self.fs
                .add_cgroup(CGROUP_ROOT, path, cpu_stat, memory_stat);
        }
    }

    /// A small but complete host:
    ///
    /// - `foo.service`: active simple service with cgroup accounting and a
    ///   main process
    /// - `stopped.service`: inactive, cgroup cleaned up
    /// - `setup.service`: active oneshot with `RemainAfterExit=yes`
    /// - `ssh.socket`: listening socket without CPU accounting, on a
    ///   systemd too old to report `NRefused`
    /// - `boot.mount`: mount without a control group
    /// - `logrotate.timer`: fired timer
    /// - `system.slice`: slice with accounting
    /// - `multi-user.target`: no type-specific collector
    /// - `dev-sda.device`: excluded by the default blacklist
    /// - `ghost.service`: referenced but not found
    pub fn typical() -> Self {
        let mut host = Self::new();

        host.add_unit("foo.service", "active");
        host.add_control_group(
            "foo.service",
            "Service",
            "/system.slice/foo.service",
            "usage_usec 100000\nuser_usec 60000\nsystem_usec 40000\nnr_periods 0\n",
            "anon 4096\nfile 8192\nkernel_stack 16384\nfile_mapped 512\nfile_dirty 0\n",
        );
        host.set_service(
            "foo.service",
            "simple",
            FOO_PID,
            1_700_000_000_000_000,
        );
        host.bus
            .set_type_property("foo.service", "Service", "NRestarts", BusValue::U32(2));
        host.bus
            .set_type_property("foo.service", "Service", "TasksCurrent", BusValue::U64(4));
        host.bus.set_type_property(
            "foo.service",
            "Service",
            "TasksMax",
            BusValue::U64(u64::MAX),
        );
        host.fs.add_process(FOO_PID, FOO_STAT, FOO_LIMITS, 6);

        host.add_unit("stopped.service", "inactive");
        host.add_control_group("stopped.service", "Service", "", "", "");
        host.set_service("stopped.service", "simple", 0, 0);
        host.bus.set_type_property(
            "stopped.service",
            "Service",
            "TasksCurrent",
            BusValue::U64(u64::MAX),
        );
        host.bus
            .set_type_property("stopped.service", "Service", "TasksMax", BusValue::U64(4915));

        host.add_unit("setup.service", "active");
        host.add_control_group("setup.service", "Service", "", "", "");
        host.set_service("setup.service", "oneshot", 0, 1_700_000_100_000_000);
        host.bus.set_type_property(
            "setup.service",
            "Service",
            "RemainAfterExit",
            BusValue::Bool(true),
        );
        host.bus
            .set_type_property("setup.service", "Service", "TasksCurrent", BusValue::U64(0));
        host.bus
            .set_type_property("setup.service", "Service", "TasksMax", BusValue::U64(4915));

        host.add_unit("ssh.socket", "active");
        host.add_control_group(
            "ssh.socket",
            "Socket",
            "/system.slice/ssh.socket",
            "",
            "anon 0\nfile 0\n",
        );
        host.bus
            .set_type_property("ssh.socket", "Socket", "NAccepted", BusValue::U32(10));
        host.bus
            .set_type_property("ssh.socket", "Socket", "NConnections", BusValue::U32(1));

        host.add_unit("boot.mount", "active");
        host.bus
            .set_type_property("boot.mount", "Mount", "Type", BusValue::Str("ext4".into()));

        host.add_unit("logrotate.timer", "active");
        host.bus.set_type_property(
            "logrotate.timer",
            "Timer",
            "LastTriggerUSec",
            BusValue::U64(1_700_000_500_000_000),
        );

        host.add_unit("system.slice", "active");
        host.add_control_group(
            "system.slice",
            "Slice",
            "/system.slice",
            "usage_usec 5000000\nuser_usec 3000000\nsystem_usec 2000000\n",
            "anon 1048576\nfile 2097152\n",
        );

        host.add_unit("multi-user.target", "active");
        host.add_unit("dev-sda.device", "active");
        host.bus
            .add_unit(UnitStatus::new("ghost.service", "not-found", "inactive", "dead"));

        host
    }

    fn set_service(&mut self, name: &str, service_type: &str, main_pid: u32, active_enter_usec: u64) {
        self.bus.set_type_property(
            name,
            "Service",
            "Type",
            BusValue::Str(service_type.to_string()),
        );
        self.bus
            .set_type_property(name, "Service", "Slice", BusValue::Str("system.slice".into()));
        self.bus
            .set_type_property(name, "Service", "MainPID", BusValue::U32(main_pid));
        self.bus.set_type_property(
            name,
            "Service",
            "RemainAfterExit",
            BusValue::Bool(false),
        );
        self.bus.set_property(
            name,
            "ActiveEnterTimestamp",
            BusValue::U64(active_enter_usec),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::bus::UnitBus;
    use crate::collector::traits::FileSystem;
    use std::path::Path;

    #[test]
    fn test_typical_host_is_consistent() {
        let host = MockHost::typical();
        let units = host.bus.list_units().unwrap();
        assert_eq!(units.len(), 10);

        assert!(host.fs.exists(Path::new(
            "/sys/fs/cgroup/system.slice/foo.service/cpu.stat"
        )));
        assert!(!host.fs.exists(Path::new(
            "/sys/fs/cgroup/system.slice/ssh.socket/cpu.stat"
        )));
        assert!(host.fs.exists(Path::new("/proc/812/stat")));
        assert_eq!(
            host.bus
                .unit_type_property("foo.service", "Service", "MainPID")
                .unwrap(),
            BusValue::U32(FOO_PID)
        );
    }
}
