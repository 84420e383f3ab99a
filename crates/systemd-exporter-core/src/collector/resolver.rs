//! Resolves which cgroup holds a unit's accounting data.

use tracing::debug;

use crate::collector::bus::UnitBus;
use crate::collector::unit::{Interface, UnitDescriptor, UnitError, UnitProperties, UnitType};

/// Why a unit has no cgroup to read this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsentReason {
    /// systemd already cleaned up an inactive or failed unit.
    Inactive,
    /// The unit is changing state.
    Transitional,
    /// Mount units are not always placed in a cgroup.
    NotControlled,
    /// A oneshot service that exited but is still considered active.
    RemainAfterExit,
}

/// Outcome of cgroup resolution. A present path is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlGroupPath {
    Present(String),
    Absent(AbsentReason),
}

impl ControlGroupPath {
    pub fn as_path(&self) -> Option<&str> {
        match self {
            ControlGroupPath::Present(path) => Some(path),
            ControlGroupPath::Absent(_) => None,
        }
    }
}

/// Reads the type-specific `ControlGroup` property and classifies it.
///
/// | path      | active state        | result                 |
/// |-----------|---------------------|------------------------|
/// | empty     | inactive, failed    | `Absent(Inactive)`     |
/// | empty     | active              | error                  |
/// | empty     | anything else       | `Absent(Transitional)` |
/// | non-empty | any                 | `Present(path)`        |
pub fn resolve<B: UnitBus + ?Sized>(
    bus: &B,
    unit: &UnitDescriptor,
) -> Result<ControlGroupPath, UnitError> {
    let interface = unit.interface();
    let props = UnitProperties::new(bus, &unit.name);
    let path = props.string(Interface::Type(&interface), "ControlGroup")?;

    if !path.is_empty() {
        return Ok(ControlGroupPath::Present(path));
    }

    match unit.active_state.as_str() {
        "inactive" | "failed" => Ok(ControlGroupPath::Absent(AbsentReason::Inactive)),
        "active" => Err(UnitError::NoControlGroup {
            state: unit.active_state.clone(),
            subtype: props.string_or_unknown(Interface::Type(&interface), "Type"),
            slice: props.string_or_unknown(Interface::Type(&interface), "Slice"),
        }),
        state => {
            debug!(
                "Read 'no cgroup' from unit (name={} state={} subtype={} slice={})",
                unit.name,
                state,
                props.string_or_unknown(Interface::Type(&interface), "Type"),
                props.string_or_unknown(Interface::Type(&interface), "Slice"),
            );
            Ok(ControlGroupPath::Absent(AbsentReason::Transitional))
        }
    }
}

/// [`resolve`] plus the caller-side exceptions: a failing mount unit is not
/// controlled, and a failing service with `RemainAfterExit=yes` has simply
/// exited. Any other failure is returned.
pub fn resolve_or_explain<B: UnitBus + ?Sized>(
    bus: &B,
    unit: &UnitDescriptor,
) -> Result<ControlGroupPath, UnitError> {
    let err = match resolve(bus, unit) {
        Ok(path) => return Ok(path),
        Err(err) => err,
    };

    match unit.unit_type() {
        UnitType::Mount => Ok(ControlGroupPath::Absent(AbsentReason::NotControlled)),
        _ => {
            let remain_after_exit = UnitProperties::new(bus, &unit.name)
                .bool(Interface::Type("Service"), "RemainAfterExit")
                .unwrap_or(false);
            if remain_after_exit {
                Ok(ControlGroupPath::Absent(AbsentReason::RemainAfterExit))
            } else {
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::bus::{BusValue, UnitStatus};
    use crate::collector::mock::MockBus;

    fn unit(name: &str, active_state: &str) -> UnitDescriptor {
        UnitDescriptor::new(UnitStatus::new(name, "loaded", active_state, ""))
    }

    fn bus_with_cgroup(name: &str, interface: &str, path: &str) -> MockBus {
        let mut bus = MockBus::new();
        bus.set_type_property(name, interface, "ControlGroup", BusValue::Str(path.into()));
        bus
    }

    #[test]
    fn test_present_path() {
        let bus = bus_with_cgroup("foo.service", "Service", "/system.slice/foo.service");
        let path = resolve(&bus, &unit("foo.service", "active")).unwrap();
        assert_eq!(path, ControlGroupPath::Present("/system.slice/foo.service".into()));
        assert_eq!(path.as_path(), Some("/system.slice/foo.service"));
    }

    #[test]
    fn test_present_path_regardless_of_state() {
        let bus = bus_with_cgroup("foo.service", "Service", "/system.slice/foo.service");
        let path = resolve(&bus, &unit("foo.service", "deactivating")).unwrap();
        assert_eq!(path.as_path(), Some("/system.slice/foo.service"));
    }

    #[test]
    fn test_empty_inactive_or_failed() {
        let bus = bus_with_cgroup("foo.service", "Service", "");
        for state in ["inactive", "failed"] {
            assert_eq!(
                resolve(&bus, &unit("foo.service", state)).unwrap(),
                ControlGroupPath::Absent(AbsentReason::Inactive)
            );
        }
    }

    #[test]
    fn test_empty_active_is_error_with_context() {
        let mut bus = bus_with_cgroup("foo.service", "Service", "");
        bus.set_type_property("foo.service", "Service", "Type", BusValue::Str("notify".into()));
        bus.set_type_property(
            "foo.service",
            "Service",
            "Slice",
            BusValue::Str("system.slice".into()),
        );

        let err = resolve(&bus, &unit("foo.service", "active")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "got 'no cgroup' from systemd for active unit (state=active subtype=notify slice=system.slice)"
        );
    }

    #[test]
    fn test_empty_active_unknown_context() {
        let bus = bus_with_cgroup("foo.service", "Service", "");
        let err = resolve(&bus, &unit("foo.service", "active")).unwrap_err();
        match err {
            UnitError::NoControlGroup { subtype, slice, .. } => {
                assert_eq!(subtype, "unknown");
                assert_eq!(slice, "unknown");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_empty_transitional() {
        let bus = bus_with_cgroup("foo.socket", "Socket", "");
        for state in ["activating", "deactivating", "reloading"] {
            assert_eq!(
                resolve(&bus, &unit("foo.socket", state)).unwrap(),
                ControlGroupPath::Absent(AbsentReason::Transitional)
            );
        }
    }

    #[test]
    fn test_uses_type_interface() {
        let bus = bus_with_cgroup("user.slice", "Slice", "/user.slice");
        assert_eq!(
            resolve(&bus, &unit("user.slice", "active")).unwrap().as_path(),
            Some("/user.slice")
        );
        // Property set on the wrong interface is not found.
        let bus = bus_with_cgroup("user.slice", "Service", "/user.slice");
        assert!(resolve(&bus, &unit("user.slice", "active")).is_err());
    }

    #[test]
    fn test_type_mismatch() {
        let mut bus = MockBus::new();
        bus.set_type_property("foo.service", "Service", "ControlGroup", BusValue::U32(0));
        let err = resolve(&bus, &unit("foo.service", "active")).unwrap_err();
        assert!(matches!(err, UnitError::Property(_)));
    }

    #[test]
    fn test_mount_without_cgroup() {
        let bus = MockBus::new();
        assert_eq!(
            resolve_or_explain(&bus, &unit("boot.mount", "active")).unwrap(),
            ControlGroupPath::Absent(AbsentReason::NotControlled)
        );
    }

    #[test]
    fn test_remain_after_exit() {
        let mut bus = bus_with_cgroup("setup.service", "Service", "");
        bus.set_type_property(
            "setup.service",
            "Service",
            "RemainAfterExit",
            BusValue::Bool(true),
        );
        assert_eq!(
            resolve_or_explain(&bus, &unit("setup.service", "active")).unwrap(),
            ControlGroupPath::Absent(AbsentReason::RemainAfterExit)
        );

        bus.set_type_property(
            "setup.service",
            "Service",
            "RemainAfterExit",
            BusValue::Bool(false),
        );
        assert!(resolve_or_explain(&bus, &unit("setup.service", "active")).is_err());
    }

    #[test]
    fn test_other_failures_propagate() {
        let bus = MockBus::new();
        assert!(resolve_or_explain(&bus, &unit("ssh.socket", "active")).is_err());
    }
}
