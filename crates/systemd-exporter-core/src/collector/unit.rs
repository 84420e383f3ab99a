//! Per-cycle unit snapshot and typed property access.

use thiserror::Error;

use crate::collector::bus::{BusError, BusValue, UnitBus, UnitStatus};
use crate::collector::cgroup::CgroupError;
use crate::collector::procfs::ProcessError;

/// Active states reported by systemd, in exposition order.
pub const UNIT_STATES: [&str; 5] = ["active", "activating", "deactivating", "inactive", "failed"];

/// Unit kinds with a dedicated collector. Everything else is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitType {
    Service,
    Socket,
    Mount,
    Swap,
    Slice,
    Timer,
    Target,
    Other,
}

impl UnitType {
    pub fn from_suffix(suffix: &str) -> Self {
        match suffix {
            "service" => UnitType::Service,
            "socket" => UnitType::Socket,
            "mount" => UnitType::Mount,
            "swap" => UnitType::Swap,
            "slice" => UnitType::Slice,
            "timer" => UnitType::Timer,
            "target" => UnitType::Target,
            _ => UnitType::Other,
        }
    }

    /// Whether systemd places units of this type in their own cgroup.
    pub fn has_control_group(self) -> bool {
        matches!(
            self,
            UnitType::Service | UnitType::Mount | UnitType::Socket | UnitType::Swap | UnitType::Slice
        )
    }
}

/// Immutable snapshot of one unit for the duration of a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitDescriptor {
    pub name: String,
    pub description: String,
    pub load_state: String,
    pub active_state: String,
    pub sub_state: String,
    suffix: String,
    unit_type: UnitType,
}

impl UnitDescriptor {
    pub fn new(status: UnitStatus) -> Self {
        // A name without a dot is its own suffix.
        let suffix = status
            .name
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .to_string();
        let unit_type = UnitType::from_suffix(&suffix);

        Self {
            name: status.name,
            description: status.description,
            load_state: status.load_state,
            active_state: status.active_state,
            sub_state: status.sub_state,
            suffix,
            unit_type,
        }
    }

    pub fn unit_type(&self) -> UnitType {
        self.unit_type
    }

    /// Raw name suffix, used as the `type` label (`service`, `device`, ...).
    pub fn type_label(&self) -> &str {
        &self.suffix
    }

    /// Short name of the type-specific D-Bus interface: the suffix with its
    /// first letter upper-cased (`service` -> `Service`).
    pub fn interface(&self) -> String {
        let mut chars = self.suffix.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active_state == "active"
    }
}

/// Failure to read or decode a single unit property.
#[derive(Debug, Error)]
pub enum PropertyError {
    #[error("couldn't get unit's {property} property: {source}")]
    Bus {
        property: &'static str,
        #[source]
        source: BusError,
    },
    #[error(
        "couldn't convert unit's {property} property {value} of type {} to {expected}",
        .value.signature()
    )]
    Type {
        property: &'static str,
        value: BusValue,
        expected: &'static str,
    },
}

impl PropertyError {
    pub fn is_missing(&self) -> bool {
        matches!(self, PropertyError::Bus { source, .. } if source.is_missing_property())
    }
}

/// Error of one collector for one unit. Never aborts the cycle.
#[derive(Debug, Error)]
pub enum UnitError {
    #[error(transparent)]
    Property(#[from] PropertyError),
    #[error(
        "got 'no cgroup' from systemd for active unit (state={state} subtype={subtype} slice={slice})"
    )]
    NoControlGroup {
        state: String,
        subtype: String,
        slice: String,
    },
    #[error("failed to read {what} from control group: {source}")]
    ControlGroup {
        what: &'static str,
        #[source]
        source: CgroupError,
    },
    #[error("couldn't get process metrics: {0}")]
    Process(#[from] ProcessError),
}

/// Which interface a property lives on.
#[derive(Debug, Clone, Copy)]
pub enum Interface<'a> {
    /// `org.freedesktop.systemd1.Unit`
    Unit,
    /// `org.freedesktop.systemd1.<name>`
    Type(&'a str),
}

/// Typed property reads for one unit.
pub struct UnitProperties<'a, B: UnitBus + ?Sized> {
    bus: &'a B,
    unit: &'a str,
}

impl<'a, B: UnitBus + ?Sized> UnitProperties<'a, B> {
    pub fn new(bus: &'a B, unit: &'a str) -> Self {
        Self { bus, unit }
    }

    pub fn get(&self, interface: Interface<'_>, property: &'static str) -> Result<BusValue, PropertyError> {
        let result = match interface {
            Interface::Unit => self.bus.unit_property(self.unit, property),
            Interface::Type(name) => self.bus.unit_type_property(self.unit, name, property),
        };
        result.map_err(|source| PropertyError::Bus { property, source })
    }

    pub fn string(&self, interface: Interface<'_>, property: &'static str) -> Result<String, PropertyError> {
        match self.get(interface, property)? {
            BusValue::Str(s) => Ok(s),
            value => Err(mismatch(property, value, "string")),
        }
    }

    pub fn u32(&self, interface: Interface<'_>, property: &'static str) -> Result<u32, PropertyError> {
        match self.get(interface, property)? {
            BusValue::U32(v) => Ok(v),
            value => Err(mismatch(property, value, "uint32")),
        }
    }

    pub fn u64(&self, interface: Interface<'_>, property: &'static str) -> Result<u64, PropertyError> {
        match self.get(interface, property)? {
            BusValue::U64(v) => Ok(v),
            value => Err(mismatch(property, value, "uint64")),
        }
    }

    pub fn bool(&self, interface: Interface<'_>, property: &'static str) -> Result<bool, PropertyError> {
        match self.get(interface, property)? {
            BusValue::Bool(v) => Ok(v),
            value => Err(mismatch(property, value, "bool")),
        }
    }

    /// Reads a string property, falling back to `"unknown"` on any error.
    /// Only used to enrich log and error messages.
    pub fn string_or_unknown(&self, interface: Interface<'_>, property: &'static str) -> String {
        self.string(interface, property).unwrap_or_else(|e| {
            tracing::debug!(unit = %self.unit, "{}", e);
            "unknown".to_string()
        })
    }
}

fn mismatch(property: &'static str, value: BusValue, expected: &'static str) -> PropertyError {
    PropertyError::Type {
        property,
        value,
        expected,
    }
}

/// Drops systemd's "unset" sentinel.
pub fn non_sentinel(value: u64) -> Option<u64> {
    (value != u64::MAX).then_some(value)
}
