//! Access to systemd's management bus (`org.freedesktop.systemd1`).
//!
//! The collectors only see the [`UnitBus`] trait, so a cycle can run
//! against the real D-Bus API or against [`MockBus`](crate::collector::mock::MockBus)
//! in tests.

#[cfg(feature = "dbus")]
mod dbus;

use std::fmt;

use thiserror::Error;

#[cfg(feature = "dbus")]
pub use dbus::{SystemdBus, SystemdConnector, bus_path_escape, unit_object_path};

/// Interface shared by every unit object.
pub const UNIT_INTERFACE: &str = "org.freedesktop.systemd1.Unit";

/// Prefix of the per-type interfaces (`org.freedesktop.systemd1.Service`, ...).
pub const INTERFACE_PREFIX: &str = "org.freedesktop.systemd1.";

/// Error talking to the management bus.
#[derive(Debug, Error)]
pub enum BusError {
    #[cfg(feature = "dbus")]
    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),
    /// The unit object does not expose the requested property
    /// (e.g. `NRefused` on systemd older than 239).
    #[error("unit {unit} has no property {property}")]
    MissingProperty { unit: String, property: String },
    /// The bus could not be reached at all.
    #[error("bus unavailable: {0}")]
    Unavailable(String),
}

impl BusError {
    pub fn is_missing_property(&self) -> bool {
        matches!(self, BusError::MissingProperty { .. })
    }
}

/// A dynamically typed property value as returned by `Properties.Get`.
///
/// Only the variants the collectors consume are decoded; anything else is
/// kept as its D-Bus signature so mismatches can be reported.
#[derive(Debug, Clone, PartialEq)]
pub enum BusValue {
    Str(String),
    U32(u32),
    U64(u64),
    Bool(bool),
    Other(String),
}

impl BusValue {
    /// D-Bus signature of the value.
    pub fn signature(&self) -> &str {
        match self {
            BusValue::Str(_) => "s",
            BusValue::U32(_) => "u",
            BusValue::U64(_) => "t",
            BusValue::Bool(_) => "b",
            BusValue::Other(sig) => sig,
        }
    }
}

impl fmt::Display for BusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusValue::Str(s) => write!(f, "{:?}", s),
            BusValue::U32(v) => write!(f, "{}", v),
            BusValue::U64(v) => write!(f, "{}", v),
            BusValue::Bool(v) => write!(f, "{}", v),
            BusValue::Other(sig) => write!(f, "<{}>", sig),
        }
    }
}

/// One entry of the `ListUnits` reply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnitStatus {
    pub name: String,
    pub description: String,
    pub load_state: String,
    pub active_state: String,
    pub sub_state: String,
}

impl UnitStatus {
    pub fn new(name: &str, load_state: &str, active_state: &str, sub_state: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            load_state: load_state.to_string(),
            active_state: active_state.to_string(),
            sub_state: sub_state.to_string(),
        }
    }
}

/// Read-only view of systemd's unit objects.
///
/// Implementations must allow concurrent calls from unit worker threads.
pub trait UnitBus: Send + Sync {
    /// Enumerates every unit systemd currently has in memory.
    fn list_units(&self) -> Result<Vec<UnitStatus>, BusError>;

    /// Reads a property of the generic `org.freedesktop.systemd1.Unit`
    /// interface.
    fn unit_property(&self, unit: &str, property: &str) -> Result<BusValue, BusError>;

    /// Reads a property of a type-specific interface. `interface` is the
    /// short name, e.g. `Service` for `org.freedesktop.systemd1.Service`.
    fn unit_type_property(
        &self,
        unit: &str,
        interface: &str,
        property: &str,
    ) -> Result<BusValue, BusError>;
}

/// Opens one bus connection per collection cycle.
///
/// The connection is released when the returned bus is dropped.
pub trait BusConnector: Send + Sync {
    type Bus: UnitBus + 'static;

    fn connect(&self) -> Result<Self::Bus, BusError>;
}
