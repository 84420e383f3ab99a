//! In-memory management bus for testing collectors without systemd.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crate::collector::bus::{BusConnector, BusError, BusValue, UnitBus, UnitStatus};

/// Interface key used for properties of `org.freedesktop.systemd1.Unit`.
const UNIT_IFACE: &str = "Unit";

/// In-memory unit list and property table.
///
/// Properties that were never set are reported as missing, the same way
/// systemd answers for an unknown property.
#[derive(Debug, Clone, Default)]
pub struct MockBus {
    units: Vec<UnitStatus>,
    /// (unit, interface short name, property) -> value
    properties: HashMap<(String, String, String), BusValue>,
    /// Per-unit artificial latency applied to every property read.
    delays: HashMap<String, Duration>,
    list_error: Option<String>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a unit to the `ListUnits` reply.
    pub fn add_unit(&mut self, status: UnitStatus) {
        self.units.push(status);
    }

    /// Sets a property of the generic `Unit` interface.
    pub fn set_property(&mut self, unit: &str, property: &str, value: BusValue) {
        self.set_type_property(unit, UNIT_IFACE, property, value);
    }

    /// Sets a property of a type-specific interface (`Service`, `Socket`, ...).
    pub fn set_type_property(&mut self, unit: &str, interface: &str, property: &str, value: BusValue) {
        self.properties.insert(
            (unit.to_string(), interface.to_string(), property.to_string()),
            value,
        );
    }

    /// Makes every property read of `unit` sleep for `delay` first.
    pub fn set_delay(&mut self, unit: &str, delay: Duration) {
        self.delays.insert(unit.to_string(), delay);
    }

    /// Makes `list_units` fail with the given message.
    pub fn fail_list_units(&mut self, message: &str) {
        self.list_error = Some(message.to_string());
    }

    fn lookup(&self, unit: &str, interface: &str, property: &str) -> Result<BusValue, BusError> {
        if let Some(delay) = self.delays.get(unit) {
            thread::sleep(*delay);
        }
        self.properties
            .get(&(unit.to_string(), interface.to_string(), property.to_string()))
            .cloned()
            .ok_or_else(|| BusError::MissingProperty {
                unit: unit.to_string(),
                property: property.to_string(),
            })
    }
}

impl UnitBus for MockBus {
    fn list_units(&self) -> Result<Vec<UnitStatus>, BusError> {
        match &self.list_error {
            Some(message) => Err(BusError::Unavailable(message.clone())),
            None => Ok(self.units.clone()),
        }
    }

    fn unit_property(&self, unit: &str, property: &str) -> Result<BusValue, BusError> {
        self.lookup(unit, UNIT_IFACE, property)
    }

    fn unit_type_property(
        &self,
        unit: &str,
        interface: &str,
        property: &str,
    ) -> Result<BusValue, BusError> {
        self.lookup(unit, interface, property)
    }
}

/// A connected [`MockBus`]. Holds a share of the connector's live-handle
/// counter until dropped.
#[derive(Debug)]
pub struct MockConnection {
    bus: Arc<MockBus>,
    _live: LiveGuard,
}

#[derive(Debug)]
struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl UnitBus for MockConnection {
    fn list_units(&self) -> Result<Vec<UnitStatus>, BusError> {
        self.bus.list_units()
    }

    fn unit_property(&self, unit: &str, property: &str) -> Result<BusValue, BusError> {
        self.bus.unit_property(unit, property)
    }

    fn unit_type_property(
        &self,
        unit: &str,
        interface: &str,
        property: &str,
    ) -> Result<BusValue, BusError> {
        self.bus.unit_type_property(unit, interface, property)
    }
}

/// Hands out connections to a shared [`MockBus`] and counts how many are
/// currently open.
#[derive(Debug, Clone)]
pub struct MockConnector {
    bus: Arc<MockBus>,
    connect_error: Option<String>,
    opened: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new(bus: MockBus) -> Self {
        Self {
            bus: Arc::new(bus),
            connect_error: None,
            opened: Arc::new(AtomicUsize::new(0)),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A connector whose `connect` always fails.
    pub fn unreachable(message: &str) -> Self {
        let mut connector = Self::new(MockBus::new());
        connector.connect_error = Some(message.to_string());
        connector
    }

    /// Total number of successful `connect` calls.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of connections not yet dropped.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl BusConnector for MockConnector {
    type Bus = MockConnection;

    fn connect(&self) -> Result<MockConnection, BusError> {
        if let Some(message) = &self.connect_error {
            return Err(BusError::Unavailable(message.clone()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection {
            bus: Arc::clone(&self.bus),
            _live: LiveGuard(Arc::clone(&self.live)),
        })
    }
}
