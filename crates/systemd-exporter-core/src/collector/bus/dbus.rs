//! `UnitBus` over D-Bus using zbus' blocking API.

use zbus::blocking::Connection;
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};

use super::{BusConnector, BusError, BusValue, INTERFACE_PREFIX, UNIT_INTERFACE, UnitBus, UnitStatus};

const DESTINATION: &str = "org.freedesktop.systemd1";
const MANAGER_PATH: &str = "/org/freedesktop/systemd1";
const MANAGER_INTERFACE: &str = "org.freedesktop.systemd1.Manager";
const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";
const UNIT_PATH_PREFIX: &str = "/org/freedesktop/systemd1/unit/";

/// systemd's private socket, usable by root without a running bus daemon.
const PRIVATE_ADDRESS: &str = "unix:path=/run/systemd/private";

const UNKNOWN_PROPERTY: &str = "org.freedesktop.DBus.Error.UnknownProperty";
const UNKNOWN_INTERFACE: &str = "org.freedesktop.DBus.Error.UnknownInterface";

/// `ListUnits` reply entry: name, description, load state, active state,
/// sub state, followed unit, object path, job id, job type, job path.
type RawUnit = (
    String,
    String,
    String,
    String,
    String,
    String,
    OwnedObjectPath,
    u32,
    String,
    OwnedObjectPath,
);

/// Escapes a unit name into an object path label.
///
/// Every byte that is not an ASCII letter or digit becomes `_xx` (lowercase
/// hex), as does a leading digit. The empty name maps to `_`.
pub fn bus_path_escape(name: &str) -> String {
    if name.is_empty() {
        return "_".to_string();
    }

    let mut escaped = String::with_capacity(name.len() * 3);
    for (i, b) in name.bytes().enumerate() {
        if b.is_ascii_alphabetic() || (i > 0 && b.is_ascii_digit()) {
            escaped.push(b as char);
        } else {
            escaped.push_str(&format!("_{:02x}", b));
        }
    }
    escaped
}

/// Object path of a unit, e.g. `/org/freedesktop/systemd1/unit/ssh_2eservice`.
pub fn unit_object_path(name: &str) -> String {
    format!("{}{}", UNIT_PATH_PREFIX, bus_path_escape(name))
}

fn decode(value: &Value<'_>) -> BusValue {
    match value {
        Value::Str(s) => BusValue::Str(s.as_str().to_owned()),
        Value::U32(v) => BusValue::U32(*v),
        Value::U64(v) => BusValue::U64(*v),
        Value::Bool(v) => BusValue::Bool(*v),
        Value::Value(inner) => decode(inner),
        other => BusValue::Other(other.value_signature().as_str().to_owned()),
    }
}

/// A connection to systemd, either through the system bus or directly
/// over the private socket.
#[derive(Clone)]
pub struct SystemdBus {
    conn: Connection,
    /// `None` on a peer-to-peer connection, which has no bus names.
    destination: Option<&'static str>,
}

impl SystemdBus {
    fn get_property(
        &self,
        unit: &str,
        interface: &str,
        property: &str,
    ) -> Result<BusValue, BusError> {
        let path = unit_object_path(unit);
        let reply = self.conn.call_method(
            self.destination,
            path.as_str(),
            Some(PROPERTIES_INTERFACE),
            "Get",
            &(interface, property),
        );

        let reply = match reply {
            Ok(reply) => reply,
            Err(zbus::Error::MethodError(name, _, _))
                if name.as_str() == UNKNOWN_PROPERTY || name.as_str() == UNKNOWN_INTERFACE =>
            {
                return Err(BusError::MissingProperty {
                    unit: unit.to_string(),
                    property: property.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let value: OwnedValue = reply.body().deserialize()?;
        Ok(decode(&value))
    }
}

impl UnitBus for SystemdBus {
    fn list_units(&self) -> Result<Vec<UnitStatus>, BusError> {
        let reply = self.conn.call_method(
            self.destination,
            MANAGER_PATH,
            Some(MANAGER_INTERFACE),
            "ListUnits",
            &(),
        )?;
        let raw: Vec<RawUnit> = reply.body().deserialize()?;

        Ok(raw
            .into_iter()
            .map(
                |(name, description, load_state, active_state, sub_state, ..)| UnitStatus {
                    name,
                    description,
                    load_state,
                    active_state,
                    sub_state,
                },
            )
            .collect())
    }

    fn unit_property(&self, unit: &str, property: &str) -> Result<BusValue, BusError> {
        self.get_property(unit, UNIT_INTERFACE, property)
    }

    fn unit_type_property(
        &self,
        unit: &str,
        interface: &str,
        property: &str,
    ) -> Result<BusValue, BusError> {
        let interface = format!("{}{}", INTERFACE_PREFIX, interface);
        self.get_property(unit, &interface, property)
    }
}

/// Connects to systemd once per collection cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemdConnector {
    private: bool,
}

impl SystemdConnector {
    /// `private` selects the direct connection to `/run/systemd/private`
    /// instead of the system bus.
    pub fn new(private: bool) -> Self {
        Self { private }
    }
}

impl BusConnector for SystemdConnector {
    type Bus = SystemdBus;

    fn connect(&self) -> Result<SystemdBus, BusError> {
        if self.private {
            let conn = zbus::blocking::connection::Builder::address(PRIVATE_ADDRESS)?
                .p2p()
                .build()?;
            Ok(SystemdBus {
                conn,
                destination: None,
            })
        } else {
            Ok(SystemdBus {
                conn: Connection::system()?,
                destination: Some(DESTINATION),
            })
        }
    }
}
