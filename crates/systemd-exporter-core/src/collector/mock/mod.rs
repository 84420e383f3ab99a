//! Test doubles for the filesystem and the management bus.

mod bus;
mod filesystem;
mod scenarios;

pub use bus::{MockBus, MockConnection, MockConnector};
pub use filesystem::MockFs;
pub use scenarios::{CGROUP_ROOT, FOO_PID, MockHost};
