//! cgroup accounting for systemd units.
//!
//! `parser` decodes `cpu.stat` and `memory.stat`; `fs` finds those files
//! below the cgroup mount for a unit's `ControlGroup` subpath.

mod fs;
pub mod parser;

pub use fs::{CgroupError, CgroupFs, CgroupLayout};
pub use parser::{CpuStat, MemStat, StatParseError};
