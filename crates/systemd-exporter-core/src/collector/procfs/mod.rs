//! Readers for the Linux `/proc` filesystem.
//!
//! Used to resolve the resource usage of a service's main process.

pub mod parser;
pub mod process;

pub use parser::ProcLimits;
pub use process::{ProcessError, ProcessReader, ProcessStats};
