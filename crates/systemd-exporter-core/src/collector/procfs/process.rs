//! Reads resource usage of a single process from `/proc/[pid]/`.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::collector::procfs::parser::{ParseError, ProcLimits, parse_proc_limits, parse_proc_stat};
use crate::collector::traits::{FileSystem, ReadError};

/// Clock ticks per second (USER_HZ). Standard value for Linux.
const CLK_TCK: u64 = 100;

/// Page size used to convert RSS pages to bytes.
const PAGE_SIZE: u64 = 4096;

/// Error type for process reads.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Process disappeared (or never existed) when its files were read.
    #[error("process {0} not found")]
    Gone(u32),
    /// Error reading a process file.
    #[error("couldn't read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: ReadError,
    },
    /// I/O error listing a process directory.
    #[error("I/O error listing {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Parse error in process files.
    #[error("couldn't parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
}

/// Point-in-time resource usage of a process.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessStats {
    /// User plus system CPU time in seconds.
    pub cpu_seconds: f64,
    pub virtual_memory_bytes: u64,
    pub resident_memory_bytes: u64,
}

/// Reads process information from a procfs mount.
#[derive(Debug, Clone)]
pub struct ProcessReader<F: FileSystem> {
    fs: F,
    proc_path: PathBuf,
}

impl<F: FileSystem> ProcessReader<F> {
    /// Creates a new process reader.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    pub fn new(fs: F, proc_path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
        }
    }

    fn pid_path(&self, pid: u32, file: &str) -> PathBuf {
        self.proc_path.join(pid.to_string()).join(file)
    }

    fn read(&self, pid: u32, path: &Path) -> Result<String, ProcessError> {
        self.fs.read_to_string(path).map_err(|source| {
            if source.is_open() && source.kind() == io::ErrorKind::NotFound {
                ProcessError::Gone(pid)
            } else {
                ProcessError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })
    }

    /// Reads CPU time and memory usage from `/proc/[pid]/stat`.
    pub fn stats(&self, pid: u32) -> Result<ProcessStats, ProcessError> {
        let path = self.pid_path(pid, "stat");
        let content = self.read(pid, &path)?;
        let stat = parse_proc_stat(&content).map_err(|source| ProcessError::Parse { path, source })?;

        Ok(ProcessStats {
            cpu_seconds: (stat.utime + stat.stime) as f64 / CLK_TCK as f64,
            virtual_memory_bytes: stat.vsize,
            resident_memory_bytes: (stat.rss.max(0) as u64) * PAGE_SIZE,
        })
    }

    /// Reads soft resource limits from `/proc/[pid]/limits`.
    pub fn limits(&self, pid: u32) -> Result<ProcLimits, ProcessError> {
        let path = self.pid_path(pid, "limits");
        let content = self.read(pid, &path)?;
        parse_proc_limits(&content).map_err(|source| ProcessError::Parse { path, source })
    }

    /// Counts entries in `/proc/[pid]/fd`.
    ///
    /// Needs the same privileges as the process owner.
    pub fn open_fds(&self, pid: u32) -> Result<usize, ProcessError> {
        let path = self.pid_path(pid, "fd");
        match self.fs.read_dir(&path) {
            Ok(entries) => Ok(entries.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ProcessError::Gone(pid)),
            Err(source) => Err(ProcessError::Io { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    const STAT: &str = "812 (sshd) S 1 812 812 0 -1 4194560 2315 15231 11 3 150 75 12 8 20 0 1 0 1520 16515072 1852 18446744073709551615 1 1 0 0 0 0 0 4096 81925 0 0 0 17 2 0 0 0 0 0 0 0 0 0 0 0 0 0";
    const LIMITS: &str = "\
Limit                     Soft Limit           Hard Limit           Units
Max open files            1024                 524288               files
Max address space         unlimited            unlimited            bytes
";

    fn reader() -> ProcessReader<MockFs> {
        let mut fs = MockFs::new();
        fs.add_process(812, STAT, LIMITS, 7);
        ProcessReader::new(fs, "/proc")
    }

    #[test]
    fn test_process_stats() {
        let stats = reader().stats(812).unwrap();
        assert_eq!(stats.cpu_seconds, 2.25);
        assert_eq!(stats.virtual_memory_bytes, 16_515_072);
        assert_eq!(stats.resident_memory_bytes, 1852 * 4096);
    }

    #[test]
    fn test_process_unreadable_stat() {
        let mut fs = MockFs::new();
        fs.add_process(812, STAT, LIMITS, 0);
        fs.set_unreadable("/proc/812/stat");
        let reader = ProcessReader::new(fs, "/proc");
        assert!(matches!(reader.stats(812), Err(ProcessError::Read { .. })));
        assert!(reader.limits(812).is_ok());
    }

    #[test]
    fn test_process_limits_and_fds() {
        let reader = reader();
        let limits = reader.limits(812).unwrap();
        assert_eq!(limits.open_files, Some(1024));
        assert_eq!(limits.address_space, None);
        assert_eq!(reader.open_fds(812).unwrap(), 7);
    }

    #[test]
    fn test_process_gone() {
        let reader = reader();
        assert!(matches!(reader.stats(9999), Err(ProcessError::Gone(9999))));
        assert!(matches!(reader.limits(9999), Err(ProcessError::Gone(9999))));
        assert!(matches!(reader.open_fds(9999), Err(ProcessError::Gone(9999))));
    }

    #[test]
    fn test_process_corrupt_stat() {
        let mut fs = MockFs::new();
        fs.add_process(42, "42 (broken", LIMITS, 0);
        let reader = ProcessReader::new(fs, "/proc");
        assert!(matches!(reader.stats(42), Err(ProcessError::Parse { .. })));
    }
}
