//! Locating and reading a unit's accounting files under the cgroup mount.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::collector::traits::{FileSystem, ReadError};

use super::parser::{self, CpuStat, MemStat, StatParseError};

/// Error reading a cgroup accounting file.
#[derive(Debug, Error)]
pub enum CgroupError {
    /// The file could not be opened. Usually means accounting is disabled
    /// for the unit's cgroup; callers treat it as "no metrics".
    #[error("unable to open file {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The file was opened but reading it failed or it is not UTF-8.
    #[error("unable to read file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: ReadError,
    },
    /// The file was read but its contents are malformed.
    #[error("unable to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: StatParseError,
    },
}

impl CgroupError {
    /// Returns true when the file simply was not there to read.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CgroupError::Open { .. })
    }
}

/// How controllers are mounted below the cgroup root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgroupLayout {
    /// cgroup v2: a single hierarchy with every controller.
    Unified,
    /// cgroup v1: one hierarchy per controller, `<root>/<controller>/...`.
    Legacy,
}

/// Reads cgroup accounting files for systemd units.
///
/// `root` is the cgroup mount point (usually `/sys/fs/cgroup`); unit
/// subpaths come from the `ControlGroup` bus property.
#[derive(Debug, Clone)]
pub struct CgroupFs<F: FileSystem> {
    fs: F,
    root: PathBuf,
}

impl<F: FileSystem> CgroupFs<F> {
    pub fn new(fs: F, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
        }
    }

    /// Detects the hierarchy layout by looking for `cgroup.controllers`,
    /// which only exists at the root of a unified hierarchy.
    pub fn layout(&self) -> CgroupLayout {
        if self.fs.exists(&self.root.join("cgroup.controllers")) {
            CgroupLayout::Unified
        } else {
            CgroupLayout::Legacy
        }
    }

    /// Builds the absolute path of `file` for a unit's cgroup.
    pub fn path(&self, controller: &str, subpath: &str, file: &str) -> PathBuf {
        let relative = subpath.trim_start_matches('/');
        match self.layout() {
            CgroupLayout::Unified => self.root.join(relative).join(file),
            CgroupLayout::Legacy => self.root.join(controller).join(relative).join(file),
        }
    }

    fn read(&self, path: &Path) -> Result<String, CgroupError> {
        self.fs.read_to_string(path).map_err(|e| match e {
            ReadError::Open(source) => CgroupError::Open {
                path: path.to_path_buf(),
                source,
            },
            source => CgroupError::Read {
                path: path.to_path_buf(),
                source,
            },
        })
    }

    /// Reads and parses `cpu.stat` for the given cgroup subpath.
    pub fn cpu_stat(&self, subpath: &str) -> Result<CpuStat, CgroupError> {
        let path = self.path("cpu", subpath, "cpu.stat");
        let content = self.read(&path)?;
        parser::parse_cpu_stat(&content).map_err(|source| CgroupError::Parse { path, source })
    }

    /// Reads and parses `memory.stat` for the given cgroup subpath.
    pub fn memory_stat(&self, subpath: &str) -> Result<MemStat, CgroupError> {
        let path = self.path("memory", subpath, "memory.stat");
        let content = self.read(&path)?;
        parser::parse_memory_stat(&content).map_err(|source| CgroupError::Parse { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{MockFs, RealFs};

    const ROOT: &str = "/sys/fs/cgroup";

    fn unified_fs() -> MockFs {
        let mut fs = MockFs::new();
        fs.add_unified_cgroup_root(ROOT);
        fs.add_cgroup(
            ROOT,
            "/system.slice/foo.service",
            "usage_usec 100000\nuser_usec 60000\nsystem_usec 40000\n",
            "anon 4096\nfile 8192\n",
        );
        fs
    }

    #[test]
    fn test_unified_paths() {
        let cgroups = CgroupFs::new(unified_fs(), ROOT);
        assert_eq!(cgroups.layout(), CgroupLayout::Unified);
        assert_eq!(
            cgroups.path("cpu", "/system.slice/foo.service", "cpu.stat"),
            Path::new("/sys/fs/cgroup/system.slice/foo.service/cpu.stat")
        );
    }

    #[test]
    fn test_legacy_paths() {
        let cgroups = CgroupFs::new(MockFs::new(), ROOT);
        assert_eq!(cgroups.layout(), CgroupLayout::Legacy);
        assert_eq!(
            cgroups.path("memory", "/system.slice/foo.service", "memory.stat"),
            Path::new("/sys/fs/cgroup/memory/system.slice/foo.service/memory.stat")
        );
    }

    #[test]
    fn test_read_cpu_and_memory() {
        let cgroups = CgroupFs::new(unified_fs(), ROOT);

        let cpu = cgroups.cpu_stat("/system.slice/foo.service").unwrap();
        assert_eq!(cpu.user_usec, 60_000);
        assert_eq!(cpu.system_usec, 40_000);

        let mem = cgroups.memory_stat("/system.slice/foo.service").unwrap();
        assert_eq!(mem.anon_bytes, 4096);
        assert_eq!(mem.file_bytes, 8192);
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let cgroups = CgroupFs::new(unified_fs(), ROOT);
        let err = cgroups.cpu_stat("/system.slice/bar.service").unwrap_err();
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_unreadable_file_is_not_unavailable() {
        let mut fs = unified_fs();
        fs.set_unreadable(format!("{}/system.slice/foo.service/cpu.stat", ROOT));
        let cgroups = CgroupFs::new(fs, ROOT);

        let err = cgroups.cpu_stat("/system.slice/foo.service").unwrap_err();
        assert!(!err.is_unavailable());
        assert!(matches!(err, CgroupError::Read { .. }));
    }

    #[test]
    fn test_invalid_utf8_on_disk_is_not_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cgroup.controllers"), "cpu memory\n").unwrap();
        let unit_dir = dir.path().join("system.slice/foo.service");
        std::fs::create_dir_all(&unit_dir).unwrap();
        std::fs::write(unit_dir.join("memory.stat"), b"anon 4096\nfile \xff\xfe\n").unwrap();

        let cgroups = CgroupFs::new(RealFs::new(), dir.path());
        let err = cgroups.memory_stat("/system.slice/foo.service").unwrap_err();
        assert!(!err.is_unavailable());
        assert!(matches!(
            err,
            CgroupError::Read {
                source: ReadError::Encoding(_),
                ..
            }
        ));

        let err = cgroups.cpu_stat("/system.slice/foo.service").unwrap_err();
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let mut fs = unified_fs();
        fs.add_cgroup(ROOT, "/system.slice/bad.service", "usage_usec 1\n", "anon\n");
        let cgroups = CgroupFs::new(fs, ROOT);

        let err = cgroups.cpu_stat("/system.slice/bad.service").unwrap_err();
        assert!(!err.is_unavailable());
        assert!(err.to_string().contains("bad.service/cpu.stat"));
        assert!(err.to_string().contains("incomplete"));

        let err = cgroups.memory_stat("/system.slice/bad.service").unwrap_err();
        assert!(matches!(
            err,
            CgroupError::Parse {
                source: StatParseError::MalformedLine { .. },
                ..
            }
        ));
    }
}
