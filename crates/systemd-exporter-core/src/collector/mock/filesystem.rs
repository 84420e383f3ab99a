//! In-memory mock filesystem for testing collectors without real cgroupfs
//! or procfs.

use crate::collector::traits::{FileSystem, ReadError};
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

/// In-memory filesystem for testing.
///
/// Stores files and directories in memory, allowing tests to simulate
/// cgroup hierarchies and `/proc/[pid]` trees on any platform.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    /// Map from path to file contents.
    files: HashMap<PathBuf, String>,
    /// Set of directories (for read_dir support).
    directories: HashSet<PathBuf>,
    /// Files that open but fail while being read.
    unreadable: HashSet<PathBuf>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file with the given content.
    ///
    /// Parent directories are automatically created.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.files.insert(path, content.into());
    }

    /// Makes reads of an existing file fail after it was opened.
    pub fn set_unreadable(&mut self, path: impl AsRef<Path>) {
        self.unreadable.insert(path.as_ref().to_path_buf());
    }

    /// Adds an empty directory.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.directories.insert(path);
    }

    fn add_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }

    /// Marks `root` as a unified (cgroup v2) hierarchy.
    pub fn add_unified_cgroup_root(&mut self, root: impl AsRef<Path>) {
        self.add_file(
            root.as_ref().join("cgroup.controllers"),
            "cpuset cpu io memory pids\n",
        );
    }

    /// Adds the accounting files of one cgroup below a unified root.
    ///
    /// `subpath` is the value systemd reports in `ControlGroup`, e.g.
    /// `/system.slice/foo.service`. Empty contents skip that file.
    pub fn add_cgroup(
        &mut self,
        root: impl AsRef<Path>,
        subpath: &str,
        cpu_stat: &str,
        memory_stat: &str,
    ) {
        let dir = root.as_ref().join(subpath.trim_start_matches('/'));
        self.add_dir(&dir);
        if !cpu_stat.is_empty() {
            self.add_file(dir.join("cpu.stat"), cpu_stat);
        }
        if !memory_stat.is_empty() {
            self.add_file(dir.join("memory.stat"), memory_stat);
        }
    }

    /// Adds a process with the `/proc/[pid]/` files the process reader uses.
    ///
    /// # Arguments
    /// * `pid` - Process ID
    /// * `stat` - Content of `/proc/[pid]/stat`
    /// * `limits` - Content of `/proc/[pid]/limits`
    /// * `open_fds` - Number of entries to create under `/proc/[pid]/fd`
    pub fn add_process(&mut self, pid: u32, stat: &str, limits: &str, open_fds: usize) {
        let base = PathBuf::from(format!("/proc/{}", pid));
        self.add_dir(&base);
        self.add_file(base.join("stat"), stat);
        self.add_file(base.join("limits"), limits);
        self.add_dir(base.join("fd"));
        for fd in 0..open_fds {
            self.add_file(base.join("fd").join(fd.to_string()), "");
        }
    }
}

impl FileSystem for MockFs {
    fn read_to_string_limited(&self, path: &Path, limit: u64) -> Result<String, ReadError> {
        let content = self.files.get(path).ok_or_else(|| {
            ReadError::Open(io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            ))
        })?;
        if self.unreadable.contains(path) {
            return Err(ReadError::Read(io::Error::other(format!(
                "read failed: {:?}",
                path
            ))));
        }

        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        if content.len() <= limit {
            return Ok(content.clone());
        }
        let mut end = limit;
        while !content.is_char_boundary(end) {
            end -= 1;
        }
        Ok(content[..end].to_string())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path) || self.directories.contains(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        if !self.directories.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory not found: {:?}", path),
            ));
        }

        let mut entries = HashSet::new();

        for file_path in self.files.keys() {
            if file_path.parent().is_some_and(|parent| parent == path) {
                entries.insert(file_path.clone());
            }
        }

        for dir_path in &self.directories {
            if dir_path.parent().is_some_and(|parent| parent == path) && dir_path != path {
                entries.insert(dir_path.clone());
            }
        }

        Ok(entries.into_iter().collect())
    }
}
