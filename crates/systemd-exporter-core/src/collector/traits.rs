//! Abstractions for filesystem access to enable testing and mocking.
//!
//! The `FileSystem` trait lets the collectors read cgroupfs and procfs
//! pseudo-files on a real Linux host or from an in-memory mock in tests.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::string::FromUtf8Error;

use thiserror::Error;

/// Upper bound for a single pseudo-file read.
///
/// Files under `/proc` and `/sys` report bogus sizes (0 or 4096), so they
/// are read without a stat call and capped at this many bytes instead.
pub const MAX_PSEUDO_FILE_SIZE: u64 = 512 * 1024;

/// Failure reading a file, split by the stage that failed.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The file could not be opened.
    #[error("{0}")]
    Open(#[source] io::Error),
    /// The file was opened but reading it failed.
    #[error("{0}")]
    Read(#[source] io::Error),
    /// The file was read but is not valid UTF-8.
    #[error("{0}")]
    Encoding(#[from] FromUtf8Error),
}

impl ReadError {
    /// I/O error kind; invalid content reports `InvalidData`.
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            ReadError::Open(e) | ReadError::Read(e) => e.kind(),
            ReadError::Encoding(_) => io::ErrorKind::InvalidData,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, ReadError::Open(_))
    }
}

/// Abstraction for filesystem operations.
pub trait FileSystem: Send + Sync {
    /// Reads at most `limit` bytes of a file as a string.
    ///
    /// Only a failed `open` is reported as [`ReadError::Open`], so callers
    /// can tell a missing file apart from an unreadable or malformed one.
    fn read_to_string_limited(&self, path: &Path, limit: u64) -> Result<String, ReadError>;

    /// Reads a pseudo-file, capped at [`MAX_PSEUDO_FILE_SIZE`].
    fn read_to_string(&self, path: &Path) -> Result<String, ReadError> {
        self.read_to_string_limited(path, MAX_PSEUDO_FILE_SIZE)
    }

    /// Checks if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Lists entries in a directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
}

/// Real filesystem implementation that delegates to `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    /// Creates a new `RealFs` instance.
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string_limited(&self, path: &Path, limit: u64) -> Result<String, ReadError> {
        let file = std::fs::File::open(path).map_err(ReadError::Open)?;
        let mut content = Vec::new();
        file.take(limit)
            .read_to_end(&mut content)
            .map_err(ReadError::Read)?;
        Ok(String::from_utf8(content)?)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(path)?;
        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry?.path());
        }
        Ok(paths)
    }
}
