//! Parsers for `/proc/[pid]` files.
//!
//! Pure functions over file contents, designed to be tested with string
//! inputs.

use thiserror::Error;

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error: {message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

/// Fields of `/proc/[pid]/stat` used for process resource metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcStat {
    /// User time in clock ticks.
    pub utime: u64,
    /// System time in clock ticks.
    pub stime: u64,
    /// Virtual memory size in bytes.
    pub vsize: u64,
    /// Resident set size in pages.
    pub rss: i64,
}

/// Parses `/proc/[pid]/stat` content.
///
/// The comm field can contain spaces and parentheses, so it is delimited by
/// the first `(` and the last `)`.
/// Format: pid (comm) state ppid pgrp session tty_nr ...
pub fn parse_proc_stat(content: &str) -> Result<ProcStat, ParseError> {
    let content = content.trim();

    let open_paren = content
        .find('(')
        .ok_or_else(|| ParseError::new("missing '(' in stat"))?;
    let close_paren = content
        .rfind(')')
        .ok_or_else(|| ParseError::new("missing ')' in stat"))?;

    if close_paren <= open_paren {
        return Err(ParseError::new("invalid parentheses in stat"));
    }

    content[..open_paren]
        .trim()
        .parse::<u32>()
        .map_err(|_| ParseError::new("invalid pid"))?;

    // Field indexes below are relative to the first field after ')'.
    let fields: Vec<&str> = content[close_paren + 1..].split_whitespace().collect();
    if fields.len() < 22 {
        return Err(ParseError::new(format!(
            "not enough fields in stat: expected 22+, got {}",
            fields.len()
        )));
    }

    let parse_u64 = |idx: usize, name: &str| -> Result<u64, ParseError> {
        fields[idx]
            .parse()
            .map_err(|_| ParseError::new(format!("invalid {}", name)))
    };
    let parse_i64 = |idx: usize, name: &str| -> Result<i64, ParseError> {
        fields[idx]
            .parse()
            .map_err(|_| ParseError::new(format!("invalid {}", name)))
    };

    Ok(ProcStat {
        utime: parse_u64(11, "utime")?,
        stime: parse_u64(12, "stime")?,
        vsize: parse_u64(20, "vsize")?,
        rss: parse_i64(21, "rss")?,
    })
}

/// Soft limits from `/proc/[pid]/limits`.
///
/// `None` means the limit is `unlimited`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcLimits {
    pub open_files: Option<u64>,
    pub address_space: Option<u64>,
}

/// Parses `/proc/[pid]/limits` content.
///
/// The file is a fixed-width table whose limit names contain single
/// spaces, while columns are separated by two or more spaces:
///
/// ```text
/// Limit                     Soft Limit           Hard Limit           Units
/// Max open files            1024                 524288               files
/// Max address space         unlimited            unlimited            bytes
/// ```
pub fn parse_proc_limits(content: &str) -> Result<ProcLimits, ParseError> {
    let mut limits = ProcLimits::default();

    for line in content.lines().skip(1) {
        let columns: Vec<&str> = line
            .split("  ")
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect();
        let (Some(name), Some(soft)) = (columns.first(), columns.get(1)) else {
            continue;
        };

        let slot = match *name {
            "Max open files" => &mut limits.open_files,
            "Max address space" => &mut limits.address_space,
            _ => continue,
        };

        *slot = match *soft {
            "unlimited" => None,
            value => Some(
                value
                    .parse()
                    .map_err(|_| ParseError::new(format!("invalid limit {:?}", value)))?,
            ),
        };
    }

    Ok(limits)
}
