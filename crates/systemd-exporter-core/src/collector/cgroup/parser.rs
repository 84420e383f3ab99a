//! Parsers for cgroup v2 accounting files.
//!
//! Pure functions over file contents, so they can be tested with string
//! inputs. Reading and path resolution live in [`super::fs`].

use thiserror::Error;

/// Failure to decode an accounting file that was opened successfully.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatParseError {
    /// A line did not have the expected number of fields.
    #[error("malformed line: {line:?}")]
    MalformedLine { line: String },
    /// A value could not be parsed as an unsigned 64-bit integer.
    #[error("unable to parse {value:?} as uint64")]
    InvalidValue { value: String },
    /// One or more required keys were missing.
    #[error("no / incomplete info extracted (missing {missing})")]
    Incomplete { missing: &'static str },
}

/// CPU time consumed by a cgroup, in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuStat {
    pub total_usec: u64,
    pub user_usec: u64,
    pub system_usec: u64,
}

/// Parses `cpu.stat`.
///
/// Format: one `key value` pair per line, separated by a single space.
/// `usage_usec`, `user_usec` and `system_usec` are required; other keys
/// (`nr_periods`, `throttled_usec`, ...) are ignored.
pub fn parse_cpu_stat(content: &str) -> Result<CpuStat, StatParseError> {
    let mut stat = CpuStat::default();
    let (mut has_total, mut has_user, mut has_system) = (false, false, false);

    for line in content.lines() {
        let mut parts = line.split(' ');
        let (Some(key), Some(raw), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(StatParseError::MalformedLine {
                line: line.to_string(),
            });
        };

        let value = parse_unsigned(raw, 10).ok_or_else(|| StatParseError::InvalidValue {
            value: raw.to_string(),
        })?;

        match key {
            "usage_usec" => {
                stat.total_usec = value;
                has_total = true;
            }
            "user_usec" => {
                stat.user_usec = value;
                has_user = true;
            }
            "system_usec" => {
                stat.system_usec = value;
                has_system = true;
            }
            _ => {}
        }
    }

    let missing = match (has_total, has_user, has_system) {
        (true, true, true) => return Ok(stat),
        (false, _, _) => "usage_usec",
        (_, false, _) => "user_usec",
        (_, _, false) => "system_usec",
    };
    Err(StatParseError::Incomplete { missing })
}

/// Memory usage of a cgroup as reported by `memory.stat`.
///
/// See the cgroup v2 admin guide for the meaning of each field. Event
/// counters (`pg*`, `workingset_*`, `thp_*`) are counts, not bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemStat {
    /// Anonymous mappings such as brk(), sbrk() and mmap(MAP_ANONYMOUS).
    pub anon_bytes: u64,
    /// Filesystem cache, including tmpfs and shared memory.
    pub file_bytes: u64,
    pub kernel_stack_bytes: u64,
    pub page_tables_bytes: u64,
    pub per_cpu_bytes: u64,
    /// Network transmission buffers.
    pub sock_bytes: u64,
    /// Swap-backed cache: tmpfs, shm segments, shared anonymous mmap()s.
    pub shmem_bytes: u64,
    /// Cached filesystem data mapped with mmap().
    pub file_mapped_bytes: u64,
    /// Cached filesystem data modified but not yet written back.
    pub file_dirty_bytes: u64,
    /// Cached filesystem data currently being written back.
    pub file_writeback_bytes: u64,
    pub swapcached_bytes: u64,
    pub anon_thp_bytes: u64,
    pub file_thp_bytes: u64,
    pub shmem_thp_bytes: u64,
    pub inactive_anon_bytes: u64,
    pub active_anon_bytes: u64,
    pub inactive_file_bytes: u64,
    pub active_file_bytes: u64,
    pub unevictable_bytes: u64,
    pub slab_reclaimable_bytes: u64,
    pub slab_unreclaimable_bytes: u64,
    pub slab_bytes: u64,
    pub workingset_refault_anon: u64,
    pub workingset_refault_file: u64,
    pub workingset_activate_anon: u64,
    pub workingset_activate_file: u64,
    pub workingset_restore_anon: u64,
    pub workingset_restore_file: u64,
    pub workingset_nodereclaim: u64,
    pub pgfault: u64,
    pub pgmajfault: u64,
    pub pgrefill: u64,
    pub pgscan: u64,
    pub pgsteal: u64,
    pub pgactivate: u64,
    pub pgdeactivate: u64,
    pub pglazyfree: u64,
    pub pglazyfreed: u64,
    pub thp_fault_alloc: u64,
    pub thp_collapse_alloc: u64,
}

/// Parses `memory.stat`.
///
/// Format: `key value` per line, whitespace separated. Unknown keys are
/// skipped and known keys that do not appear stay zero.
pub fn parse_memory_stat(content: &str) -> Result<MemStat, StatParseError> {
    let mut stat = MemStat::default();

    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            return Err(StatParseError::MalformedLine {
                line: line.to_string(),
            });
        }

        let value = parse_uint_literal(fields[1]).ok_or_else(|| StatParseError::InvalidValue {
            value: fields[1].to_string(),
        })?;

        let slot = match fields[0] {
            "anon" => &mut stat.anon_bytes,
            "file" => &mut stat.file_bytes,
            "kernel_stack" => &mut stat.kernel_stack_bytes,
            "pagetables" => &mut stat.page_tables_bytes,
            "percpu" => &mut stat.per_cpu_bytes,
            "sock" => &mut stat.sock_bytes,
            "shmem" => &mut stat.shmem_bytes,
            "file_mapped" => &mut stat.file_mapped_bytes,
            "file_dirty" => &mut stat.file_dirty_bytes,
            "file_writeback" => &mut stat.file_writeback_bytes,
            "swapcached" => &mut stat.swapcached_bytes,
            "anon_thp" => &mut stat.anon_thp_bytes,
            "file_thp" => &mut stat.file_thp_bytes,
            "shmem_thp" => &mut stat.shmem_thp_bytes,
            "inactive_anon" => &mut stat.inactive_anon_bytes,
            "active_anon" => &mut stat.active_anon_bytes,
            "inactive_file" => &mut stat.inactive_file_bytes,
            "active_file" => &mut stat.active_file_bytes,
            "unevictable" => &mut stat.unevictable_bytes,
            "slab_reclaimable" => &mut stat.slab_reclaimable_bytes,
            "slab_unreclaimable" => &mut stat.slab_unreclaimable_bytes,
            "slab" => &mut stat.slab_bytes,
            "workingset_refault_anon" => &mut stat.workingset_refault_anon,
            // Older releases of this exporter matched the camel-cased key.
            "workingset_refault_file" | "workingsetRefault_file" => {
                &mut stat.workingset_refault_file
            }
            "workingset_activate_anon" => &mut stat.workingset_activate_anon,
            "workingset_activate_file" => &mut stat.workingset_activate_file,
            "workingset_restore_anon" => &mut stat.workingset_restore_anon,
            "workingset_restore_file" => &mut stat.workingset_restore_file,
            "workingset_nodereclaim" => &mut stat.workingset_nodereclaim,
            "pgfault" => &mut stat.pgfault,
            "pgmajfault" => &mut stat.pgmajfault,
            "pgrefill" => &mut stat.pgrefill,
            "pgscan" => &mut stat.pgscan,
            "pgsteal" => &mut stat.pgsteal,
            "pgactivate" => &mut stat.pgactivate,
            "pgdeactivate" => &mut stat.pgdeactivate,
            "pglazyfree" => &mut stat.pglazyfree,
            "pglazyfreed" => &mut stat.pglazyfreed,
            "thp_fault_alloc" => &mut stat.thp_fault_alloc,
            "thp_collapse_alloc" => &mut stat.thp_collapse_alloc,
            _ => continue,
        };
        *slot = value;
    }

    Ok(stat)
}

/// Parses an unsigned integer literal with an optional radix prefix.
///
/// Accepts `0x`/`0X` (hex), `0o`/`0O` (octal), `0b`/`0B` (binary), a bare
/// leading `0` (octal) and plain decimal. Single underscores may separate
/// digits, or follow a prefix. Signs are rejected.
fn parse_uint_literal(s: &str) -> Option<u64> {
    let (digits, radix, prefixed) = match s.get(..2) {
        Some("0x" | "0X") => (&s[2..], 16, true),
        Some("0o" | "0O") => (&s[2..], 8, true),
        Some("0b" | "0B") => (&s[2..], 2, true),
        _ if s.len() > 1 && s.starts_with('0') => (&s[1..], 8, true),
        _ => (s, 10, false),
    };

    if !digits.contains('_') {
        return parse_unsigned(digits, radix);
    }
    if digits.ends_with('_') || digits.contains("__") || (!prefixed && digits.starts_with('_')) {
        return None;
    }
    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    parse_unsigned(&cleaned, radix)
}

/// `u64::from_str_radix` without the leading `+` it tolerates.
fn parse_unsigned(digits: &str, radix: u32) -> Option<u64> {
    if digits.is_empty() || digits.starts_with('+') {
        return None;
    }
    u64::from_str_radix(digits, radix).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_stat() {
        let content = "usage_usec 34565924\nuser_usec 21165924\nsystem_usec 13334251\nnr_periods 0\nnr_throttled 0\nthrottled_usec 0\n";
        let stat = parse_cpu_stat(content).unwrap();
        assert_eq!(stat.total_usec, 34_565_924);
        assert_eq!(stat.user_usec, 21_165_924);
        assert_eq!(stat.system_usec, 13_334_251);
    }

    #[test]
    fn test_parse_cpu_stat_no_cross_check() {
        let stat = parse_cpu_stat("usage_usec 1\nuser_usec 500\nsystem_usec 700\n").unwrap();
        assert_eq!(stat.total_usec, 1);
        assert_ne!(stat.user_usec + stat.system_usec, stat.total_usec);
    }

    #[test]
    fn test_parse_cpu_stat_incomplete() {
        for (content, missing) in [
            ("user_usec 1\nsystem_usec 2\n", "usage_usec"),
            ("usage_usec 3\nsystem_usec 2\n", "user_usec"),
            ("usage_usec 3\nuser_usec 1\n", "system_usec"),
            ("", "usage_usec"),
        ] {
            assert_eq!(
                parse_cpu_stat(content),
                Err(StatParseError::Incomplete { missing })
            );
        }
    }

    #[test]
    fn test_parse_cpu_stat_malformed() {
        assert!(matches!(
            parse_cpu_stat("usage_usec\n"),
            Err(StatParseError::MalformedLine { .. })
        ));
        assert!(matches!(
            parse_cpu_stat("usage_usec 1 2\n"),
            Err(StatParseError::MalformedLine { .. })
        ));
        assert!(matches!(
            parse_cpu_stat("usage_usec -5\nuser_usec 1\nsystem_usec 1\n"),
            Err(StatParseError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_parse_cpu_stat_rejects_sign_and_separators() {
        for value in ["+5", "1_000", "0x10"] {
            let content = format!("usage_usec {}\nuser_usec 1\nsystem_usec 1\n", value);
            assert!(
                matches!(
                    parse_cpu_stat(&content),
                    Err(StatParseError::InvalidValue { .. })
                ),
                "{} should be rejected",
                value
            );
        }
    }

    #[test]
    fn test_parse_memory_stat() {
        let content = "anon 1048576\nfile 2097152\nkernel_stack 16384\nfile_mapped 4096\nfile_dirty 8192\npgfault 42\n";
        let stat = parse_memory_stat(content).unwrap();
        assert_eq!(stat.anon_bytes, 1_048_576);
        assert_eq!(stat.file_bytes, 2_097_152);
        assert_eq!(stat.kernel_stack_bytes, 16_384);
        assert_eq!(stat.file_mapped_bytes, 4096);
        assert_eq!(stat.file_dirty_bytes, 8192);
        assert_eq!(stat.pgfault, 42);
        assert_eq!(stat.slab_bytes, 0);
    }

    #[test]
    fn test_parse_memory_stat_ignores_unknown_keys() {
        let stat = parse_memory_stat("foo 123\nanon 5\n").unwrap();
        assert_eq!(stat.anon_bytes, 5);
        assert_eq!(
            parse_memory_stat("foo 123\n").unwrap(),
            MemStat::default()
        );
    }

    #[test]
    fn test_parse_memory_stat_malformed_line() {
        assert_eq!(
            parse_memory_stat("anon\n"),
            Err(StatParseError::MalformedLine {
                line: "anon".to_string()
            })
        );
    }

    #[test]
    fn test_parse_memory_stat_full_kernel_output() {
        let content = "\
anon 1
file 2
kernel_stack 3
pagetables 4
percpu 5
sock 6
shmem 7
file_mapped 8
file_dirty 9
file_writeback 10
swapcached 11
anon_thp 12
file_thp 13
shmem_thp 14
inactive_anon 15
active_anon 16
inactive_file 17
active_file 18
unevictable 19
slab_reclaimable 20
slab_unreclaimable 21
slab 22
workingset_refault_anon 23
workingset_refault_file 24
workingset_activate_anon 25
workingset_activate_file 26
workingset_restore_anon 27
workingset_restore_file 28
workingset_nodereclaim 29
pgfault 30
pgmajfault 31
pgrefill 32
pgscan 33
pgsteal 34
pgactivate 35
pgdeactivate 36
pglazyfree 37
pglazyfreed 38
thp_fault_alloc 39
thp_collapse_alloc 40
zswap 41
";
        let stat = parse_memory_stat(content).unwrap();
        assert_eq!(stat.page_tables_bytes, 4);
        assert_eq!(stat.per_cpu_bytes, 5);
        assert_eq!(stat.shmem_thp_bytes, 14);
        assert_eq!(stat.unevictable_bytes, 19);
        assert_eq!(stat.slab_bytes, 22);
        assert_eq!(stat.workingset_refault_file, 24);
        assert_eq!(stat.workingset_nodereclaim, 29);
        assert_eq!(stat.pglazyfreed, 38);
        assert_eq!(stat.thp_collapse_alloc, 40);
    }

    #[test]
    fn test_parse_memory_stat_legacy_refault_key() {
        let stat = parse_memory_stat("workingsetRefault_file 77\n").unwrap();
        assert_eq!(stat.workingset_refault_file, 77);
    }

    #[test]
    fn test_parse_memory_stat_radix_prefixes() {
        let stat =
            parse_memory_stat("anon 0x10\nfile 0o10\nsock 010\nshmem 0b11\nslab 0x_ff\n").unwrap();
        assert_eq!(stat.anon_bytes, 16);
        assert_eq!(stat.file_bytes, 8);
        assert_eq!(stat.sock_bytes, 8);
        assert_eq!(stat.shmem_bytes, 3);
        assert_eq!(stat.slab_bytes, 255);
    }

    #[test]
    fn test_parse_memory_stat_decimal_separators() {
        let stat = parse_memory_stat("anon 1_000\nfile 4_096_000\n").unwrap();
        assert_eq!(stat.anon_bytes, 1000);
        assert_eq!(stat.file_bytes, 4_096_000);
    }

    #[test]
    fn test_parse_uint_literal_rejects() {
        assert_eq!(parse_uint_literal("0x"), None);
        assert_eq!(parse_uint_literal("09"), None);
        assert_eq!(parse_uint_literal("-1"), None);
        assert_eq!(parse_uint_literal("+1"), None);
        assert_eq!(parse_uint_literal("0x+1"), None);
        assert_eq!(parse_uint_literal("0x_+1"), None);
        assert_eq!(parse_uint_literal("_1"), None);
        assert_eq!(parse_uint_literal("1_"), None);
        assert_eq!(parse_uint_literal("1__0"), None);
        assert_eq!(parse_uint_literal("0"), Some(0));
        assert_eq!(parse_uint_literal("0_7"), Some(7));
    }
}
