//! Shared handler state and memory management.

#[cfg(not(target_env = "msvc"))]
use std::ptr;
use std::sync::Arc;

use systemd_exporter_core::collector::Sample;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

/// Releases unused memory back to the operating system.
/// A scrape allocates one string per label value and a whole registry, so
/// RSS is purged after each one.
#[cfg(not(target_env = "msvc"))]
pub(crate) fn release_memory_to_os() {
    unsafe {
        // MALLCTL_ARENAS_ALL = 4096: purge dirty pages from ALL jemalloc arenas,
        // including the ones used by the unit worker threads.
        tikv_jemalloc_sys::mallctl(
            c"arena.4096.purge".as_ptr().cast(),
            ptr::null_mut(),
            ptr::null_mut(),
            ptr::null_mut(),
            0,
        );
    }
}

#[cfg(target_env = "msvc")]
pub(crate) fn release_memory_to_os() {}

/// Runs one collection cycle. Called on a blocking thread.
pub(crate) type SampleSource = Arc<dyn Fn() -> Vec<Sample> + Send + Sync>;

/// State shared by all HTTP handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) source: SampleSource,
    pub(crate) telemetry_path: Arc<str>,
}
