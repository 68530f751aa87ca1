//! Best-effort CPU pinning.
//!
//! Pinning is a performance hint. Nothing here returns an error: when the
//! platform has no affinity support or refuses the request, the caller keeps
//! running unpinned.

/// Pin the calling thread to core `index mod <core count>`.
///
/// Returns the core id actually pinned to, or `None` when pinning was not
/// possible. Threads spawned afterwards inherit the mask on Linux.
pub fn pin_current(index: usize) -> Option<usize> {
    let cores = match core_affinity::get_core_ids() {
        Some(cores) if !cores.is_empty() => cores,
        _ => {
            log::info!("CPU pinning unavailable on this platform, continuing unpinned");
            return None;
        }
    };

    let core = cores[index % cores.len()];
    if core_affinity::set_for_current(core) {
        log::debug!("Pinned to CPU {}", core.id);
        Some(core.id)
    } else {
        log::info!("Could not pin to CPU {}, continuing unpinned", core.id);
        None
    }
}

/// Number of cores pinning can choose from (0 when unknown).
pub fn available_cores() -> usize {
    core_affinity::get_core_ids().map_or(0, |cores| cores.len())
}
