//! Host-level resource queries, independent of any cgroup limits.

use std::fmt;

/// Resources of the machine as seen by the kernel, ignoring cgroup limits.
pub trait HostResources: fmt::Debug + Send + Sync {
    /// Total physical memory in bytes.
    fn physical_memory(&self) -> u64;

    /// Memory available for new allocations in bytes.
    fn available_memory(&self) -> u64;

    /// Total swap space in bytes.
    fn total_swap(&self) -> u64;

    /// Free swap space in bytes.
    fn free_swap(&self) -> u64;

    /// Number of processors this process may run on.
    fn active_processor_count(&self) -> u32;
}

/// [`HostResources`] backed by `sysconf(3)`, `sysinfo(2)` and `sched_getaffinity(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxHost;

impl LinuxHost {
    fn sysinfo() -> Option<libc::sysinfo> {
        // SAFETY: `sysinfo` is plain old data, so the all-zero bit pattern is valid.
        let mut info: libc::sysinfo = unsafe { std::mem::zeroed() };
        // SAFETY: `info` is a valid, writable `sysinfo` struct.
        if unsafe { libc::sysinfo(&mut info) } != 0 {
            log::debug!(
                "sysinfo failed: {}",
                std::io::Error::last_os_error()
            );
            return None;
        }
        Some(info)
    }

    fn online_processors() -> u32 {
        // SAFETY: `sysconf` has no memory-safety preconditions.
        let online = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        u32::try_from(online).ok().filter(|&n| n > 0).unwrap_or(1)
    }
}

impl HostResources for LinuxHost {
    fn physical_memory(&self) -> u64 {
        // SAFETY: `sysconf` has no memory-safety preconditions.
        let (pages, page_size) = unsafe {
            (
                libc::sysconf(libc::_SC_PHYS_PAGES),
                libc::sysconf(libc::_SC_PAGESIZE),
            )
        };
        if pages <= 0 || page_size <= 0 {
            return 0;
        }
        (pages as u64).saturating_mul(page_size as u64)
    }

    fn available_memory(&self) -> u64 {
        Self::sysinfo()
            .map(|si| (si.freeram as u64).saturating_mul(u64::from(si.mem_unit)))
            .unwrap_or(0)
    }

    fn total_swap(&self) -> u64 {
        Self::sysinfo()
            .map(|si| (si.totalswap as u64).saturating_mul(u64::from(si.mem_unit)))
            .unwrap_or(0)
    }

    fn free_swap(&self) -> u64 {
        Self::sysinfo()
            .map(|si| (si.freeswap as u64).saturating_mul(u64::from(si.mem_unit)))
            .unwrap_or(0)
    }

    fn active_processor_count(&self) -> u32 {
        // SAFETY: `cpu_set_t` is plain old data, so the all-zero bit pattern is valid.
        let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
        // SAFETY: `set` is a valid, writable `cpu_set_t` of the size passed in.
        let rc = unsafe {
            libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut set)
        };
        if rc == 0 {
            // SAFETY: `set` was initialized by `sched_getaffinity`.
            let count = unsafe { libc::CPU_COUNT(&set) };
            if let Ok(count) = u32::try_from(count) {
                if count > 0 {
                    log::trace!("active_processor_count: sched_getaffinity processor count: {count}");
                    return count;
                }
            }
        }

        let online = Self::online_processors();
        log::trace!(
            "active_processor_count: sched_getaffinity failed, using online processors: {online}"
        );
        online
    }
}
