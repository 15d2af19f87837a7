//! C ABI of the library.
//!
//! All functions lazily run container detection with
//! [`ContainerConfig::from_env`] on first use. Limits use the usual sentinels:
//! `-1` for unlimited and `-2` ([`OSCONTAINER_ERROR`]) for values that are not
//! supported or could not be read, including when no cgroup subsystem was found.

use std::ffi::{CString, c_char};
use std::sync::OnceLock;

use crate::cgroup::{CgroupSubsystem, OSCONTAINER_ERROR};
use crate::config::ContainerConfig;
use crate::container::OsContainer;
use crate::error::ResultOkLogExt;

static OS_CONTAINER: OnceLock<OsContainer> = OnceLock::new();

fn container() -> &'static OsContainer {
    OS_CONTAINER.get_or_init(|| OsContainer::init(&ContainerConfig::from_env()))
}

fn with_subsystem(f: impl FnOnce(&CgroupSubsystem) -> i64) -> i64 {
    container().subsystem().map_or(OSCONTAINER_ERROR, f)
}

fn usage_to_raw(value: Option<u64>) -> i64 {
    value.map_or(OSCONTAINER_ERROR, |v| i64::try_from(v).unwrap_or(i64::MAX))
}

fn narrow(raw: i64) -> i32 {
    i32::try_from(raw).unwrap_or(if raw < 0 { OSCONTAINER_ERROR as i32 } else { i32::MAX })
}

fn to_c_string(value: Option<String>) -> *mut c_char {
    value
        .and_then(|v| CString::new(v).ok_log())
        .map_or(std::ptr::null_mut(), CString::into_raw)
}

/// Runs container detection if it has not run yet and reports whether the
/// process is containerized.
#[unsafe(no_mangle)]
pub extern "C" fn oscontainer_init() -> bool {
    container().is_containerized()
}

#[unsafe(no_mangle)]
pub extern "C" fn oscontainer_is_containerized() -> bool {
    container().is_containerized()
}

/// Static NUL-terminated `"cgroupv1"`/`"cgroupv2"`, or null. Must not be freed.
#[unsafe(no_mangle)]
pub extern "C" fn oscontainer_container_type() -> *const c_char {
    match container().container_type() {
        Some("cgroupv1") => c"cgroupv1".as_ptr(),
        Some("cgroupv2") => c"cgroupv2".as_ptr(),
        _ => std::ptr::null(),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn oscontainer_physical_memory() -> u64 {
    container().physical_memory()
}

#[unsafe(no_mangle)]
pub extern "C" fn oscontainer_available_memory() -> u64 {
    container().available_memory()
}

#[unsafe(no_mangle)]
pub extern "C" fn oscontainer_total_swap_space() -> u64 {
    container().total_swap_space()
}

#[unsafe(no_mangle)]
pub extern "C" fn oscontainer_free_swap_space() -> u64 {
    container().free_swap_space()
}

#[unsafe(no_mangle)]
pub extern "C" fn oscontainer_memory_limit_in_bytes() -> i64 {
    with_subsystem(|s| s.memory_limit_in_bytes().to_raw())
}

#[unsafe(no_mangle)]
pub extern "C" fn oscontainer_memory_and_swap_limit_in_bytes() -> i64 {
    with_subsystem(|s| s.memory_and_swap_limit_in_bytes().to_raw())
}

#[unsafe(no_mangle)]
pub extern "C" fn oscontainer_memory_and_swap_usage_in_bytes() -> i64 {
    with_subsystem(|s| usage_to_raw(s.memory_and_swap_usage_in_bytes()))
}

#[unsafe(no_mangle)]
pub extern "C" fn oscontainer_memory_soft_limit_in_bytes() -> i64 {
    with_subsystem(|s| s.memory_soft_limit_in_bytes().to_raw())
}

#[unsafe(no_mangle)]
pub extern "C" fn oscontainer_memory_throttle_limit_in_bytes() -> i64 {
    with_subsystem(|s| s.memory_throttle_limit_in_bytes().to_raw())
}

#[unsafe(no_mangle)]
pub extern "C" fn oscontainer_memory_usage_in_bytes() -> i64 {
    with_subsystem(|s| usage_to_raw(s.memory_usage_in_bytes()))
}

#[unsafe(no_mangle)]
pub extern "C" fn oscontainer_memory_max_usage_in_bytes() -> i64 {
    with_subsystem(|s| usage_to_raw(s.memory_max_usage_in_bytes()))
}

#[unsafe(no_mangle)]
pub extern "C" fn oscontainer_rss_usage_in_bytes() -> i64 {
    with_subsystem(|s| usage_to_raw(s.rss_usage_in_bytes()))
}

#[unsafe(no_mangle)]
pub extern "C" fn oscontainer_cache_usage_in_bytes() -> i64 {
    with_subsystem(|s| usage_to_raw(s.cache_usage_in_bytes()))
}

/// Processor count after overrides and container limits; never below 1.
#[unsafe(no_mangle)]
pub extern "C" fn oscontainer_active_processor_count() -> i32 {
    narrow(i64::from(container().active_processor_count().max(1)))
}

#[unsafe(no_mangle)]
pub extern "C" fn oscontainer_cpu_quota() -> i32 {
    narrow(with_subsystem(|s| s.cpu_quota().to_raw()))
}

#[unsafe(no_mangle)]
pub extern "C" fn oscontainer_cpu_period() -> i32 {
    narrow(with_subsystem(|s| usage_to_raw(s.cpu_period())))
}

#[unsafe(no_mangle)]
pub extern "C" fn oscontainer_cpu_shares() -> i32 {
    narrow(with_subsystem(|s| s.cpu_shares().to_raw()))
}

#[unsafe(no_mangle)]
pub extern "C" fn oscontainer_cpu_usage_in_micros() -> i64 {
    with_subsystem(|s| usage_to_raw(s.cpu_usage_in_micros()))
}

#[unsafe(no_mangle)]
pub extern "C" fn oscontainer_pids_max() -> i64 {
    with_subsystem(|s| s.pids_max().to_raw())
}

#[unsafe(no_mangle)]
pub extern "C" fn oscontainer_pids_current() -> i64 {
    with_subsystem(|s| usage_to_raw(s.pids_current()))
}

/// Allowed CPUs in cpuset list format, or null. Free with
/// [`oscontainer_free_string`].
#[unsafe(no_mangle)]
pub extern "C" fn oscontainer_cpu_cpuset_cpus() -> *mut c_char {
    to_c_string(container().subsystem().and_then(|s| s.cpu_cpuset_cpus()))
}

/// Allowed memory nodes in cpuset list format, or null. Free with
/// [`oscontainer_free_string`].
#[unsafe(no_mangle)]
pub extern "C" fn oscontainer_cpu_cpuset_memory_nodes() -> *mut c_char {
    to_c_string(
        container()
            .subsystem()
            .and_then(|s| s.cpu_cpuset_memory_nodes()),
    )
}

/// Releases a string returned by this library.
///
/// # Safety
///
/// `ptr` must be null or a pointer returned by [`oscontainer_cpu_cpuset_cpus`]
/// or [`oscontainer_cpu_cpuset_memory_nodes`] that has not been freed yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn oscontainer_free_string(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    // SAFETY: guaranteed by the caller, the pointer came from `CString::into_raw`.
    drop(unsafe { CString::from_raw(ptr) });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgroup::UNLIMITED;
    use std::ffi::CStr;

    #[test]
    fn test_usage_sentinels() {
        assert_eq!(usage_to_raw(None), OSCONTAINER_ERROR);
        assert_eq!(usage_to_raw(Some(42)), 42);
        assert_eq!(usage_to_raw(Some(u64::MAX)), i64::MAX);
    }

    #[test]
    fn test_narrow() {
        assert_eq!(narrow(100_000), 100_000);
        assert_eq!(narrow(UNLIMITED), -1);
        assert_eq!(narrow(OSCONTAINER_ERROR), -2);
        assert_eq!(narrow(i64::MAX), i32::MAX);
        assert_eq!(narrow(i64::MIN), -2);
    }

    #[test]
    fn test_c_string_round_trip() {
        let ptr = to_c_string(Some("0-3".to_owned()));
        assert!(!ptr.is_null());
        // SAFETY: `ptr` was just returned by `to_c_string`.
        assert_eq!(unsafe { CStr::from_ptr(ptr) }.to_str().unwrap(), "0-3");
        // SAFETY: `ptr` came from `to_c_string` and is freed once.
        unsafe { oscontainer_free_string(ptr) };

        assert!(to_c_string(None).is_null());
        assert!(to_c_string(Some("a\0b".to_owned())).is_null());
        // SAFETY: null is accepted.
        unsafe { oscontainer_free_string(std::ptr::null_mut()) };
    }

    #[test]
    fn test_exported_functions_are_consistent() {
        let containerized = oscontainer_init();
        assert_eq!(oscontainer_is_containerized(), containerized);
        assert!(oscontainer_active_processor_count() >= 1);
        assert!(oscontainer_physical_memory() > 0);

        let container_type = oscontainer_container_type();
        if !container_type.is_null() {
            // SAFETY: non-null results point at static C string literals.
            let name = unsafe { CStr::from_ptr(container_type) };
            assert!(name.to_bytes().starts_with(b"cgroupv"));
        }
    }
}
