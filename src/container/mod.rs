//! Container detection and container-aware resource queries.
//!
//! [`OsContainer::init`] decides once whether the process runs inside a
//! resource-constrained container. Afterwards the OS-level queries
//! ([`OsContainer::physical_memory`], [`OsContainer::active_processor_count`],
//! ...) report the container's limits instead of the host's capacity.

use std::sync::Arc;

use crate::cgroup::{CgroupSubsystem, CgroupSubsystemFactory, Limit};
use crate::config::ContainerConfig;
use crate::host::{HostResources, LinuxHost};

mod report;

pub use report::ContainerReport;

/// Outcome of container detection.
#[derive(Debug)]
pub struct OsContainer {
    subsystem: Option<CgroupSubsystem>,
    containerized: bool,
    host: Arc<dyn HostResources>,
    active_processor_count_override: Option<u32>,
}

impl OsContainer {
    /// Runs container detection against the local host.
    pub fn init(config: &ContainerConfig) -> Self {
        Self::init_with_host(config, Arc::new(LinuxHost))
    }

    /// Runs container detection with the given host resources.
    ///
    /// The process counts as containerized if all cgroup controllers are
    /// mounted read-only, or, failing that, if a memory limit is set or the
    /// CPU quota allows fewer processors than the host has.
    pub fn init_with_host(config: &ContainerConfig, host: Arc<dyn HostResources>) -> Self {
        log::trace!("OSContainer::init: Initializing Container Support");
        let mut container = Self {
            subsystem: None,
            containerized: false,
            host: Arc::clone(&host),
            active_processor_count_override: config.active_processor_count,
        };

        if !config.use_container_support {
            log::trace!("Container Support not enabled");
            return container;
        }

        let factory =
            CgroupSubsystemFactory::new(config.paths.clone(), Arc::clone(&host), config.cache_timeout);
        let subsystem = match factory.create() {
            Ok(subsystem) => subsystem,
            Err(err) => {
                log::debug!("OSContainer::init: no cgroup subsystem: {err}");
                return container;
            }
        };

        let reason;
        let controllers_read_only = subsystem.is_containerized();
        let mut any_limit_present = false;
        if controllers_read_only {
            reason = "all required controllers are mounted read-only";
        } else {
            // Either a plain host, or limits enforced by other means such as a
            // systemd slice.
            any_limit_present = subsystem.memory_limit_in_bytes().limited().is_some_and(|l| l > 0)
                || host.active_processor_count() != subsystem.active_processor_count();
            reason = if any_limit_present {
                "a cgroup limit is present"
            } else {
                "no cpu or memory limit is present"
            };
        }

        container.containerized = controllers_read_only || any_limit_present;
        log::debug!(
            "OSContainer::init: is_containerized() = {} because {reason}",
            container.containerized
        );
        container.subsystem = Some(subsystem);
        container
    }

    pub fn is_containerized(&self) -> bool {
        self.containerized
    }

    /// The detected cgroup subsystem, present whenever detection succeeded,
    /// even if the process is not considered containerized.
    pub fn subsystem(&self) -> Option<&CgroupSubsystem> {
        self.subsystem.as_ref()
    }

    /// `"cgroupv1"` or `"cgroupv2"`, if detection succeeded.
    pub fn container_type(&self) -> Option<&'static str> {
        self.subsystem.as_ref().map(CgroupSubsystem::container_type)
    }

    pub fn active_processor_count_override(&self) -> Option<u32> {
        self.active_processor_count_override
    }

    /// Subsystem of a containerized process.
    fn container(&self) -> Option<&CgroupSubsystem> {
        self.subsystem.as_ref().filter(|_| self.containerized)
    }

    /// Physical memory in bytes: the container memory limit if one is set,
    /// otherwise the host's memory.
    pub fn physical_memory(&self) -> u64 {
        if let Some(subsystem) = self.container() {
            match subsystem.memory_limit_in_bytes() {
                Limit::Limited(limit) if limit > 0 => {
                    log::trace!("total container memory: {limit}");
                    return limit;
                }
                limit => log::debug!("container memory limit {limit}, using host value"),
            }
        }
        let phys_mem = self.host.physical_memory();
        log::trace!("total system memory: {phys_mem}");
        phys_mem
    }

    /// Memory in bytes still available to the process.
    pub fn available_memory(&self) -> u64 {
        if let Some(subsystem) = self.container() {
            let limit = subsystem.memory_limit_in_bytes().limited().filter(|&l| l > 0);
            let usage = subsystem.memory_usage_in_bytes().filter(|&u| u > 0);
            if let (Some(limit), Some(usage)) = (limit, usage) {
                let available = limit.saturating_sub(usage);
                log::trace!("available container memory: {available}");
                return available;
            }
        }
        let available = self.host.available_memory();
        log::trace!("available memory: {available}");
        available
    }

    /// Swap space in bytes the process may use.
    pub fn total_swap_space(&self) -> u64 {
        if let Some(subsystem) = self.container() {
            let memory_limit = subsystem.memory_limit_in_bytes().limited();
            let memory_and_swap_limit = subsystem.memory_and_swap_limit_in_bytes().limited();
            if let (Some(memory), Some(memory_and_swap)) = (memory_limit, memory_and_swap_limit) {
                if memory > 0 {
                    return memory_and_swap.saturating_sub(memory);
                }
            }
        }
        self.host.total_swap()
    }

    /// Swap space in bytes the process may still use.
    pub fn free_swap_space(&self) -> u64 {
        if let Some(subsystem) = self.container() {
            let memory_and_swap_limit = subsystem.memory_and_swap_limit_in_bytes();
            let memory_limit = subsystem.memory_limit_in_bytes();
            if let (Some(memory_and_swap), Some(memory)) =
                (memory_and_swap_limit.limited(), memory_limit.limited())
            {
                if memory_and_swap <= memory {
                    return 0;
                }
                let limit_delta = memory_and_swap - memory;
                let memory_and_swap_usage =
                    subsystem.memory_and_swap_usage_in_bytes().filter(|&u| u > 0);
                let memory_usage = subsystem.memory_usage_in_bytes().filter(|&u| u > 0);
                if let (Some(memory_and_swap_usage), Some(memory_usage)) =
                    (memory_and_swap_usage, memory_usage)
                {
                    if memory_and_swap_usage >= memory_usage {
                        let usage_delta = memory_and_swap_usage - memory_usage;
                        return limit_delta.saturating_sub(usage_delta);
                    }
                }
            }
            log::trace!(
                "free_swap_space: container_swap_limit={memory_and_swap_limit} container_mem_limit={memory_limit} returning host value"
            );
        }
        self.host.free_swap()
    }

    /// Number of processors the process may use: the configured override, the
    /// container's CPU limit, or the host's processors, in that order.
    pub fn active_processor_count(&self) -> u32 {
        if let Some(count) = self.active_processor_count_override {
            log::trace!("active_processor_count: active processor count set by user : {count}");
            return count;
        }
        if let Some(subsystem) = self.container() {
            let count = subsystem.active_processor_count();
            log::trace!("active_processor_count: determined by OSContainer: {count}");
            return count;
        }
        self.host.active_processor_count()
    }

    /// Processors allowed by the cgroup CPU settings alone, ignoring the
    /// configured override. The host's count when no subsystem was found.
    pub fn cgroup_processor_count(&self) -> u32 {
        self.subsystem()
            .map_or_else(|| self.host.active_processor_count(), |s| s.active_processor_count())
    }

    /// Snapshot of all container metrics.
    pub fn report(&self) -> ContainerReport {
        ContainerReport::collect(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgroup::testutil::{FixedHost, GIB, MIB, write_file, write_v1_system};
    use crate::config::CgroupPaths;
    use std::path::Path;
    use std::time::Duration;

    fn config(paths: CgroupPaths) -> ContainerConfig {
        ContainerConfig {
            cache_timeout: Duration::ZERO,
            paths,
            ..ContainerConfig::default()
        }
    }

    fn init(paths: CgroupPaths) -> OsContainer {
        OsContainer::init_with_host(&config(paths), Arc::new(FixedHost::default()))
    }

    fn memory_dir(paths: &CgroupPaths) -> std::path::PathBuf {
        paths.cgroup_root.join("memory")
    }

    fn cpu_dir(paths: &CgroupPaths) -> std::path::PathBuf {
        paths.cgroup_root.join("cpu,cpuacct")
    }

    fn set_cpu_quota(paths: &CgroupPaths, quota: &str) {
        write_file(&cpu_dir(paths), "cpu.cfs_quota_us", quota);
        write_file(&cpu_dir(paths), "cpu.cfs_period_us", "100000\n");
    }

    #[test]
    fn test_disabled_container_support() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_v1_system(dir.path(), "ro");
        let config = ContainerConfig {
            use_container_support: false,
            ..config(paths)
        };

        let container = OsContainer::init_with_host(&config, Arc::new(FixedHost::default()));
        assert!(!container.is_containerized());
        assert!(container.subsystem().is_none());
        assert_eq!(container.container_type(), None);
        assert_eq!(container.physical_memory(), 8 * GIB);
        assert_eq!(container.active_processor_count(), 8);
    }

    #[test]
    fn test_detection_failure_is_not_containerized() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("cgroup")).unwrap();
        let paths = CgroupPaths {
            cgroup_root: dir.path().join("cgroup"),
            proc_cgroups: dir.path().join("missing"),
            proc_self_cgroup: dir.path().join("missing"),
            proc_self_mountinfo: dir.path().join("missing"),
        };

        let container = init(paths);
        assert!(!container.is_containerized());
        assert!(container.subsystem().is_none());
    }

    #[test]
    fn test_missing_cgroup_root_is_not_containerized() {
        let container = init(CgroupPaths {
            cgroup_root: Path::new("/definitely/does/not/exist").to_path_buf(),
            ..CgroupPaths::default()
        });
        assert!(!container.is_containerized());
    }

    #[test]
    fn test_read_only_controllers_are_containerized() {
        let dir = tempfile::tempdir().unwrap();
        let container = init(write_v1_system(dir.path(), "ro"));
        assert!(container.is_containerized());
        assert_eq!(container.container_type(), Some("cgroupv1"));
    }

    #[test]
    fn test_host_without_limits_is_not_containerized() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_v1_system(dir.path(), "rw");
        write_file(
            &memory_dir(&paths),
            "memory.limit_in_bytes",
            "9223372036854771712\n",
        );
        set_cpu_quota(&paths, "-1\n");

        let container = init(paths);
        assert!(!container.is_containerized());
        assert!(container.subsystem().is_some());
        assert_eq!(container.physical_memory(), 8 * GIB);
        assert_eq!(container.available_memory(), 6 * GIB);
        assert_eq!(container.total_swap_space(), 2 * GIB);
        assert_eq!(container.free_swap_space(), GIB);
    }

    #[test]
    fn test_memory_limit_means_containerized() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_v1_system(dir.path(), "rw");
        write_file(&memory_dir(&paths), "memory.limit_in_bytes", "536870912\n");
        write_file(&memory_dir(&paths), "memory.usage_in_bytes", "134217728\n");

        let container = init(paths);
        assert!(container.is_containerized());
        assert_eq!(container.physical_memory(), 512 * MIB);
        assert_eq!(container.available_memory(), 384 * MIB);
    }

    #[test]
    fn test_cpu_limit_means_containerized() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_v1_system(dir.path(), "rw");
        set_cpu_quota(&paths, "300000\n");

        let container = init(paths);
        assert!(container.is_containerized());
        assert_eq!(container.active_processor_count(), 3);
    }

    #[test]
    fn test_processor_count_override() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_v1_system(dir.path(), "rw");
        set_cpu_quota(&paths, "300000\n");
        let config = ContainerConfig {
            active_processor_count: Some(5),
            ..config(paths)
        };

        let container = OsContainer::init_with_host(&config, Arc::new(FixedHost::default()));
        assert!(container.is_containerized());
        assert_eq!(container.active_processor_count(), 5);
        assert_eq!(container.active_processor_count_override(), Some(5));
        assert_eq!(container.cgroup_processor_count(), 3);
    }

    #[test]
    fn test_swap_space_in_container() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_v1_system(dir.path(), "rw");
        let memory = memory_dir(&paths);
        write_file(&memory, "memory.limit_in_bytes", "1073741824\n");
        write_file(&memory, "memory.memsw.limit_in_bytes", "1610612736\n");
        write_file(&memory, "memory.swappiness", "60\n");
        write_file(&memory, "memory.usage_in_bytes", "104857600\n");
        write_file(&memory, "memory.memsw.usage_in_bytes", "209715200\n");

        let container = init(paths);
        assert!(container.is_containerized());
        assert_eq!(container.total_swap_space(), 512 * MIB);
        assert_eq!(container.free_swap_space(), 412 * MIB);

        write_file(&memory, "memory.swappiness", "0\n");
        assert_eq!(container.total_swap_space(), 0);
        assert_eq!(container.free_swap_space(), 0);
    }
}
