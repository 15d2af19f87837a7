use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::cache::CachingController;
use super::controller::{CgroupController, CpuController, CpuacctController, MemoryController};
use super::limit::Limit;
use super::util;
use crate::error::ResultOkLogExt;
use crate::host::HostResources;

/// Generation of the cgroup filesystem in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CgroupVersion {
    V1,
    V2,
}

impl CgroupVersion {
    pub fn container_type(self) -> &'static str {
        match self {
            CgroupVersion::V1 => "cgroupv1",
            CgroupVersion::V2 => "cgroupv2",
        }
    }
}

/// Version-agnostic view of the cgroup controllers limiting this process.
///
/// Built once by [`super::CgroupSubsystemFactory`]; afterwards only the cached
/// memory limit and processor count change.
#[derive(Debug)]
pub struct CgroupSubsystem {
    pub(super) version: CgroupVersion,
    pub(super) memory: CachingController<Box<dyn MemoryController>>,
    pub(super) cpu: CachingController<Box<dyn CpuController>>,
    pub(super) cpuacct: Box<dyn CpuacctController>,
    pub(super) cpuset: Box<dyn CgroupController>,
    pub(super) pids: Option<Box<dyn CgroupController>>,
    pub(super) host: Arc<dyn HostResources>,
    pub(super) cache_timeout: Duration,
}

impl CgroupSubsystem {
    pub fn version(&self) -> CgroupVersion {
        self.version
    }

    /// `"cgroupv1"` or `"cgroupv2"`.
    pub fn container_type(&self) -> &'static str {
        self.version.container_type()
    }

    /// Whether every required controller is mounted read-only, which container
    /// runtimes do and hosts do not.
    pub fn is_containerized(&self) -> bool {
        self.memory.controller().is_read_only()
            && self.cpu.controller().is_read_only()
            && self.cpuacct.is_read_only()
            && self.cpuset.is_read_only()
    }

    /// Memory limit, cached for the configured timeout.
    pub fn memory_limit_in_bytes(&self) -> Limit {
        let raw = self.memory.cached_or_refresh(self.cache_timeout, |memory| {
            memory
                .read_memory_limit_in_bytes(self.host.physical_memory())
                .to_raw()
        });
        Limit::from_raw(raw)
    }

    /// Processor count allowed by the CFS quota, cached for the configured timeout.
    pub fn active_processor_count(&self) -> u32 {
        let raw = self.cpu.cached_or_refresh(self.cache_timeout, |cpu| {
            i64::from(util::processor_count(
                cpu.as_ref(),
                self.host.active_processor_count(),
            ))
        });
        u32::try_from(raw).unwrap_or(1)
    }

    pub fn memory_and_swap_limit_in_bytes(&self) -> Limit {
        self.memory
            .controller()
            .memory_and_swap_limit_in_bytes(self.host.physical_memory(), self.host.total_swap())
    }

    pub fn memory_and_swap_usage_in_bytes(&self) -> Option<u64> {
        self.memory
            .controller()
            .memory_and_swap_usage_in_bytes(self.host.physical_memory(), self.host.total_swap())
    }

    pub fn memory_soft_limit_in_bytes(&self) -> Limit {
        self.memory
            .controller()
            .memory_soft_limit_in_bytes(self.host.physical_memory())
    }

    pub fn memory_throttle_limit_in_bytes(&self) -> Limit {
        self.memory.controller().memory_throttle_limit_in_bytes()
    }

    pub fn memory_usage_in_bytes(&self) -> Option<u64> {
        self.memory.controller().memory_usage_in_bytes()
    }

    pub fn memory_max_usage_in_bytes(&self) -> Option<u64> {
        self.memory.controller().memory_max_usage_in_bytes()
    }

    pub fn rss_usage_in_bytes(&self) -> Option<u64> {
        self.memory.controller().rss_usage_in_bytes()
    }

    pub fn cache_usage_in_bytes(&self) -> Option<u64> {
        self.memory.controller().cache_usage_in_bytes()
    }

    pub fn version_specific_info(&self) -> Vec<(&'static str, Limit)> {
        self.memory
            .controller()
            .version_specific_info(self.host.physical_memory())
    }

    pub fn cpu_quota(&self) -> Limit {
        self.cpu.controller().cpu_quota()
    }

    pub fn cpu_period(&self) -> Option<u64> {
        self.cpu.controller().cpu_period()
    }

    pub fn cpu_shares(&self) -> Limit {
        self.cpu.controller().cpu_shares()
    }

    pub fn cpu_usage_in_micros(&self) -> Option<u64> {
        self.cpuacct.cpu_usage_in_micros()
    }

    /// Maximum number of tasks; [`Limit::Unsupported`] without a pids controller.
    pub fn pids_max(&self) -> Limit {
        self.pids
            .as_ref()
            .and_then(|pids| {
                pids.read_number_handle_max("pids.max")
                    .ok_trace("Maximum number of tasks")
            })
            .into()
    }

    /// Number of tasks currently in the cgroup.
    pub fn pids_current(&self) -> Option<u64> {
        self.pids.as_ref().and_then(|pids| {
            pids.read_number("pids.current")
                .ok_trace("Current number of tasks")
        })
    }

    /// CPUs the cgroup may run on, in cpuset list format (e.g. `0-3,6`).
    pub fn cpu_cpuset_cpus(&self) -> Option<String> {
        self.read_cpuset("cpuset.cpus")
    }

    /// Memory nodes the cgroup may allocate from, in cpuset list format.
    pub fn cpu_cpuset_memory_nodes(&self) -> Option<String> {
        self.read_cpuset("cpuset.mems")
    }

    fn read_cpuset(&self, file: &str) -> Option<String> {
        let value = self.cpuset.read_string(file).ok_trace(file)?;
        if !value.is_empty() || self.version == CgroupVersion::V1 {
            return Some(value);
        }
        // An empty v2 cpuset means "inherited from the parent".
        let effective = format!("{file}.effective");
        self.cpuset.read_string(&effective).ok_trace(&effective)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgroup::testutil::{FixedHost, MIB, write_file};
    use crate::cgroup::v2::{
        CgroupV2Controller, CgroupV2CpuController, CgroupV2CpuacctController,
        CgroupV2MemoryController,
    };
    use std::path::Path;

    fn v2_subsystem(dir: &Path, cache_timeout: Duration) -> CgroupSubsystem {
        let unified = CgroupV2Controller::new(dir, "/", true);
        CgroupSubsystem {
            version: CgroupVersion::V2,
            memory: CachingController::new(Box::new(CgroupV2MemoryController::new(
                unified.clone(),
            ))),
            cpu: CachingController::new(Box::new(CgroupV2CpuController::new(unified.clone()))),
            cpuacct: Box::new(CgroupV2CpuacctController::new(unified.clone())),
            cpuset: Box::new(unified.clone()),
            pids: Some(Box::new(unified)),
            host: Arc::new(FixedHost::default()),
            cache_timeout,
        }
    }

    #[test]
    fn test_memory_limit_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "memory.max", "104857600\n");
        let subsystem = v2_subsystem(dir.path(), Duration::from_secs(3600));

        assert_eq!(subsystem.memory_limit_in_bytes(), Limit::Limited(100 * MIB));
        write_file(dir.path(), "memory.max", "209715200\n");
        assert_eq!(subsystem.memory_limit_in_bytes(), Limit::Limited(100 * MIB));
    }

    #[test]
    fn test_memory_limit_refreshes_after_timeout() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "memory.max", "104857600\n");
        let subsystem = v2_subsystem(dir.path(), Duration::ZERO);

        assert_eq!(subsystem.memory_limit_in_bytes(), Limit::Limited(100 * MIB));
        write_file(dir.path(), "memory.max", "209715200\n");
        assert_eq!(subsystem.memory_limit_in_bytes(), Limit::Limited(200 * MIB));
        write_file(dir.path(), "memory.max", "max\n");
        assert_eq!(subsystem.memory_limit_in_bytes(), Limit::Unlimited);
    }

    #[test]
    fn test_processor_count_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "cpu.max", "200000 100000\n");
        let subsystem = v2_subsystem(dir.path(), Duration::from_secs(3600));

        assert_eq!(subsystem.active_processor_count(), 2);
        write_file(dir.path(), "cpu.max", "max 100000\n");
        assert_eq!(subsystem.active_processor_count(), 2);

        let fresh = v2_subsystem(dir.path(), Duration::ZERO);
        assert_eq!(fresh.active_processor_count(), 8);
    }

    #[test]
    fn test_pids() {
        let dir = tempfile::tempdir().unwrap();
        let subsystem = v2_subsystem(dir.path(), Duration::ZERO);
        assert_eq!(subsystem.pids_max(), Limit::Unsupported);
        assert_eq!(subsystem.pids_current(), None);

        write_file(dir.path(), "pids.max", "max\n");
        write_file(dir.path(), "pids.current", "12\n");
        assert_eq!(subsystem.pids_max(), Limit::Unlimited);
        assert_eq!(subsystem.pids_current(), Some(12));

        write_file(dir.path(), "pids.max", "4096\n");
        assert_eq!(subsystem.pids_max(), Limit::Limited(4096));
    }

    #[test]
    fn test_cpuset_falls_back_to_effective() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "cpuset.cpus", "\n");
        write_file(dir.path(), "cpuset.cpus.effective", "0-3\n");
        write_file(dir.path(), "cpuset.mems", "0\n");
        let subsystem = v2_subsystem(dir.path(), Duration::ZERO);

        assert_eq!(subsystem.cpu_cpuset_cpus().as_deref(), Some("0-3"));
        assert_eq!(subsystem.cpu_cpuset_memory_nodes().as_deref(), Some("0"));
    }

    #[test]
    fn test_read_only_controllers_mean_containerized() {
        let dir = tempfile::tempdir().unwrap();
        let subsystem = v2_subsystem(dir.path(), Duration::ZERO);
        assert!(subsystem.is_containerized());
        assert_eq!(subsystem.container_type(), "cgroupv2");
    }
}
