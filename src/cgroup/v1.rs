//! Controllers of the legacy cgroup v1 hierarchy, one mount per controller.

use std::path::{Path, PathBuf};

use super::controller::{
    CgroupController, CpuController, CpuacctController, MemoryController, join_cgroup_path,
};
use super::limit::Limit;
use super::stats::V1MemoryStat;
use crate::error::ResultOkLogExt;

/// A cgroup v1 controller mount, e.g. `/sys/fs/cgroup/memory`.
#[derive(Debug, Clone)]
pub struct CgroupV1Controller {
    /// Root of the mount within the cgroup hierarchy (mountinfo field 4).
    root: String,
    mount_point: PathBuf,
    cgroup_path: String,
    path: PathBuf,
    read_only: bool,
}

impl CgroupV1Controller {
    /// Creates a controller for the process cgroup `cgroup_path`.
    pub fn new(
        root: impl Into<String>,
        mount_point: impl Into<PathBuf>,
        cgroup_path: &str,
        read_only: bool,
    ) -> Self {
        let mut controller = Self {
            root: root.into(),
            mount_point: mount_point.into(),
            cgroup_path: cgroup_path.to_owned(),
            path: PathBuf::new(),
            read_only,
        };
        match controller.resolve_path(cgroup_path) {
            Some(path) => controller.path = path,
            None => {
                log::warn!(
                    "No directory for cgroup `{}` below mount `{}` (root `{}`), using the mount point",
                    cgroup_path,
                    controller.mount_point.display(),
                    controller.root
                );
                controller.path = controller.mount_point.clone();
            }
        }
        controller
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Computes the subsystem path for `cgroup_path`, `None` if a moved cgroup
    /// has no visible directory below the mount.
    fn resolve_path(&self, cgroup_path: &str) -> Option<PathBuf> {
        if self.root == "/" {
            return Some(join_cgroup_path(&self.mount_point, cgroup_path));
        }
        if self.root == cgroup_path {
            return Some(self.mount_point.clone());
        }

        // The cgroup was moved out of the mounted subtree. Try ever shorter
        // suffixes of it, starting with the whole path.
        let mut suffix = cgroup_path;
        loop {
            let candidate = join_cgroup_path(&self.mount_point, suffix);
            if candidate.is_dir() {
                log::trace!(
                    "Using suffix `{}` of cgroup `{}` at `{}`",
                    suffix,
                    cgroup_path,
                    candidate.display()
                );
                return Some(candidate);
            }
            let next = suffix.get(1..).and_then(|rest| rest.find('/'));
            match next {
                Some(idx) => suffix = &suffix[idx + 1..],
                None => return None,
            }
        }
    }
}

impl CgroupController for CgroupV1Controller {
    fn subsystem_path(&self) -> &Path {
        &self.path
    }

    fn cgroup_path(&self) -> &str {
        &self.cgroup_path
    }

    fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn set_subsystem_path(&mut self, cgroup_path: &str) {
        self.cgroup_path = cgroup_path.to_owned();
        self.path = self.resolve_path(cgroup_path).unwrap_or_else(|| {
            log::trace!("No directory for cgroup `{cgroup_path}`, using the mount point");
            self.mount_point.clone()
        });
    }

    fn needs_hierarchy_adjustment(&self) -> bool {
        self.root != self.cgroup_path
    }
}

/// Memory controller of cgroup v1 (`memory.limit_in_bytes` and friends).
#[derive(Debug, Clone)]
pub struct CgroupV1MemoryController {
    reader: CgroupV1Controller,
}

impl CgroupV1MemoryController {
    pub fn new(reader: CgroupV1Controller) -> Self {
        Self { reader }
    }

    /// Whether limits of ancestors apply to this cgroup (`memory.use_hierarchy`).
    fn is_hierarchical(&self) -> bool {
        self.reader
            .read_number("memory.use_hierarchy")
            .ok_trace("memory.use_hierarchy")
            == Some(1)
    }

    fn memory_stat(&self) -> Option<V1MemoryStat> {
        self.reader
            .read_stat::<V1MemoryStat>("memory.stat")
            .ok_trace("memory.stat")
    }

    /// Reads `memory.memsw.limit_in_bytes`, consulting the hierarchical limit
    /// when the flat one is unlimited.
    fn read_mem_swap(&self, host_total_memsw: u64) -> Limit {
        let Some(limit) = self
            .reader
            .read_number("memory.memsw.limit_in_bytes")
            .ok_trace("Memory and Swap Limit")
        else {
            return Limit::Unsupported;
        };
        if limit < host_total_memsw {
            log::trace!("Memory and Swap Limit is: {limit}");
            return Limit::Limited(limit);
        }

        log::trace!("Memory and Swap Limit is: Unlimited");
        if self.is_hierarchical() {
            let hierarchical = self
                .memory_stat()
                .and_then(|stat| stat.hierarchical_memsw_limit)
                .filter(|&limit| limit < host_total_memsw);
            if let Some(limit) = hierarchical {
                log::trace!("Hierarchical Memory and Swap Limit is: {limit}");
                return Limit::Limited(limit);
            }
        }
        Limit::Unlimited
    }
}

impl MemoryController for CgroupV1MemoryController {
    fn controller(&self) -> &dyn CgroupController {
        &self.reader
    }

    fn controller_mut(&mut self) -> &mut dyn CgroupController {
        &mut self.reader
    }

    fn read_memory_limit_in_bytes(&self, phys_mem: u64) -> Limit {
        let Some(limit) = self
            .reader
            .read_number("memory.limit_in_bytes")
            .ok_trace("Memory Limit")
        else {
            return Limit::Unsupported;
        };
        if limit < phys_mem {
            log::trace!("Memory Limit is: {limit}");
            return Limit::Limited(limit);
        }

        log::trace!("Non-Hierarchical Memory Limit is: Unlimited");
        if self.is_hierarchical() {
            let hierarchical = self
                .memory_stat()
                .and_then(|stat| stat.hierarchical_memory_limit)
                .filter(|&limit| limit < phys_mem);
            if let Some(limit) = hierarchical {
                log::trace!("Hierarchical Memory Limit is: {limit}");
                return Limit::Limited(limit);
            }
            log::trace!("Hierarchical Memory Limit is: Unlimited");
        }
        Limit::Unlimited
    }

    fn memory_and_swap_limit_in_bytes(&self, phys_mem: u64, host_swap: u64) -> Limit {
        let memory_swap = self.read_mem_swap(phys_mem.saturating_add(host_swap));
        if memory_swap.is_unlimited() {
            return memory_swap;
        }

        // A swap limit without swapping is just the memory limit.
        let swappiness = self
            .reader
            .read_number("memory.swappiness")
            .ok_trace("Swappiness");
        if memory_swap.is_unsupported() || swappiness == Some(0) {
            let memory_limit = self.read_memory_limit_in_bytes(phys_mem);
            if memory_swap.is_unsupported() {
                log::trace!(
                    "Memory and Swap Limit has been reset to {memory_limit} because swap is not supported"
                );
            } else {
                log::trace!(
                    "Memory and Swap Limit has been reset to {memory_limit} because swappiness is 0"
                );
            }
            return memory_limit;
        }
        memory_swap
    }

    fn memory_and_swap_usage_in_bytes(&self, phys_mem: u64, host_swap: u64) -> Option<u64> {
        let memory_swap_limit = self
            .memory_and_swap_limit_in_bytes(phys_mem, host_swap)
            .limited();
        let memory_limit = self.read_memory_limit_in_bytes(phys_mem).limited();
        if let (Some(memory_swap_limit), Some(memory_limit)) = (memory_swap_limit, memory_limit) {
            if memory_swap_limit > memory_limit {
                return self
                    .reader
                    .read_number("memory.memsw.usage_in_bytes")
                    .ok_trace("mem swap usage");
            }
        }
        self.memory_usage_in_bytes()
    }

    fn memory_soft_limit_in_bytes(&self, phys_mem: u64) -> Limit {
        self.reader
            .read_number("memory.soft_limit_in_bytes")
            .ok_trace("Memory Soft Limit")
            .map(|limit| Limit::with_threshold(limit, phys_mem))
            .into()
    }

    fn memory_throttle_limit_in_bytes(&self) -> Limit {
        Limit::Unsupported
    }

    fn memory_usage_in_bytes(&self) -> Option<u64> {
        self.reader
            .read_number("memory.usage_in_bytes")
            .ok_trace("Memory Usage")
    }

    fn memory_max_usage_in_bytes(&self) -> Option<u64> {
        self.reader
            .read_number("memory.max_usage_in_bytes")
            .ok_trace("Maximum Memory Usage")
    }

    fn rss_usage_in_bytes(&self) -> Option<u64> {
        self.memory_stat().and_then(|stat| stat.rss)
    }

    fn cache_usage_in_bytes(&self) -> Option<u64> {
        self.memory_stat().and_then(|stat| stat.cache)
    }

    fn version_specific_info(&self, phys_mem: u64) -> Vec<(&'static str, Limit)> {
        let usage = |file: &str| {
            Limit::from(
                self.reader
                    .read_number(file)
                    .ok_trace(file)
                    .map(Limit::Limited),
            )
        };
        let kmem_limit: Limit = self
            .reader
            .read_number("memory.kmem.limit_in_bytes")
            .ok_trace("Kernel Memory Limit")
            .map(|limit| Limit::with_threshold(limit, phys_mem))
            .into();

        vec![
            (
                "kernel_memory_usage_in_bytes",
                usage("memory.kmem.usage_in_bytes"),
            ),
            ("kernel_memory_limit_in_bytes", kmem_limit),
            (
                "kernel_memory_max_usage_in_bytes",
                usage("memory.kmem.max_usage_in_bytes"),
            ),
        ]
    }
}

/// CPU controller of cgroup v1 (`cpu.cfs_quota_us`, `cpu.cfs_period_us`, `cpu.shares`).
#[derive(Debug, Clone)]
pub struct CgroupV1CpuController {
    reader: CgroupV1Controller,
}

impl CgroupV1CpuController {
    pub fn new(reader: CgroupV1Controller) -> Self {
        Self { reader }
    }
}

impl CpuController for CgroupV1CpuController {
    fn controller(&self) -> &dyn CgroupController {
        &self.reader
    }

    fn controller_mut(&mut self) -> &mut dyn CgroupController {
        &mut self.reader
    }

    fn cpu_quota(&self) -> Limit {
        self.reader
            .read_signed_number("cpu.cfs_quota_us")
            .ok_trace("CPU Quota")
            .map(Limit::from_raw)
            .into()
    }

    fn cpu_period(&self) -> Option<u64> {
        self.reader
            .read_number("cpu.cfs_period_us")
            .ok_trace("CPU Period")
    }

    fn cpu_shares(&self) -> Limit {
        let Some(shares) = self.reader.read_number("cpu.shares").ok_trace("CPU Shares") else {
            return Limit::Unsupported;
        };
        log::trace!("CPU Shares is: {shares}");
        // 1024 is the kernel default, i.e. no shares configured.
        if shares == 1024 {
            Limit::Unlimited
        } else {
            Limit::Limited(shares)
        }
    }
}

/// CPU accounting controller of cgroup v1 (`cpuacct.usage`).
#[derive(Debug, Clone)]
pub struct CgroupV1CpuacctController {
    reader: CgroupV1Controller,
}

impl CgroupV1CpuacctController {
    pub fn new(reader: CgroupV1Controller) -> Self {
        Self { reader }
    }
}

impl CpuacctController for CgroupV1CpuacctController {
    fn controller(&self) -> &dyn CgroupController {
        &self.reader
    }

    fn cpu_usage_in_micros(&self) -> Option<u64> {
        self.reader
            .read_number("cpuacct.usage")
            .ok_trace("CPU Usage")
            .map(|nanos| nanos / 1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgroup::testutil::{GIB, MIB, write_file};

    const PHYS: u64 = 8 * GIB;
    const SWAP: u64 = 2 * GIB;
    const KERNEL_UNLIMITED: &str = "9223372036854771712\n";

    fn memory_controller(dir: &Path) -> CgroupV1MemoryController {
        CgroupV1MemoryController::new(CgroupV1Controller::new("/", dir, "/", false))
    }

    #[test]
    fn test_subsystem_path_with_root_mount() {
        let c = CgroupV1Controller::new("/", "/sys/fs/cgroup/memory", "/user.slice", false);
        assert_eq!(
            c.subsystem_path(),
            Path::new("/sys/fs/cgroup/memory/user.slice")
        );
        assert!(c.needs_hierarchy_adjustment());

        let c = CgroupV1Controller::new("/", "/sys/fs/cgroup/memory", "/", false);
        assert_eq!(c.subsystem_path(), Path::new("/sys/fs/cgroup/memory"));
        assert!(!c.needs_hierarchy_adjustment());
    }

    #[test]
    fn test_subsystem_path_root_equals_cgroup_path() {
        let c = CgroupV1Controller::new(
            "/docker/abc",
            "/sys/fs/cgroup/memory",
            "/docker/abc",
            true,
        );
        assert_eq!(c.subsystem_path(), Path::new("/sys/fs/cgroup/memory"));
        assert!(!c.needs_hierarchy_adjustment());
        assert!(c.is_read_only());
    }

    #[test]
    fn test_subsystem_path_probes_suffixes() {
        let mount = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(mount.path().join("b/c")).unwrap();

        let c = CgroupV1Controller::new("/x", mount.path(), "/a/b/c", false);
        assert_eq!(c.subsystem_path(), mount.path().join("b/c"));
        assert_eq!(c.cgroup_path(), "/a/b/c");
    }

    #[test]
    fn test_subsystem_path_falls_back_to_mount_point() {
        let mount = tempfile::tempdir().unwrap();
        let c = CgroupV1Controller::new("/x", mount.path(), "/a/b", false);
        assert_eq!(c.subsystem_path(), mount.path());
    }

    #[test]
    fn test_memory_limit_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let c = memory_controller(dir.path());
        assert_eq!(c.read_memory_limit_in_bytes(PHYS), Limit::Unsupported);

        write_file(dir.path(), "memory.limit_in_bytes", "536870912\n");
        assert_eq!(c.read_memory_limit_in_bytes(PHYS), Limit::Limited(512 * MIB));

        write_file(dir.path(), "memory.limit_in_bytes", KERNEL_UNLIMITED);
        assert_eq!(c.read_memory_limit_in_bytes(PHYS), Limit::Unlimited);
    }

    #[test]
    fn test_memory_limit_uses_hierarchical_limit() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "memory.limit_in_bytes", KERNEL_UNLIMITED);
        write_file(dir.path(), "memory.use_hierarchy", "1\n");
        write_file(
            dir.path(),
            "memory.stat",
            "cache 10\nrss 20\nhierarchical_memory_limit 1073741824\nhierarchical_memsw_limit 2147483648\n",
        );

        let c = memory_controller(dir.path());
        assert_eq!(c.read_memory_limit_in_bytes(PHYS), Limit::Limited(GIB));
        assert_eq!(c.rss_usage_in_bytes(), Some(20));
        assert_eq!(c.cache_usage_in_bytes(), Some(10));

        write_file(dir.path(), "memory.use_hierarchy", "0\n");
        assert_eq!(c.read_memory_limit_in_bytes(PHYS), Limit::Unlimited);
    }

    #[test]
    fn test_memory_and_swap_limit() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "memory.limit_in_bytes", "1073741824\n");
        write_file(dir.path(), "memory.memsw.limit_in_bytes", "2147483648\n");
        write_file(dir.path(), "memory.swappiness", "60\n");

        let c = memory_controller(dir.path());
        assert_eq!(
            c.memory_and_swap_limit_in_bytes(PHYS, SWAP),
            Limit::Limited(2 * GIB)
        );

        write_file(dir.path(), "memory.swappiness", "0\n");
        assert_eq!(
            c.memory_and_swap_limit_in_bytes(PHYS, SWAP),
            Limit::Limited(GIB)
        );
    }

    #[test]
    fn test_memory_and_swap_limit_without_swap_support() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "memory.limit_in_bytes", "1073741824\n");

        let c = memory_controller(dir.path());
        assert_eq!(
            c.memory_and_swap_limit_in_bytes(PHYS, SWAP),
            Limit::Limited(GIB)
        );
    }

    #[test]
    fn test_memory_and_swap_limit_threshold_includes_host_swap() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "memory.limit_in_bytes", KERNEL_UNLIMITED);
        write_file(dir.path(), "memory.memsw.limit_in_bytes", "9663676416\n");
        write_file(dir.path(), "memory.swappiness", "60\n");

        // 9 GiB is above physical memory but below memory + swap.
        let c = memory_controller(dir.path());
        assert_eq!(
            c.memory_and_swap_limit_in_bytes(PHYS, SWAP),
            Limit::Limited(9 * GIB)
        );

        write_file(dir.path(), "memory.memsw.limit_in_bytes", KERNEL_UNLIMITED);
        assert_eq!(c.memory_and_swap_limit_in_bytes(PHYS, SWAP), Limit::Unlimited);
    }

    #[test]
    fn test_memory_and_swap_usage() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "memory.limit_in_bytes", "1073741824\n");
        write_file(dir.path(), "memory.memsw.limit_in_bytes", "2147483648\n");
        write_file(dir.path(), "memory.swappiness", "60\n");
        write_file(dir.path(), "memory.usage_in_bytes", "1000\n");
        write_file(dir.path(), "memory.memsw.usage_in_bytes", "3000\n");

        let c = memory_controller(dir.path());
        assert_eq!(c.memory_and_swap_usage_in_bytes(PHYS, SWAP), Some(3000));

        // No swap delta: plain memory usage.
        write_file(dir.path(), "memory.memsw.limit_in_bytes", "1073741824\n");
        assert_eq!(c.memory_and_swap_usage_in_bytes(PHYS, SWAP), Some(1000));
    }

    #[test]
    fn test_misc_memory_values() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "memory.soft_limit_in_bytes", KERNEL_UNLIMITED);
        write_file(dir.path(), "memory.max_usage_in_bytes", "4096\n");
        write_file(dir.path(), "memory.kmem.usage_in_bytes", "100\n");
        write_file(dir.path(), "memory.kmem.limit_in_bytes", KERNEL_UNLIMITED);

        let c = memory_controller(dir.path());
        assert_eq!(c.memory_soft_limit_in_bytes(PHYS), Limit::Unlimited);
        assert_eq!(c.memory_throttle_limit_in_bytes(), Limit::Unsupported);
        assert_eq!(c.memory_max_usage_in_bytes(), Some(4096));
        assert_eq!(c.memory_usage_in_bytes(), None);
        assert_eq!(
            c.version_specific_info(PHYS),
            vec![
                ("kernel_memory_usage_in_bytes", Limit::Limited(100)),
                ("kernel_memory_limit_in_bytes", Limit::Unlimited),
                ("kernel_memory_max_usage_in_bytes", Limit::Unsupported),
            ]
        );
    }

    #[test]
    fn test_cpu_values() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "cpu.cfs_quota_us", "150000\n");
        write_file(dir.path(), "cpu.cfs_period_us", "100000\n");
        write_file(dir.path(), "cpu.shares", "1024\n");

        let c = CgroupV1CpuController::new(CgroupV1Controller::new("/", dir.path(), "/", false));
        assert_eq!(c.cpu_quota(), Limit::Limited(150_000));
        assert_eq!(c.cpu_period(), Some(100_000));
        assert_eq!(c.cpu_shares(), Limit::Unlimited);

        write_file(dir.path(), "cpu.cfs_quota_us", "-1\n");
        write_file(dir.path(), "cpu.shares", "512\n");
        assert_eq!(c.cpu_quota(), Limit::Unlimited);
        assert_eq!(c.cpu_shares(), Limit::Limited(512));
    }

    #[test]
    fn test_cpuacct_usage_in_micros() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "cpuacct.usage", "123456789\n");
        let c =
            CgroupV1CpuacctController::new(CgroupV1Controller::new("/", dir.path(), "/", false));
        assert_eq!(c.cpu_usage_in_micros(), Some(123_456));
    }
}
