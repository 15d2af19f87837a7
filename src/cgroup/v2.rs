//! Controllers of the unified cgroup v2 hierarchy, where every controller
//! shares one mount and one cgroup directory.

use std::path::{Path, PathBuf};

use super::controller::{
    CgroupController, CpuController, CpuacctController, MemoryController, TupleValue,
    join_cgroup_path,
};
use super::limit::Limit;
use super::stats::{CpuStat, V2MemoryStat};
use super::{Error, Result};
use crate::error::ResultOkLogExt;

/// Shares of one CPU in cgroup v1 terms.
const PER_CPU_SHARES: u64 = 1024;
const MIN_WEIGHT: u64 = 1;
const MAX_WEIGHT: u64 = 10_000;

/// The unified cgroup v2 mount, e.g. `/sys/fs/cgroup`.
#[derive(Debug, Clone)]
pub struct CgroupV2Controller {
    mount_point: PathBuf,
    cgroup_path: String,
    path: PathBuf,
    read_only: bool,
}

impl CgroupV2Controller {
    pub fn new(mount_point: impl Into<PathBuf>, cgroup_path: &str, read_only: bool) -> Self {
        let mount_point = mount_point.into();
        let path = join_cgroup_path(&mount_point, cgroup_path);
        Self {
            mount_point,
            cgroup_path: cgroup_path.to_owned(),
            path,
            read_only,
        }
    }
}

impl CgroupController for CgroupV2Controller {
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
        self.path = join_cgroup_path(&self.mount_point, cgroup_path);
    }

    fn needs_hierarchy_adjustment(&self) -> bool {
        self.cgroup_path != "/"
    }
}

/// Memory controller of cgroup v2 (`memory.max`, `memory.current`, ...).
#[derive(Debug, Clone)]
pub struct CgroupV2MemoryController {
    reader: CgroupV2Controller,
}

impl CgroupV2MemoryController {
    pub fn new(reader: CgroupV2Controller) -> Self {
        Self { reader }
    }

    fn memory_stat(&self) -> Option<V2MemoryStat> {
        self.reader
            .read_stat::<V2MemoryStat>("memory.stat")
            .ok_trace("memory.stat")
    }

    fn swap_limit(&self) -> Option<Limit> {
        self.reader
            .read_number_handle_max("memory.swap.max")
            .ok_trace("Swap Limit")
    }

    fn swap_usage(&self) -> Option<u64> {
        self.reader
            .read_number("memory.swap.current")
            .ok_trace("Swap currently used")
    }
}

impl MemoryController for CgroupV2MemoryController {
    fn controller(&self) -> &dyn CgroupController {
        &self.reader
    }

    fn controller_mut(&mut self) -> &mut dyn CgroupController {
        &mut self.reader
    }

    fn read_memory_limit_in_bytes(&self, phys_mem: u64) -> Limit {
        let limit = match self
            .reader
            .read_number_handle_max("memory.max")
            .ok_trace("Memory Limit")
        {
            Some(Limit::Limited(limit)) => Limit::with_threshold(limit, phys_mem),
            Some(limit) => limit,
            None => Limit::Unsupported,
        };
        log::trace!("Memory Limit is: {limit}");
        limit
    }

    fn memory_and_swap_limit_in_bytes(&self, phys_mem: u64, _host_swap: u64) -> Limit {
        let memory_limit = self.read_memory_limit_in_bytes(phys_mem);
        let Some(swap_limit) = self.swap_limit() else {
            log::trace!(
                "Memory and Swap Limit has been reset to {memory_limit} because swap is not supported"
            );
            return memory_limit;
        };
        match (memory_limit, swap_limit) {
            (Limit::Limited(memory), Limit::Limited(swap)) => {
                Limit::Limited(memory.saturating_add(swap))
            }
            (Limit::Unsupported, _) => Limit::Unsupported,
            _ => Limit::Unlimited,
        }
    }

    fn memory_and_swap_usage_in_bytes(&self, _phys_mem: u64, _host_swap: u64) -> Option<u64> {
        let memory_usage = self.memory_usage_in_bytes()?;
        Some(memory_usage.saturating_add(self.swap_usage().unwrap_or(0)))
    }

    fn memory_soft_limit_in_bytes(&self, phys_mem: u64) -> Limit {
        match self
            .reader
            .read_number_handle_max("memory.low")
            .ok_trace("Memory Soft Limit")
        {
            Some(Limit::Limited(limit)) => Limit::with_threshold(limit, phys_mem),
            Some(limit) => limit,
            None => Limit::Unsupported,
        }
    }

    fn memory_throttle_limit_in_bytes(&self) -> Limit {
        self.reader
            .read_number_handle_max("memory.high")
            .ok_trace("Memory Throttle Limit")
            .into()
    }

    fn memory_usage_in_bytes(&self) -> Option<u64> {
        self.reader
            .read_number("memory.current")
            .ok_trace("Memory Usage")
    }

    fn memory_max_usage_in_bytes(&self) -> Option<u64> {
        None
    }

    fn rss_usage_in_bytes(&self) -> Option<u64> {
        self.memory_stat().and_then(|stat| stat.anon)
    }

    fn cache_usage_in_bytes(&self) -> Option<u64> {
        self.memory_stat().and_then(|stat| stat.file)
    }

    fn version_specific_info(&self, _phys_mem: u64) -> Vec<(&'static str, Limit)> {
        vec![
            (
                "memory_swap_current_in_bytes",
                self.swap_usage().map(Limit::Limited).into(),
            ),
            ("memory_swap_max_limit_in_bytes", self.swap_limit().into()),
        ]
    }
}

/// CPU controller of cgroup v2 (`cpu.max`, `cpu.weight`).
#[derive(Debug, Clone)]
pub struct CgroupV2CpuController {
    reader: CgroupV2Controller,
}

impl CgroupV2CpuController {
    pub fn new(reader: CgroupV2Controller) -> Self {
        Self { reader }
    }

    pub fn reader(&self) -> &CgroupV2Controller {
        &self.reader
    }
}

impl CpuController for CgroupV2CpuController {
    fn controller(&self) -> &dyn CgroupController {
        &self.reader
    }

    fn controller_mut(&mut self) -> &mut dyn CgroupController {
        &mut self.reader
    }

    fn cpu_quota(&self) -> Limit {
        self.reader
            .read_tuple_value("cpu.max", TupleValue::First)
            .ok_trace("CPU Quota")
            .into()
    }

    fn cpu_period(&self) -> Option<u64> {
        self.reader
            .read_tuple_value("cpu.max", TupleValue::Second)
            .ok_trace("CPU Period")
            .and_then(Limit::limited)
    }

    fn cpu_shares(&self) -> Limit {
        let Some(weight) = self.reader.read_number("cpu.weight").ok_trace("CPU Weight") else {
            return Limit::Unsupported;
        };
        if !(MIN_WEIGHT..=MAX_WEIGHT).contains(&weight) {
            log::trace!("CPU Weight {weight} is outside [{MIN_WEIGHT}, {MAX_WEIGHT}]");
            return Limit::Unsupported;
        }
        // 100 is the kernel default, i.e. no weight configured.
        if weight == 100 {
            log::trace!("CPU Shares is: unlimited");
            return Limit::Unlimited;
        }
        let shares = weight_to_shares(weight);
        log::trace!("Scaled CPU shares value is: {shares}");
        Limit::Limited(shares)
    }
}

/// Maps a `cpu.weight` in `[1, 10000]` onto the v1 share range `[2, 262144]`
/// the way the kernel does, then snaps values above one CPU to the closest
/// multiple of [`PER_CPU_SHARES`] (the lower one on ties).
pub fn weight_to_shares(weight: u64) -> u64 {
    let shares = weight.saturating_mul(262_142).saturating_sub(1) / 9999 + 2;
    if shares <= PER_CPU_SHARES {
        return shares;
    }
    let lower = shares / PER_CPU_SHARES * PER_CPU_SHARES;
    let upper = lower + PER_CPU_SHARES;
    if shares - lower <= upper - shares {
        lower
    } else {
        upper
    }
}

/// CPU accounting of cgroup v2, served by the `cpu` controller's `cpu.stat`.
#[derive(Debug, Clone)]
pub struct CgroupV2CpuacctController {
    reader: CgroupV2Controller,
}

impl CgroupV2CpuacctController {
    pub fn new(reader: CgroupV2Controller) -> Self {
        Self { reader }
    }

    fn usage_usec(&self) -> Result<u64> {
        let stat = self.reader.read_stat::<CpuStat>("cpu.stat")?;
        stat.usage_usec.ok_or_else(|| Error::MissingKey {
            path: self.reader.subsystem_path().join("cpu.stat"),
            key: "usage_usec",
        })
    }
}

impl CpuacctController for CgroupV2CpuacctController {
    fn controller(&self) -> &dyn CgroupController {
        &self.reader
    }

    fn cpu_usage_in_micros(&self) -> Option<u64> {
        self.usage_usec().ok_trace("CPU Usage")
    }
}
