//! Detection of cgroup resource limits applying to the current process.
//!
//! Both generations of the Linux cgroup filesystem are supported:
//!
//! - **v1**: one mount per controller (`/sys/fs/cgroup/memory`, ...), controllers
//!   listed in `/proc/cgroups`.
//! - **v2**: a single unified mount, controllers listed in `cgroup.controllers`.
//!
//! # Key Components
//!
//! - [`CgroupSubsystemFactory`] detects the cgroup version and mounts and builds
//!   a [`CgroupSubsystem`].
//! - [`CgroupSubsystem`] answers memory, CPU, pids and cpuset queries
//!   independently of the cgroup version.
//! - [`CgroupController`] and the capability traits [`MemoryController`],
//!   [`CpuController`] and [`CpuacctController`] read controller files.
//!
//! # Controller Files
//!
//! | value | v1 | v2 |
//! |---|---|---|
//! | memory limit | `memory.limit_in_bytes` | `memory.max` |
//! | memory + swap limit | `memory.memsw.limit_in_bytes` | `memory.max` + `memory.swap.max` |
//! | soft limit | `memory.soft_limit_in_bytes` | `memory.low` |
//! | cpu quota / period | `cpu.cfs_quota_us` / `cpu.cfs_period_us` | `cpu.max` |
//! | cpu shares | `cpu.shares` | `cpu.weight` |
//! | cpu usage | `cpuacct.usage` | `cpu.stat` |
//!
//! A value that cannot be read is reported as unsupported for that call only;
//! the failure is logged at trace level.
mod cache;
mod controller;
mod error;
mod factory;
mod limit;
pub mod stats;
mod subsystem;
#[cfg(test)]
pub(crate) mod testutil;
mod util;
pub mod v1;
pub mod v2;

pub use cache::{CachedMetric, CachingController};
pub use controller::{
    CgroupController, CpuController, CpuacctController, MemoryController, TupleValue,
};
pub use error::{Error, Result};
pub use factory::{CgroupInfo, CgroupInfos, CgroupSubsystemFactory, ControllerKind, determine_type};
pub use limit::{Limit, OSCONTAINER_ERROR, UNLIMITED};
pub use subsystem::{CgroupSubsystem, CgroupVersion};
pub use util::{adjust_cpu_controller, adjust_memory_controller, processor_count};
