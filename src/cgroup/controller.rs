//! Access to cgroup controller interface files.
//!
//! [`CgroupController`] knows where a controller's files live and how to read
//! the value formats the kernel uses. The capability traits
//! ([`MemoryController`], [`CpuController`], [`CpuacctController`]) turn those
//! raw values into limits and usages; one implementation exists per cgroup
//! generation.

use std::fmt;
use std::path::{Path, PathBuf};

use super::limit::Limit;
use super::stats::KeyValueStat;
use super::{Error, Result};
use crate::fsutil;

/// Which value of a two-value file such as `cpu.max` to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TupleValue {
    First,
    Second,
}

/// A mounted cgroup controller as seen by the current process.
pub trait CgroupController: fmt::Debug + Send + Sync {
    /// Absolute directory holding the controller's interface files.
    fn subsystem_path(&self) -> &Path;

    /// Cgroup path the subsystem path was derived from, relative to the mount.
    fn cgroup_path(&self) -> &str;

    fn mount_point(&self) -> &Path;

    /// Whether the controller's filesystem is mounted read-only.
    fn is_read_only(&self) -> bool;

    /// Re-points the controller at `cgroup_path` and recomputes the subsystem path.
    fn set_subsystem_path(&mut self, cgroup_path: &str);

    /// Whether the process cgroup is nested below the mount root, so that an
    /// ancestor might hold a tighter limit.
    fn needs_hierarchy_adjustment(&self) -> bool;

    /// Reads the first line of `file`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileOpen`] or [`Error::Read`] if the file is missing or
    /// unreadable.
    fn read_string(&self, file: &str) -> Result<String> {
        let path = self.subsystem_path().join(file);
        let mut reader = fsutil::open_file_reader(&path)?;
        fsutil::read_first_line(&mut reader).map_err(|source| Error::Read { path, source })
    }

    /// Reads `file` as a single unsigned number.
    ///
    /// # Errors
    ///
    /// Fails like [`CgroupController::read_string`], with [`Error::Empty`] for
    /// an empty file and [`Error::InvalidNumber`] for anything else that is
    /// not a number.
    fn read_number(&self, file: &str) -> Result<u64> {
        let value = self.read_string(file)?;
        parse_number(self.subsystem_path().join(file), value.trim())
    }

    /// Reads `file` as a single signed number, such as `cpu.cfs_quota_us`.
    ///
    /// # Errors
    ///
    /// See [`CgroupController::read_number`].
    fn read_signed_number(&self, file: &str) -> Result<i64> {
        let value = self.read_string(file)?;
        let value = value.trim();
        let path = self.subsystem_path().join(file);
        if value.is_empty() {
            return Err(Error::Empty { path });
        }
        value.parse::<i64>().map_err(|_| Error::InvalidNumber {
            path,
            value: value.to_owned(),
        })
    }

    /// Reads a file holding either a number or the literal `max`.
    ///
    /// # Errors
    ///
    /// See [`CgroupController::read_number`].
    fn read_number_handle_max(&self, file: &str) -> Result<Limit> {
        let value = self.read_string(file)?;
        parse_limit(self.subsystem_path().join(file), value.trim())
    }

    /// Reads one value of a whitespace-separated pair such as `max 100000`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Empty`] if the requested value is absent, otherwise see
    /// [`CgroupController::read_number`].
    fn read_tuple_value(&self, file: &str, which: TupleValue) -> Result<Limit> {
        let line = self.read_string(file)?;
        let mut tokens = line.split_whitespace();
        let token = match which {
            TupleValue::First => tokens.next(),
            TupleValue::Second => tokens.nth(1),
        };
        let path = self.subsystem_path().join(file);
        match token {
            Some(token) => parse_limit(path, token),
            None => Err(Error::Empty { path }),
        }
    }

    /// Parses a `key value` stat file into `S`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileOpen`] if the file is missing and [`Error::Stat`]
    /// if it is malformed.
    fn read_stat<S: KeyValueStat>(&self, file: &str) -> Result<S>
    where
        Self: Sized,
    {
        let path = self.subsystem_path().join(file);
        let mut reader = fsutil::open_file_reader(&path)?;
        S::from_reader(&mut reader).map_err(|source| Error::Stat { path, source })
    }
}

fn parse_number(path: PathBuf, value: &str) -> Result<u64> {
    if value.is_empty() {
        return Err(Error::Empty { path });
    }
    value.parse::<u64>().map_err(|_| Error::InvalidNumber {
        path,
        value: value.to_owned(),
    })
}

fn parse_limit(path: PathBuf, value: &str) -> Result<Limit> {
    if value == "max" {
        return Ok(Limit::Unlimited);
    }
    parse_number(path, value).map(Limit::Limited)
}

/// Appends `cgroup_path` to `mount_point`; `/` contributes nothing.
pub(crate) fn join_cgroup_path(mount_point: &Path, cgroup_path: &str) -> PathBuf {
    let relative = cgroup_path.trim_start_matches('/');
    if relative.is_empty() {
        mount_point.to_path_buf()
    } else {
        mount_point.join(relative)
    }
}

/// Memory limits and usage of a cgroup.
///
/// `phys_mem` and `host_swap` are the host capacities in bytes; any configured
/// value at or above them is reported as [`Limit::Unlimited`].
pub trait MemoryController: fmt::Debug + Send + Sync {
    fn controller(&self) -> &dyn CgroupController;

    fn controller_mut(&mut self) -> &mut dyn CgroupController;

    fn read_memory_limit_in_bytes(&self, phys_mem: u64) -> Limit;

    fn memory_and_swap_limit_in_bytes(&self, phys_mem: u64, host_swap: u64) -> Limit;

    fn memory_and_swap_usage_in_bytes(&self, phys_mem: u64, host_swap: u64) -> Option<u64>;

    fn memory_soft_limit_in_bytes(&self, phys_mem: u64) -> Limit;

    /// Usage level above which the kernel starts throttling allocations.
    fn memory_throttle_limit_in_bytes(&self) -> Limit;

    fn memory_usage_in_bytes(&self) -> Option<u64>;

    /// Peak usage; not tracked by every cgroup generation.
    fn memory_max_usage_in_bytes(&self) -> Option<u64>;

    fn rss_usage_in_bytes(&self) -> Option<u64>;

    fn cache_usage_in_bytes(&self) -> Option<u64>;

    /// Metrics only one cgroup generation provides, as `(label, value)` pairs.
    fn version_specific_info(&self, phys_mem: u64) -> Vec<(&'static str, Limit)>;

    fn needs_hierarchy_adjustment(&self) -> bool {
        self.controller().needs_hierarchy_adjustment()
    }

    fn is_read_only(&self) -> bool {
        self.controller().is_read_only()
    }
}

/// CPU bandwidth settings of a cgroup.
pub trait CpuController: fmt::Debug + Send + Sync {
    fn controller(&self) -> &dyn CgroupController;

    fn controller_mut(&mut self) -> &mut dyn CgroupController;

    /// CFS quota in microseconds per period; [`Limit::Unlimited`] without quota.
    fn cpu_quota(&self) -> Limit;

    /// CFS period in microseconds.
    fn cpu_period(&self) -> Option<u64>;

    /// Relative CPU weight in v1 shares; [`Limit::Unlimited`] if none is set.
    fn cpu_shares(&self) -> Limit;

    fn needs_hierarchy_adjustment(&self) -> bool {
        self.controller().needs_hierarchy_adjustment()
    }

    fn is_read_only(&self) -> bool {
        self.controller().is_read_only()
    }
}

/// CPU time accounting of a cgroup.
pub trait CpuacctController: fmt::Debug + Send + Sync {
    fn controller(&self) -> &dyn CgroupController;

    /// Total CPU time consumed by the cgroup in microseconds.
    fn cpu_usage_in_micros(&self) -> Option<u64>;

    fn is_read_only(&self) -> bool {
        self.controller().is_read_only()
    }
}
