use std::fmt;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use super::OsContainer;
use crate::cgroup::Limit;

/// Point-in-time snapshot of every container metric.
///
/// All fields are `None`/[`Limit::Unsupported`] when no cgroup subsystem was
/// detected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerReport {
    pub containerized: bool,
    pub container_type: Option<&'static str>,
    pub cpu_cpuset_cpus: Option<String>,
    pub cpu_memory_nodes: Option<String>,
    pub active_processor_count: u32,
    pub active_processor_count_override: Option<u32>,
    pub cpu_quota: Limit,
    pub cpu_period: Option<u64>,
    pub cpu_shares: Limit,
    pub cpu_usage_in_micros: Option<u64>,
    pub memory_limit_in_bytes: Limit,
    pub memory_and_swap_limit_in_bytes: Limit,
    pub memory_soft_limit_in_bytes: Limit,
    pub memory_throttle_limit_in_bytes: Limit,
    pub memory_usage_in_bytes: Option<u64>,
    pub memory_max_usage_in_bytes: Option<u64>,
    pub rss_usage_in_bytes: Option<u64>,
    pub cache_usage_in_bytes: Option<u64>,
    #[serde(serialize_with = "serialize_labeled")]
    pub version_specific: Vec<(&'static str, Limit)>,
    pub maximum_tasks: Limit,
    pub current_tasks: Option<u64>,
}

fn serialize_labeled<S>(values: &[(&'static str, Limit)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(values.len()))?;
    for (label, limit) in values {
        map.serialize_entry(label, limit)?;
    }
    map.end()
}

impl ContainerReport {
    pub(super) fn collect(container: &OsContainer) -> Self {
        let sub = container.subsystem();
        Self {
            containerized: container.is_containerized(),
            container_type: container.container_type(),
            cpu_cpuset_cpus: sub.and_then(|s| s.cpu_cpuset_cpus()),
            cpu_memory_nodes: sub.and_then(|s| s.cpu_cpuset_memory_nodes()),
            active_processor_count: container.cgroup_processor_count(),
            active_processor_count_override: container.active_processor_count_override(),
            cpu_quota: sub.map_or(Limit::Unsupported, |s| s.cpu_quota()),
            cpu_period: sub.and_then(|s| s.cpu_period()),
            cpu_shares: sub.map_or(Limit::Unsupported, |s| s.cpu_shares()),
            cpu_usage_in_micros: sub.and_then(|s| s.cpu_usage_in_micros()),
            memory_limit_in_bytes: sub.map_or(Limit::Unsupported, |s| s.memory_limit_in_bytes()),
            memory_and_swap_limit_in_bytes: sub
                .map_or(Limit::Unsupported, |s| s.memory_and_swap_limit_in_bytes()),
            memory_soft_limit_in_bytes: sub
                .map_or(Limit::Unsupported, |s| s.memory_soft_limit_in_bytes()),
            memory_throttle_limit_in_bytes: sub
                .map_or(Limit::Unsupported, |s| s.memory_throttle_limit_in_bytes()),
            memory_usage_in_bytes: sub.and_then(|s| s.memory_usage_in_bytes()),
            memory_max_usage_in_bytes: sub.and_then(|s| s.memory_max_usage_in_bytes()),
            rss_usage_in_bytes: sub.and_then(|s| s.rss_usage_in_bytes()),
            cache_usage_in_bytes: sub.and_then(|s| s.cache_usage_in_bytes()),
            version_specific: sub.map(|s| s.version_specific_info()).unwrap_or_default(),
            maximum_tasks: sub.map_or(Limit::Unsupported, |s| s.pids_max()),
            current_tasks: sub.and_then(|s| s.pids_current()),
        }
    }
}

/// Formats a byte count: `N k` from one KiB upwards, plain bytes below.
struct Bytes(Limit);

impl fmt::Display for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Limit::Limited(bytes) if bytes >= 1024 => write!(f, "{} k", bytes / 1024),
            Limit::Limited(bytes) => write!(f, "{bytes}"),
            other => write!(f, "{other}"),
        }
    }
}

fn usage(value: Option<u64>) -> Bytes {
    Bytes(value.map_or(Limit::Unsupported, Limit::Limited))
}

impl fmt::Display for ContainerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "container (cgroup) information:")?;
        let Some(container_type) = self.container_type.filter(|_| self.containerized) else {
            return writeln!(f, "container information not found.");
        };
        writeln!(f, "container_type: {container_type}")?;

        let not_supported = || "not supported".to_owned();
        writeln!(
            f,
            "cpu_cpuset_cpus: {}",
            self.cpu_cpuset_cpus.clone().unwrap_or_else(not_supported)
        )?;
        writeln!(
            f,
            "cpu_memory_nodes: {}",
            self.cpu_memory_nodes.clone().unwrap_or_else(not_supported)
        )?;

        write!(f, "active_processor_count: ")?;
        match self.active_processor_count_override {
            Some(count) => writeln!(f, "{}, but overridden by {count}", self.active_processor_count)?,
            None => writeln!(f, "{}", self.active_processor_count)?,
        }

        match self.cpu_quota {
            Limit::Unlimited => writeln!(f, "cpu_quota: no quota")?,
            quota => writeln!(f, "cpu_quota: {quota}")?,
        }
        match self.cpu_period {
            Some(period) => writeln!(f, "cpu_period: {period}")?,
            None => writeln!(f, "cpu_period: no period")?,
        }
        match self.cpu_shares {
            Limit::Unlimited => writeln!(f, "cpu_shares: no shares")?,
            shares => writeln!(f, "cpu_shares: {shares}")?,
        }
        match self.cpu_usage_in_micros {
            Some(usage) => writeln!(f, "cpu_usage: {usage}")?,
            None => writeln!(f, "cpu_usage: not supported")?,
        }

        writeln!(f, "memory_limit_in_bytes: {}", Bytes(self.memory_limit_in_bytes))?;
        writeln!(
            f,
            "memory_and_swap_limit_in_bytes: {}",
            Bytes(self.memory_and_swap_limit_in_bytes)
        )?;
        writeln!(
            f,
            "memory_soft_limit_in_bytes: {}",
            Bytes(self.memory_soft_limit_in_bytes)
        )?;
        writeln!(
            f,
            "memory_throttle_limit_in_bytes: {}",
            Bytes(self.memory_throttle_limit_in_bytes)
        )?;
        writeln!(f, "memory_usage_in_bytes: {}", usage(self.memory_usage_in_bytes))?;
        writeln!(
            f,
            "memory_max_usage_in_bytes: {}",
            usage(self.memory_max_usage_in_bytes)
        )?;
        writeln!(f, "rss_usage_in_bytes: {}", usage(self.rss_usage_in_bytes))?;
        writeln!(f, "cache_usage_in_bytes: {}", usage(self.cache_usage_in_bytes))?;
        for (label, value) in &self.version_specific {
            writeln!(f, "{label}: {}", Bytes(*value))?;
        }

        writeln!(f, "maximum number of tasks: {}", self.maximum_tasks)?;
        match self.current_tasks {
            Some(current) => writeln!(f, "current number of tasks: {current}"),
            None => writeln!(f, "current number of tasks: not supported"),
        }
    }
}
