//! Runtime configuration for container detection.
//!
//! Everything can be set through environment variables, so that the library, the
//! `cgroup-limits` binary and the C boundary all pick up the same settings.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Time a cached memory limit or processor count stays valid.
pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_millis(20);

/// Locations of the kernel files consulted during detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupPaths {
    /// Where the cgroup filesystem(s) are mounted, usually `/sys/fs/cgroup`.
    pub cgroup_root: PathBuf,
    /// Controller table of cgroup v1 systems.
    pub proc_cgroups: PathBuf,
    /// Cgroup membership of the current process.
    pub proc_self_cgroup: PathBuf,
    /// Mount table of the current process.
    pub proc_self_mountinfo: PathBuf,
}

impl CgroupPaths {
    /// The list of enabled controllers on a unified hierarchy.
    pub fn controllers_file(&self) -> PathBuf {
        self.cgroup_root.join("cgroup.controllers")
    }
}

impl Default for CgroupPaths {
    fn default() -> Self {
        Self {
            cgroup_root: PathBuf::from("/sys/fs/cgroup"),
            proc_cgroups: PathBuf::from("/proc/cgroups"),
            proc_self_cgroup: PathBuf::from("/proc/self/cgroup"),
            proc_self_mountinfo: PathBuf::from("/proc/self/mountinfo"),
        }
    }
}

/// Settings controlling [`crate::container::OsContainer::init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerConfig {
    /// If `false`, no cgroup detection is attempted at all.
    pub use_container_support: bool,
    /// Overrides every computed processor count when set.
    pub active_processor_count: Option<u32>,
    /// How long the memory limit and processor count are cached.
    pub cache_timeout: Duration,
    pub paths: CgroupPaths,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            use_container_support: true,
            active_processor_count: None,
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
            paths: CgroupPaths::default(),
        }
    }
}

impl ContainerConfig {
    /// Builds the configuration from the process environment.
    ///
    /// Recognized variables:
    ///
    /// - `USE_CONTAINER_SUPPORT` (`true`/`false`/`1`/`0`)
    /// - `ACTIVE_PROCESSOR_COUNT` (positive integer)
    /// - `CONTAINER_CACHE_TIMEOUT_MS` (milliseconds)
    /// - `CGROUP_MOUNT_ROOT` (path, default `/sys/fs/cgroup`)
    ///
    /// Unparsable values are logged and replaced by their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup("USE_CONTAINER_SUPPORT") {
            match parse_flag(&raw) {
                Some(flag) => config.use_container_support = flag,
                None => log::warn!("Ignoring invalid USE_CONTAINER_SUPPORT value `{raw}`"),
            }
        }

        if let Some(raw) = lookup("ACTIVE_PROCESSOR_COUNT") {
            match parse_value::<u32>(&raw) {
                Some(count) if count > 0 => config.active_processor_count = Some(count),
                _ => log::warn!("Ignoring invalid ACTIVE_PROCESSOR_COUNT value `{raw}`"),
            }
        }

        if let Some(raw) = lookup("CONTAINER_CACHE_TIMEOUT_MS") {
            match parse_value::<u64>(&raw) {
                Some(millis) => config.cache_timeout = Duration::from_millis(millis),
                None => log::warn!("Ignoring invalid CONTAINER_CACHE_TIMEOUT_MS value `{raw}`"),
            }
        }

        if let Some(root) = lookup("CGROUP_MOUNT_ROOT") {
            config.paths.cgroup_root = PathBuf::from(root);
        }

        config
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_value<T: FromStr>(raw: &str) -> Option<T> {
    raw.trim().parse::<T>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> ContainerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ContainerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = config_from(&[]);
        assert_eq!(config, ContainerConfig::default());
        assert!(config.use_container_support);
        assert_eq!(config.cache_timeout, Duration::from_millis(20));
        assert_eq!(
            config.paths.controllers_file(),
            PathBuf::from("/sys/fs/cgroup/cgroup.controllers")
        );
    }

    #[test]
    fn test_all_variables_set() {
        let config = config_from(&[
            ("USE_CONTAINER_SUPPORT", "false"),
            ("ACTIVE_PROCESSOR_COUNT", "3"),
            ("CONTAINER_CACHE_TIMEOUT_MS", "250"),
            ("CGROUP_MOUNT_ROOT", "/rootfs/sys/fs/cgroup"),
        ]);
        assert!(!config.use_container_support);
        assert_eq!(config.active_processor_count, Some(3));
        assert_eq!(config.cache_timeout, Duration::from_millis(250));
        assert_eq!(
            config.paths.cgroup_root,
            PathBuf::from("/rootfs/sys/fs/cgroup")
        );
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let config = config_from(&[
            ("USE_CONTAINER_SUPPORT", "maybe"),
            ("ACTIVE_PROCESSOR_COUNT", "0"),
            ("CONTAINER_CACHE_TIMEOUT_MS", "-5"),
        ]);
        assert!(config.use_container_support);
        assert_eq!(config.active_processor_count, None);
        assert_eq!(config.cache_timeout, DEFAULT_CACHE_TIMEOUT);
    }
}
