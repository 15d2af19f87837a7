use std::path::Path;

use crate::config::CgroupPaths;
use crate::host::HostResources;

pub const GIB: u64 = 1 << 30;
pub const MIB: u64 = 1 << 20;

/// Host with fixed resources.
#[derive(Debug, Clone, Copy)]
pub struct FixedHost {
    pub physical_memory: u64,
    pub available_memory: u64,
    pub total_swap: u64,
    pub free_swap: u64,
    pub cpus: u32,
}

impl Default for FixedHost {
    fn default() -> Self {
        Self {
            physical_memory: 8 * GIB,
            available_memory: 6 * GIB,
            total_swap: 2 * GIB,
            free_swap: GIB,
            cpus: 8,
        }
    }
}

impl HostResources for FixedHost {
    fn physical_memory(&self) -> u64 {
        self.physical_memory
    }

    fn available_memory(&self) -> u64 {
        self.available_memory
    }

    fn total_swap(&self) -> u64 {
        self.total_swap
    }

    fn free_swap(&self) -> u64 {
        self.free_swap
    }

    fn active_processor_count(&self) -> u32 {
        self.cpus
    }
}

/// Writes `contents` to `dir/name`, creating missing parent directories.
pub fn write_file(dir: &Path, name: &str, contents: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

/// Lays out a cgroup v1 system below `dir`: the process sits in the root cgroup
/// of separate cpuset, cpu+cpuacct and memory hierarchies mounted with
/// `mount_options` under `<dir>/sys/fs/cgroup`.
pub fn write_v1_system(dir: &Path, mount_options: &str) -> CgroupPaths {
    let paths = CgroupPaths {
        cgroup_root: dir.join("sys/fs/cgroup"),
        proc_cgroups: dir.join("proc/cgroups"),
        proc_self_cgroup: dir.join("proc/self/cgroup"),
        proc_self_mountinfo: dir.join("proc/self/mountinfo"),
    };
    write_file(
        dir,
        "proc/cgroups",
        "#subsys_name\thierarchy\tnum_cgroups\tenabled\ncpuset\t3\t1\t1\ncpu\t2\t1\t1\ncpuacct\t2\t1\t1\nmemory\t1\t1\t1\n",
    );
    write_file(dir, "proc/self/cgroup", "3:cpuset:/\n2:cpu,cpuacct:/\n1:memory:/\n");

    let mut mountinfo = String::new();
    for (mount, controllers) in [
        ("cpuset", "cpuset"),
        ("cpu,cpuacct", "cpu,cpuacct"),
        ("memory", "memory"),
    ] {
        let mount_point = paths.cgroup_root.join(mount);
        std::fs::create_dir_all(&mount_point).unwrap();
        mountinfo.push_str(&format!(
            "30 25 0:27 / {} {mount_options},nosuid,nodev,noexec,relatime - cgroup cgroup rw,{controllers}\n",
            mount_point.display()
        ));
    }
    write_file(dir, "proc/self/mountinfo", &mountinfo);
    paths
}
