//! Derived CPU counts and the upward walk to the tightest limit.
//!
//! A process cgroup is frequently nested below the cgroup its container runtime
//! configured, e.g. `/docker/<id>/init.scope`. The limit then sits on an
//! ancestor, so the memory and cpu controllers are re-pointed at the ancestor
//! holding the lowest value.

use super::controller::{CpuController, MemoryController};
use super::limit::Limit;

/// Number of processors the CFS quota of `cpu` allows, capped at `host_cpus`.
///
/// Without a quota (or with an unusable period) the host count is returned.
pub fn processor_count(cpu: &dyn CpuController, host_cpus: u32) -> u32 {
    let quota = cpu.cpu_quota();
    let period = cpu.cpu_period();

    let quota_count = match (quota, period) {
        (Limit::Limited(quota), Some(period)) if period > 0 => {
            let count = quota.div_ceil(period);
            log::trace!("CPU Quota count based on quota/period: {count}");
            u32::try_from(count).unwrap_or(u32::MAX)
        }
        _ => 0,
    };

    let limit_count = if quota_count == 0 {
        host_cpus
    } else {
        host_cpus.min(quota_count)
    };
    log::trace!("OSContainer::active_processor_count: {limit_count}");
    limit_count
}

/// Splits off the last component of `path`, returning `false` once only the
/// leading `/` (or nothing) is left.
fn strip_last_component(path: &mut String) -> bool {
    match path.rfind('/') {
        Some(idx) if idx > 0 => {
            path.truncate(idx);
            true
        }
        _ => false,
    }
}

/// Points `memory` at the cgroup in its hierarchy with the lowest memory limit.
pub fn adjust_memory_controller(memory: &mut dyn MemoryController, phys_mem: u64) {
    if !memory.needs_hierarchy_adjustment() {
        return;
    }
    let original = memory.controller().cgroup_path().to_owned();
    log::trace!("Adjusting controller path for memory: {original}");

    let limit_of = |memory: &dyn MemoryController| {
        memory
            .read_memory_limit_in_bytes(phys_mem)
            .limited()
            .unwrap_or(phys_mem)
    };
    let original_limit = limit_of(memory);
    let mut lowest_limit = original_limit;
    let mut lowest_path: Option<String> = None;

    let mut cgroup_path = original.clone();
    let mut more = strip_last_component(&mut cgroup_path);
    loop {
        let candidate = if more { cgroup_path.as_str() } else { "/" };
        memory.controller_mut().set_subsystem_path(candidate);
        let limit = limit_of(memory);
        if limit < lowest_limit {
            lowest_limit = limit;
            lowest_path = Some(candidate.to_owned());
        }
        if !more {
            break;
        }
        more = strip_last_component(&mut cgroup_path);
    }

    match lowest_path {
        Some(path) if lowest_limit != original_limit => {
            memory.controller_mut().set_subsystem_path(&path);
            log::trace!(
                "Adjusted controller path for memory to: {}. Lowest limit was: {lowest_limit}",
                memory.controller().subsystem_path().display()
            );
        }
        _ => {
            log::trace!(
                "No lower limit found for memory in hierarchy {}, adjusting to original path {original}",
                memory.controller().mount_point().display()
            );
            memory.controller_mut().set_subsystem_path(&original);
        }
    }
}

/// Points `cpu` at the cgroup in its hierarchy allowing the fewest processors.
pub fn adjust_cpu_controller(cpu: &mut dyn CpuController, host_cpus: u32) {
    if !cpu.needs_hierarchy_adjustment() {
        return;
    }
    let original = cpu.controller().cgroup_path().to_owned();
    log::trace!("Adjusting controller path for cpu: {original}");

    let original_count = processor_count(cpu, host_cpus);
    let mut lowest_count = original_count;
    let mut lowest_path: Option<String> = None;

    let mut cgroup_path = original.clone();
    let mut more = strip_last_component(&mut cgroup_path);
    loop {
        let candidate = if more { cgroup_path.as_str() } else { "/" };
        cpu.controller_mut().set_subsystem_path(candidate);
        let count = processor_count(cpu, host_cpus);
        if count < lowest_count {
            lowest_count = count;
            lowest_path = Some(candidate.to_owned());
        }
        if !more {
            break;
        }
        more = strip_last_component(&mut cgroup_path);
    }

    match lowest_path {
        Some(path) if lowest_count != original_count => {
            cpu.controller_mut().set_subsystem_path(&path);
            log::trace!(
                "Adjusted controller path for cpu to: {}. Lowest limit was: {lowest_count}",
                cpu.controller().subsystem_path().display()
            );
        }
        _ => {
            log::trace!(
                "No lower limit found for cpu in hierarchy {}, adjusting to original path {original}",
                cpu.controller().mount_point().display()
            );
            cpu.controller_mut().set_subsystem_path(&original);
        }
    }
}
