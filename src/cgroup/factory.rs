//! Detection of the cgroup setup of the current process.
//!
//! Detection reads, in order:
//!
//! 1. `statfs` of the cgroup root to tell cgroup v2 (unified) from v1.
//! 2. `cgroup.controllers` (v2) or `/proc/cgroups` (v1) for enabled controllers.
//! 3. `/proc/self/cgroup` for the cgroup path of each controller.
//! 4. `/proc/self/mountinfo` for where each controller is mounted.
//!
//! The result is a [`CgroupSubsystem`] with its memory and cpu controllers
//! already pointed at the most restrictive cgroup of their hierarchy.

use std::io::BufRead;
use std::ops::{Index, IndexMut};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::cache::CachingController;
use super::controller::CgroupController;
use super::subsystem::{CgroupSubsystem, CgroupVersion};
use super::util;
use super::v1::{
    CgroupV1Controller, CgroupV1CpuController, CgroupV1CpuacctController, CgroupV1MemoryController,
};
use super::v2::{
    CgroupV2Controller, CgroupV2CpuController, CgroupV2CpuacctController, CgroupV2MemoryController,
};
use super::{Error, Result};
use crate::config::CgroupPaths;
use crate::fsutil::{self, CGROUP2_SUPER_MAGIC};
use crate::host::HostResources;
use crate::mountinfo;

/// The controllers detection cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerKind {
    Cpuset,
    Cpu,
    Cpuacct,
    Memory,
    Pids,
}

impl ControllerKind {
    pub const ALL: [ControllerKind; 5] = [
        ControllerKind::Cpuset,
        ControllerKind::Cpu,
        ControllerKind::Cpuacct,
        ControllerKind::Memory,
        ControllerKind::Pids,
    ];

    /// Kernel name of the controller.
    pub fn name(self) -> &'static str {
        match self {
            ControllerKind::Cpuset => "cpuset",
            ControllerKind::Cpu => "cpu",
            ControllerKind::Cpuacct => "cpuacct",
            ControllerKind::Memory => "memory",
            ControllerKind::Pids => "pids",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Whether detection fails without this controller.
    fn is_required(self, unified: bool) -> bool {
        match self {
            ControllerKind::Cpu | ControllerKind::Memory => true,
            ControllerKind::Cpuset | ControllerKind::Cpuacct => !unified,
            ControllerKind::Pids => false,
        }
    }
}

/// What detection learned about one controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CgroupInfo {
    pub name: &'static str,
    /// Hierarchy id from `/proc/cgroups` (v1 only).
    pub hierarchy_id: Option<u32>,
    pub enabled: bool,
    pub read_only: bool,
    /// Both the cgroup path and the mount point are known.
    pub data_complete: bool,
    /// Path from `/proc/self/cgroup`.
    pub cgroup_path: Option<String>,
    /// Root of the mount within the hierarchy (mountinfo field 4).
    pub root_mount_path: Option<String>,
    /// Mount point from `/proc/self/mountinfo`.
    pub mount_path: Option<PathBuf>,
}

/// One [`CgroupInfo`] per [`ControllerKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupInfos([CgroupInfo; 5]);

impl CgroupInfos {
    fn new() -> Self {
        Self(ControllerKind::ALL.map(|kind| CgroupInfo {
            name: kind.name(),
            ..CgroupInfo::default()
        }))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ControllerKind, &CgroupInfo)> {
        ControllerKind::ALL.into_iter().zip(self.0.iter())
    }

    fn for_each_mut(&mut self, mut f: impl FnMut(&mut CgroupInfo)) {
        for info in &mut self.0 {
            f(info);
        }
    }
}

impl Index<ControllerKind> for CgroupInfos {
    type Output = CgroupInfo;

    fn index(&self, kind: ControllerKind) -> &CgroupInfo {
        &self.0[kind as usize]
    }
}

impl IndexMut<ControllerKind> for CgroupInfos {
    fn index_mut(&mut self, kind: ControllerKind) -> &mut CgroupInfo {
        &mut self.0[kind as usize]
    }
}

/// Collects enabled controllers, cgroup paths and mounts.
///
/// # Errors
///
/// Fails if a required controller is not enabled, not mounted, or has no
/// cgroup path, and if any of the consulted files cannot be read.
pub fn determine_type(paths: &CgroupPaths, unified: bool) -> Result<CgroupInfos> {
    let mut infos = CgroupInfos::new();

    if unified {
        read_unified_controllers(&paths.controllers_file(), &mut infos)?;
    } else {
        read_proc_cgroups(&paths.proc_cgroups, &mut infos)?;
    }

    for (kind, info) in infos.iter() {
        if info.enabled {
            continue;
        }
        if kind.is_required(unified) {
            log::debug!("Required cgroup {} controller not enabled", kind.name());
            return Err(Error::ControllerNotEnabled(kind.name()));
        }
        log::debug!("Optional cgroup {} controller not enabled", kind.name());
    }

    read_proc_self_cgroup(&paths.proc_self_cgroup, &mut infos, unified)?;

    let any_mounts = read_mount_points(paths, &mut infos, unified)?;
    if !any_mounts {
        if unified {
            log::debug!("Mount point for cgroupv2 not found in /proc/self/mountinfo");
            return Err(Error::Cgroup2NotMounted);
        }
        log::debug!("No relevant cgroup controllers mounted");
        return Err(Error::NoCgroupMounts);
    }

    infos.for_each_mut(|info| {
        info.data_complete = info.cgroup_path.is_some() && info.mount_path.is_some();
    });

    for (kind, info) in infos.iter() {
        if kind.is_required(unified) && !info.data_complete {
            log::debug!("Required cgroup {} controller incomplete", kind.name());
            return Err(Error::IncompleteController(kind.name()));
        }
    }

    Ok(infos)
}

fn read_lines(path: &Path, mut on_line: impl FnMut(&str)) -> Result<()> {
    let mut reader = fsutil::open_file_reader(path)?;
    let mut line = String::with_capacity(128);
    while reader
        .read_line(&mut line)
        .map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?
        != 0
    {
        on_line(line.trim_end_matches('\n'));
        line.clear();
    }
    Ok(())
}

/// Marks the controllers listed in the unified `cgroup.controllers` as enabled.
fn read_unified_controllers(path: &Path, infos: &mut CgroupInfos) -> Result<()> {
    read_lines(path, |line| {
        for name in line.split_whitespace() {
            if let Some(kind) = ControllerKind::from_name(name) {
                infos[kind].enabled = true;
            }
        }
    })
}

/// Reads `/proc/cgroups`: `subsys_name hierarchy num_cgroups enabled`.
fn read_proc_cgroups(path: &Path, infos: &mut CgroupInfos) -> Result<()> {
    read_lines(path, |line| {
        if line.starts_with('#') {
            return;
        }
        let mut fields = line.split_whitespace();
        let (Some(name), Some(hierarchy_id), Some(_num_cgroups), Some(enabled)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            log::trace!("Skipping malformed /proc/cgroups line `{line}`");
            return;
        };
        let Some(kind) = ControllerKind::from_name(name) else {
            return;
        };
        let (Ok(hierarchy_id), Ok(enabled)) = (hierarchy_id.parse::<u32>(), enabled.parse::<u32>())
        else {
            log::trace!("Skipping malformed /proc/cgroups line `{line}`");
            return;
        };
        let info = &mut infos[kind];
        info.hierarchy_id = Some(hierarchy_id);
        info.enabled = enabled == 1;
    })
}

/// Replaces cgroup paths escaping the mount with `/`.
fn sanitize_cgroup_path(path: &str) -> &str {
    if path.contains("../") {
        log::warn!("Cgroup path `{path}` escapes the cgroup mount, using `/` instead");
        "/"
    } else {
        path
    }
}

/// Reads `/proc/self/cgroup`: `hierarchy-id:controller-list:cgroup-path`.
fn read_proc_self_cgroup(path: &Path, infos: &mut CgroupInfos, unified: bool) -> Result<()> {
    read_lines(path, |line| {
        let mut fields = line.splitn(3, ':');
        let (Some(hierarchy_id), Some(controllers), Some(cgroup_path)) =
            (fields.next(), fields.next(), fields.next())
        else {
            log::trace!("Skipping malformed /proc/self/cgroup line `{line}`");
            return;
        };
        let Ok(hierarchy_id) = hierarchy_id.parse::<u32>() else {
            log::trace!("Skipping malformed /proc/self/cgroup line `{line}`");
            return;
        };
        let cgroup_path = sanitize_cgroup_path(cgroup_path);

        if unified {
            if hierarchy_id == 0 {
                infos.for_each_mut(|info| info.cgroup_path = Some(cgroup_path.to_owned()));
            }
            return;
        }

        // The id 0 line describes a hybrid unified hierarchy.
        if hierarchy_id == 0 {
            return;
        }
        for name in controllers.split(',') {
            let Some(kind) = ControllerKind::from_name(name) else {
                continue;
            };
            let info = &mut infos[kind];
            if info.hierarchy_id != Some(hierarchy_id) {
                log::debug!(
                    "Hierarchy id {hierarchy_id} of {name} in /proc/self/cgroup does not match /proc/cgroups ({:?})",
                    info.hierarchy_id
                );
            }
            info.cgroup_path = Some(cgroup_path.to_owned());
        }
    })
}

/// Records the mount of `info`, preferring mounts below `preferred_root` when
/// a controller is mounted more than once.
fn set_controller_paths(
    info: &mut CgroupInfo,
    mount_point: &str,
    root: &str,
    read_only: bool,
    preferred_root: &Path,
) {
    if let Some(existing) = &info.mount_path {
        let keep_existing =
            existing.starts_with(preferred_root) || !Path::new(mount_point).starts_with(preferred_root);
        let (picked, skipped) = if keep_existing {
            (existing.display().to_string(), mount_point.to_owned())
        } else {
            (mount_point.to_owned(), existing.display().to_string())
        };
        log::debug!(
            "Duplicate {} controllers detected. Picking {picked}, skipping {skipped}.",
            info.name
        );
        if keep_existing {
            return;
        }
    }
    info.mount_path = Some(PathBuf::from(mount_point));
    info.root_mount_path = Some(root.to_owned());
    info.read_only = read_only;
}

/// Scans mountinfo for cgroup mounts; returns whether any relevant one was found.
fn read_mount_points(paths: &CgroupPaths, infos: &mut CgroupInfos, unified: bool) -> Result<bool> {
    let mut found = false;
    mountinfo::visit_mount_infos(&paths.proc_self_mountinfo, |mount| {
        match mount.fs_type {
            "cgroup2" if unified => {
                if found {
                    log::debug!(
                        "Ignoring additional cgroup2 mount at {}",
                        mount.mount_point
                    );
                    return;
                }
                found = true;
                infos.for_each_mut(|info| {
                    info.mount_path = Some(PathBuf::from(&*mount.mount_point));
                    info.root_mount_path = Some(mount.root.to_string());
                    info.read_only = mount.is_read_only();
                });
            }
            "cgroup" if !unified => {
                for name in mount.super_option_names() {
                    let Some(kind) = ControllerKind::from_name(name) else {
                        continue;
                    };
                    found = true;
                    set_controller_paths(
                        &mut infos[kind],
                        &mount.mount_point,
                        &mount.root,
                        mount.is_read_only(),
                        &paths.cgroup_root,
                    );
                }
            }
            _ => {}
        }
    })?;
    Ok(found)
}

/// Builds the [`CgroupSubsystem`] of the current process.
#[derive(Debug, Clone)]
pub struct CgroupSubsystemFactory {
    paths: CgroupPaths,
    host: Arc<dyn HostResources>,
    cache_timeout: Duration,
}

impl CgroupSubsystemFactory {
    pub fn new(paths: CgroupPaths, host: Arc<dyn HostResources>, cache_timeout: Duration) -> Self {
        Self {
            paths,
            host,
            cache_timeout,
        }
    }

    /// Detects the cgroup version and builds the matching subsystem.
    ///
    /// # Errors
    ///
    /// Returns an error if the cgroup root cannot be inspected or if detection
    /// fails, see [`determine_type`].
    pub fn create(&self) -> Result<CgroupSubsystem> {
        let root = &self.paths.cgroup_root;
        let magic = fsutil::filesystem_magic(root).map_err(|source| Error::Io {
            path: root.clone(),
            source,
        })?;
        let unified = magic == CGROUP2_SUPER_MAGIC;
        log::debug!(
            "Detected cgroup {} filesystem at {}",
            if unified { "v2" } else { "v1" },
            root.display()
        );
        self.create_for(unified)
    }

    /// Builds the subsystem for a known cgroup version.
    pub(crate) fn create_for(&self, unified: bool) -> Result<CgroupSubsystem> {
        let infos = determine_type(&self.paths, unified)?;
        for (_, info) in infos.iter() {
            log::debug!(
                "Controller {}: enabled={} read_only={} cgroup_path={:?} mount_path={:?}",
                info.name,
                info.enabled,
                info.read_only,
                info.cgroup_path,
                info.mount_path
            );
        }
        if unified {
            self.create_v2(&infos)
        } else {
            self.create_v1(&infos)
        }
    }

    fn create_v1(&self, infos: &CgroupInfos) -> Result<CgroupSubsystem> {
        let mut memory = CgroupV1MemoryController::new(v1_controller(&infos[ControllerKind::Memory])?);
        util::adjust_memory_controller(&mut memory, self.host.physical_memory());

        let mut cpu = CgroupV1CpuController::new(v1_controller(&infos[ControllerKind::Cpu])?);
        util::adjust_cpu_controller(&mut cpu, self.host.active_processor_count());

        let cpuacct = CgroupV1CpuacctController::new(v1_controller(&infos[ControllerKind::Cpuacct])?);
        let cpuset = v1_controller(&infos[ControllerKind::Cpuset])?;

        let pids_info = &infos[ControllerKind::Pids];
        let pids = if pids_info.enabled && pids_info.data_complete {
            Some(v1_controller(pids_info)?)
        } else {
            None
        };

        Ok(CgroupSubsystem {
            version: CgroupVersion::V1,
            memory: CachingController::new(Box::new(memory)),
            cpu: CachingController::new(Box::new(cpu)),
            cpuacct: Box::new(cpuacct),
            cpuset: Box::new(cpuset),
            pids: pids.map(|pids| Box::new(pids) as Box<dyn CgroupController>),
            host: Arc::clone(&self.host),
            cache_timeout: self.cache_timeout,
        })
    }

    fn create_v2(&self, infos: &CgroupInfos) -> Result<CgroupSubsystem> {
        let info = &infos[ControllerKind::Memory];
        let (Some(mount_path), Some(cgroup_path)) = (&info.mount_path, &info.cgroup_path) else {
            return Err(Error::IncompleteController(info.name));
        };
        let unified = CgroupV2Controller::new(mount_path.clone(), cgroup_path, info.read_only);

        let mut memory = CgroupV2MemoryController::new(unified.clone());
        util::adjust_memory_controller(&mut memory, self.host.physical_memory());

        let mut cpu = CgroupV2CpuController::new(unified.clone());
        util::adjust_cpu_controller(&mut cpu, self.host.active_processor_count());
        let cpuacct = CgroupV2CpuacctController::new(cpu.reader().clone());

        Ok(CgroupSubsystem {
            version: CgroupVersion::V2,
            memory: CachingController::new(Box::new(memory)),
            cpu: CachingController::new(Box::new(cpu)),
            cpuacct: Box::new(cpuacct),
            cpuset: Box::new(unified.clone()),
            pids: Some(Box::new(unified)),
            host: Arc::clone(&self.host),
            cache_timeout: self.cache_timeout,
        })
    }
}

fn v1_controller(info: &CgroupInfo) -> Result<CgroupV1Controller> {
    match (&info.root_mount_path, &info.mount_path, &info.cgroup_path) {
        (Some(root), Some(mount_path), Some(cgroup_path)) => Ok(CgroupV1Controller::new(
            root.clone(),
            mount_path.clone(),
            cgroup_path,
            info.read_only,
        )),
        _ => Err(Error::IncompleteController(info.name)),
    }
}
