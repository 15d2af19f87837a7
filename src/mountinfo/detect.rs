use crate::fsutil;

use super::parser::{MountInfo, parse_mount_info_line};
use super::{Error, Result};
use std::io::BufRead;
use std::path::Path;

/// Calls `visit` for every well-formed line of a Linux `mountinfo` file.
///
/// Lines that do not follow the mountinfo grammar are logged at trace level and
/// skipped, so a single odd entry never hides the cgroup mounts.
///
/// # Arguments
///
/// * `path` - Path to a Linux mountinfo file (e.g., `/proc/self/mountinfo`).
/// * `visit` - Callback receiving each parsed line.
///
/// # Errors
///
/// - [`Error::FileOpen`] if the file can't be opened.
/// - [`Error::Read`] if reading from the file fails.
///
/// # Example
///
/// ```no_run
/// use cgroup_limits::mountinfo::visit_mount_infos;
///
/// visit_mount_infos("/proc/self/mountinfo", |mount| {
///     if mount.fs_type == "cgroup2" {
///         println!("cgroup2 mounted at {}", mount.mount_point);
///     }
/// })
/// .unwrap();
/// ```
pub fn visit_mount_infos(
    path: impl AsRef<Path>,
    visit: impl FnMut(&MountInfo<'_>),
) -> Result<()> {
    let path = path.as_ref();
    let buf = fsutil::open_file_reader(path)?;

    visit_mount_infos_from_reader(buf, path, visit)
}

/// Internal implementation iterating the mountinfo lines of a reader.
///
/// # Arguments
///
/// * `reader` - Buffered reader over the mountinfo content.
/// * `origin` - Logical origin of the data, used in error messages.
/// * `visit` - Callback receiving each parsed line.
///
/// # Errors
///
/// - [`Error::Read`] if reading a line fails.
fn visit_mount_infos_from_reader<R: BufRead>(
    mut reader: R,
    origin: &Path,
    mut visit: impl FnMut(&MountInfo<'_>),
) -> Result<()> {
    let mut line = String::with_capacity(256);

    while reader
        .read_line(&mut line)
        .map_err(|source| Error::Read {
            path: origin.to_path_buf(),
            source,
        })?
        != 0
    {
        match parse_mount_info_line(line.as_str()) {
            Ok(mount_info) => visit(&mount_info),
            Err(err) => log::trace!("Skipping line of `{}`: {}", origin.display(), err),
        }

        line.clear();
    }

    Ok(())
}
