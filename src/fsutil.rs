use std::ffi::CString;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Filesystem magic number of a cgroup v2 (unified) mount, see `statfs(2)`.
pub const CGROUP2_SUPER_MAGIC: i64 = 0x6367_7270;

/// Error that occurs when opening a file fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to open file `{path}`: {source}")]
pub struct FileOpenError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Opens a file at the given path and wraps it in a [`BufReader`].
///
/// # Errors
///
/// Returns a [`FileOpenError`] if the file cannot be opened.
///
/// # Example
/// ```no_run
/// # use cgroup_limits::fsutil;
/// let reader = fsutil::open_file_reader("/proc/self/cgroup")?;
/// # Ok::<(), fsutil::FileOpenError>(())
/// ```
pub fn open_file_reader(path: impl AsRef<Path>) -> Result<BufReader<File>, FileOpenError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| FileOpenError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Reads the first line of `reader` with the trailing newline removed.
///
/// Returns an empty string for empty input.
pub fn read_first_line<R: BufRead>(reader: &mut R) -> io::Result<String> {
    let mut line = String::with_capacity(64);
    reader.read_line(&mut line)?;
    let trimmed = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(trimmed);
    Ok(line)
}

/// Returns the filesystem magic (`f_type`) of the filesystem containing `path`.
///
/// # Errors
///
/// Returns the OS error reported by `statfs(2)`, or [`io::ErrorKind::InvalidInput`]
/// if the path contains an interior NUL byte.
pub fn filesystem_magic(path: impl AsRef<Path>) -> io::Result<i64> {
    let c_path = CString::new(path.as_ref().as_os_str().as_bytes())
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
    // SAFETY: `statfs` is plain old data, so the all-zero bit pattern is valid.
    let mut buf: libc::statfs = unsafe { std::mem::zeroed() };
    // SAFETY: `c_path` is a valid NUL-terminated string and `buf` is a valid,
    // writable `statfs` struct for the duration of the call.
    let rc = unsafe { libc::statfs(c_path.as_ptr(), &mut buf) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    #[allow(clippy::unnecessary_cast)]
    Ok(buf.f_type as i64)
}
