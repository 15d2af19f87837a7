use std::path::PathBuf;

use crate::cgroup::stats::StatParseError;
use crate::fsutil::FileOpenError;
use crate::mountinfo;

/// Errors of reading controller interface files and of detecting the cgroup setup.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    FileOpen(#[from] FileOpenError),

    #[error("failed to read `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("`{path}` is empty")]
    Empty { path: PathBuf },

    #[error("invalid number `{value}` in `{path}`")]
    InvalidNumber { path: PathBuf, value: String },

    #[error("key `{key}` not found in `{path}`")]
    MissingKey { path: PathBuf, key: &'static str },

    #[error("failed to parse `{path}`: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: StatParseError,
    },

    #[error(transparent)]
    MountInfo(#[from] mountinfo::Error),

    #[error("failed to inspect `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no cgroup2 filesystem found in mountinfo")]
    Cgroup2NotMounted,

    #[error("required cgroup controller `{0}` is not enabled")]
    ControllerNotEnabled(&'static str),

    #[error("cgroup controller `{0}` has no cgroup path or mount point")]
    IncompleteController(&'static str),

    #[error("no cgroup hierarchies found")]
    NoCgroupMounts,
}

pub type Result<T> = std::result::Result<T, Error>;
