use std::path::PathBuf;

use crate::fsutil::FileOpenError;

/// Failure to read a mount table.
///
/// Malformed lines are not errors: they are skipped while visiting.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    FileOpen(#[from] FileOpenError),
    #[error("failed to read mount table `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
