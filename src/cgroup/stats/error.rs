//! Structured errors for parsing cgroup key-value stat files.
//!
//! # Example
//!
//! ```rust
//! use cgroup_limits::cgroup::stats::{CpuStat, KeyValueStat, StatParseError};
//!
//! let err = CpuStat::from_reader(&mut "usage_usec abc\n".as_bytes()).unwrap_err();
//! assert!(matches!(err, StatParseError::InvalidKeyValue { .. }));
//! ```

use std::num::ParseIntError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatParseError {
    #[error("duplicate field '{field}' at line {line}")]
    DuplicateField { field: String, line: usize },

    #[error("invalid value for '{key}' at line {line}: '{value}': {source}")]
    InvalidKeyValue {
        key: String,
        value: String,
        line: usize,
        #[source]
        source: ParseIntError,
    },

    #[error("error during I/O: {0}")]
    Io(#[from] std::io::Error),
}
