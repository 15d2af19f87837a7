//! Generic parsing of flat `key value` cgroup stat files.
//!
//! Files like `memory.stat` and `cpu.stat` list one key and one unsigned value per
//! line. Implementors of [`KeyValueStat`] declare the keys they care about as a
//! table of setters; every other key is ignored.
//!
//! # Example: Implementing `KeyValueStat`
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::sync::LazyLock;
//! use cgroup_limits::cgroup::stats::KeyValueStat;
//!
//! #[derive(Default)]
//! struct PidsEvents {
//!     max: Option<u64>,
//! }
//!
//! static SETTERS: LazyLock<HashMap<&'static str, fn(&mut PidsEvents, u64)>> =
//!     LazyLock::new(|| {
//!         let mut m: HashMap<&'static str, fn(&mut PidsEvents, u64)> = HashMap::new();
//!         m.insert("max", |s, v| s.max = Some(v));
//!         m
//!     });
//!
//! impl KeyValueStat for PidsEvents {
//!     const ALLOW_DUPLICATE_KEYS: bool = false;
//!
//!     fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
//!         &SETTERS
//!     }
//! }
//!
//! let events = PidsEvents::from_reader(&mut "max 3\n".as_bytes()).unwrap();
//! assert_eq!(events.max, Some(3));
//! ```

use std::collections::{HashMap, HashSet};
use std::io::BufRead;

use super::StatParseError;

/// A record populated from a whitespace-separated `key value` stat file.
pub trait KeyValueStat: Default
where
    Self: 'static,
{
    /// If `false`, a key appearing twice is reported as
    /// [`StatParseError::DuplicateField`], and parsing stops as soon as every
    /// known key has been seen.
    const ALLOW_DUPLICATE_KEYS: bool;

    /// Known keys and the setters applying their parsed values.
    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)>;

    /// Parses the stat file behind `buf`.
    ///
    /// Lines with fewer than two tokens and unknown keys are skipped; only the
    /// first pair of each line is considered.
    ///
    /// # Errors
    ///
    /// Returns [`StatParseError::Io`] if reading fails,
    /// [`StatParseError::InvalidKeyValue`] if the value of a known key is not an
    /// unsigned integer, and [`StatParseError::DuplicateField`] for repeated keys
    /// unless duplicates are allowed.
    fn from_reader<R: BufRead>(buf: &mut R) -> Result<Self, StatParseError> {
        let mut stat = Self::default();
        let handlers = Self::field_handlers();
        let mut seen_keys = HashSet::with_capacity(handlers.len());

        let mut line = String::new();
        let mut lineno = 0;
        while buf.read_line(&mut line)? != 0 {
            lineno += 1;
            let mut parts = line.split_whitespace();
            if let (Some(key), Some(val)) = (parts.next(), parts.next()) {
                Self::parse_and_set(key, val, &mut stat, lineno, handlers, &mut seen_keys)?;
            }
            if !Self::ALLOW_DUPLICATE_KEYS && seen_keys.len() == handlers.len() {
                break;
            }

            line.clear();
        }

        Ok(stat)
    }

    /// Parses `val` and hands it to the setter registered for `key`, if any.
    ///
    /// # Errors
    ///
    /// See [`KeyValueStat::from_reader`].
    fn parse_and_set(
        key: &str,
        val: &str,
        stat: &mut Self,
        lineno: usize,
        handlers: &HashMap<&'static str, fn(&mut Self, u64)>,
        seen_keys: &mut HashSet<&'static str>,
    ) -> Result<(), StatParseError> {
        let Some((k, handler)) = handlers.get_key_value(key) else {
            return Ok(());
        };

        let parsed = val
            .parse::<u64>()
            .map_err(|source| StatParseError::InvalidKeyValue {
                key: key.to_string(),
                value: val.to_string(),
                line: lineno,
                source,
            })?;
        if !Self::ALLOW_DUPLICATE_KEYS && !seen_keys.insert(k) {
            return Err(StatParseError::DuplicateField {
                field: key.to_string(),
                line: lineno,
            });
        }
        handler(stat, parsed);
        Ok(())
    }
}
