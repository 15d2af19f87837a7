//! Records for the `memory.stat` file of both cgroup generations.
//!
//! The two kernels name the same quantities differently: resident anonymous
//! memory is `rss` on v1 and `anon` on v2, page cache is `cache` on v1 and
//! `file` on v2. A key missing from the file stays `None`.

use std::collections::HashMap;
use std::sync::LazyLock;

use super::KeyValueStat;

/// Values of interest in a cgroup v1 `memory.stat`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct V1MemoryStat {
    pub rss: Option<u64>,
    pub cache: Option<u64>,
    /// Limit inherited from ancestors when `memory.use_hierarchy` is enabled.
    pub hierarchical_memory_limit: Option<u64>,
    /// Memory + swap limit inherited from ancestors.
    pub hierarchical_memsw_limit: Option<u64>,
}

type V1Setter = fn(&mut V1MemoryStat, u64);

static V1_SETTERS: LazyLock<HashMap<&'static str, V1Setter>> = LazyLock::new(|| {
    let mut m: HashMap<&'static str, V1Setter> = HashMap::with_capacity(4);

    m.insert("rss", |s, v| s.rss = Some(v));
    m.insert("cache", |s, v| s.cache = Some(v));
    m.insert("hierarchical_memory_limit", |s, v| {
        s.hierarchical_memory_limit = Some(v)
    });
    m.insert("hierarchical_memsw_limit", |s, v| {
        s.hierarchical_memsw_limit = Some(v)
    });

    m
});

impl KeyValueStat for V1MemoryStat {
    const ALLOW_DUPLICATE_KEYS: bool = false;

    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
        &V1_SETTERS
    }
}

/// Values of interest in a cgroup v2 `memory.stat`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct V2MemoryStat {
    /// Anonymous memory.
    pub anon: Option<u64>,
    /// File-backed memory.
    pub file: Option<u64>,
}

type V2Setter = fn(&mut V2MemoryStat, u64);

static V2_SETTERS: LazyLock<HashMap<&'static str, V2Setter>> = LazyLock::new(|| {
    let mut m: HashMap<&'static str, V2Setter> = HashMap::with_capacity(2);

    m.insert("anon", |s, v| s.anon = Some(v));
    m.insert("file", |s, v| s.file = Some(v));

    m
});

impl KeyValueStat for V2MemoryStat {
    const ALLOW_DUPLICATE_KEYS: bool = false;

    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
        &V2_SETTERS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgroup::stats::StatParseError;

    #[test]
    fn test_parse_v1_memory_stat() {
        let data = "\
cache 2203648
rss 1069056
rss_huge 0
mapped_file 1351680
hierarchical_memory_limit 9223372036854771712
hierarchical_memsw_limit 9223372036854771712
total_cache 2203648
total_rss 1069056
";
        let stat = V1MemoryStat::from_reader(&mut data.as_bytes()).unwrap();
        assert_eq!(stat.rss, Some(1_069_056));
        assert_eq!(stat.cache, Some(2_203_648));
        assert_eq!(stat.hierarchical_memory_limit, Some(9_223_372_036_854_771_712));
        assert_eq!(stat.hierarchical_memsw_limit, Some(9_223_372_036_854_771_712));
    }

    #[test]
    fn test_parse_v2_memory_stat() {
        let data = "\
anon 1000
file 2000
kernel_stack 300
slab 400
";
        let stat = V2MemoryStat::from_reader(&mut data.as_bytes()).unwrap();
        assert_eq!(stat.anon, Some(1000));
        assert_eq!(stat.file, Some(2000));
    }

    #[test]
    fn test_missing_keys_stay_none() {
        let stat = V2MemoryStat::from_reader(&mut "anon 1000\n".as_bytes()).unwrap();
        assert_eq!(stat.anon, Some(1000));
        assert_eq!(stat.file, None);

        let stat = V1MemoryStat::from_reader(&mut "".as_bytes()).unwrap();
        assert_eq!(stat, V1MemoryStat::default());
    }

    #[test]
    fn test_invalid_value() {
        let data = "\
invalid
anon abc
file 2000
";
        let err = V2MemoryStat::from_reader(&mut data.as_bytes()).unwrap_err();
        match err {
            StatParseError::InvalidKeyValue {
                key, value, line, ..
            } => {
                assert_eq!(key, "anon");
                assert_eq!(value, "abc");
                assert_eq!(line, 2);
            }
            other => panic!("Expected InvalidKeyValue error, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_field() {
        let data = "\
rss 1000
rss 2000
";
        let err = V1MemoryStat::from_reader(&mut data.as_bytes()).unwrap_err();
        match err {
            StatParseError::DuplicateField { field, line } => {
                assert_eq!(field, "rss");
                assert_eq!(line, 2);
            }
            other => panic!("Expected DuplicateField error, got {other:?}"),
        }
    }

    #[test]
    fn test_extra_whitespace() {
        let data = "\
    anon     1000
file\t2000
";
        let stat = V2MemoryStat::from_reader(&mut data.as_bytes()).unwrap();
        assert_eq!(stat.anon, Some(1000));
        assert_eq!(stat.file, Some(2000));
    }
}
