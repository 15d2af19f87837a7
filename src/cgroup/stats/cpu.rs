use std::collections::HashMap;
use std::sync::LazyLock;

use super::KeyValueStat;

/// Values of interest in a cgroup v2 `cpu.stat`, all in microseconds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CpuStat {
    /// Total CPU time (user + system).
    pub usage_usec: Option<u64>,
    pub user_usec: Option<u64>,
    pub system_usec: Option<u64>,
}

type Setter = fn(&mut CpuStat, u64);

static SETTERS: LazyLock<HashMap<&'static str, Setter>> = LazyLock::new(|| {
    let mut m: HashMap<&'static str, Setter> = HashMap::with_capacity(3);

    m.insert("usage_usec", |s, v| s.usage_usec = Some(v));
    m.insert("user_usec", |s, v| s.user_usec = Some(v));
    m.insert("system_usec", |s, v| s.system_usec = Some(v));

    m
});

impl KeyValueStat for CpuStat {
    const ALLOW_DUPLICATE_KEYS: bool = false;

    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
        &SETTERS
    }
}
