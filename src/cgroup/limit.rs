use serde::Serialize;

/// Legacy encoding of an unlimited value.
pub const UNLIMITED: i64 = -1;

/// Legacy encoding of a failed or unsupported read.
pub const OSCONTAINER_ERROR: i64 = -2;

/// A resource limit as configured for a cgroup.
///
/// Numeric sentinels only appear at the C boundary, see [`Limit::to_raw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Limit {
    /// An explicit limit.
    Limited(u64),
    /// No limit is configured, or the configured one exceeds the host.
    Unlimited,
    /// The value could not be read on this system.
    Unsupported,
}

impl Limit {
    /// Turns a raw limit into [`Limit::Unlimited`] if it is not below `threshold`.
    ///
    /// Kernels report "no limit" as a page-aligned `i64::MAX` on cgroup v1, so
    /// anything at or above the host capacity counts as unlimited.
    pub fn with_threshold(value: u64, threshold: u64) -> Self {
        if value >= threshold {
            Limit::Unlimited
        } else {
            Limit::Limited(value)
        }
    }

    /// Returns the limit value if one is set.
    pub fn limited(self) -> Option<u64> {
        match self {
            Limit::Limited(value) => Some(value),
            Limit::Unlimited | Limit::Unsupported => None,
        }
    }

    pub fn is_unlimited(self) -> bool {
        matches!(self, Limit::Unlimited)
    }

    pub fn is_unsupported(self) -> bool {
        matches!(self, Limit::Unsupported)
    }

    /// Encodes the limit with the legacy sentinels: `-1` for unlimited and `-2`
    /// for unsupported. Values beyond `i64::MAX` saturate.
    pub fn to_raw(self) -> i64 {
        match self {
            Limit::Limited(value) => i64::try_from(value).unwrap_or(i64::MAX),
            Limit::Unlimited => UNLIMITED,
            Limit::Unsupported => OSCONTAINER_ERROR,
        }
    }

    /// Inverse of [`Limit::to_raw`]. Negative values other than `-1` decode to
    /// [`Limit::Unsupported`].
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            UNLIMITED => Limit::Unlimited,
            raw if raw < 0 => Limit::Unsupported,
            raw => Limit::Limited(raw as u64),
        }
    }
}

impl From<Option<Limit>> for Limit {
    fn from(value: Option<Limit>) -> Self {
        value.unwrap_or(Limit::Unsupported)
    }
}

impl std::fmt::Display for Limit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Limit::Limited(value) => write!(f, "{value}"),
            Limit::Unlimited => f.write_str("unlimited"),
            Limit::Unsupported => f.write_str("not supported"),
        }
    }
}
