//! Mountinfo line parser for Linux systems.
//!
//! Parses lines in `/proc/[pid]/mountinfo` format. See
//! [`proc_pid_mountinfo(5)`](https://man7.org/linux/man-pages/man5/proc_pid_mountinfo.5.html)
//! for details on the structure.

use std::borrow::Cow;

/// Represents a parsed mountinfo line.
#[derive(Debug, PartialEq, Eq)]
pub struct MountInfo<'a> {
    /// Mount ID field.
    pub mount_id: &'a str,
    /// Parent mount ID field.
    pub parent_id: &'a str,
    /// Major:Minor device identifier.
    pub major_minor: &'a str,
    /// Root of the mount within the filesystem.
    pub root: Cow<'a, str>,
    /// Mount point relative to the process's root.
    pub mount_point: Cow<'a, str>,
    /// Per-mount options (e.g., `ro,nosuid,nodev`).
    pub mount_options: &'a str,
    /// Optional fields such as `shared:20` (can be empty).
    pub optional_fields: Vec<&'a str>,
    /// Filesystem type (e.g., `ext4`, `cgroup2`).
    pub fs_type: &'a str,
    /// Source of the mount (e.g., device).
    pub source: &'a str,
    /// Superblock options.
    pub super_options: &'a str,
}

impl MountInfo<'_> {
    /// Returns `true` if the per-mount options contain `ro`.
    pub fn is_read_only(&self) -> bool {
        self.mount_options.split(',').any(|opt| opt == "ro")
    }

    /// Iterates over the comma-separated superblock options.
    ///
    /// For cgroup v1 mounts these include the names of the mounted controllers.
    pub fn super_option_names(&self) -> impl Iterator<Item = &str> {
        self.super_options.split(',')
    }
}

/// Named fields in a mountinfo line.
#[derive(Debug)]
pub enum MountInfoField {
    MountId,
    ParentId,
    MajorMinor,
    Root,
    MountPoint,
    MountOptions,
    FsType,
    Source,
    SuperOptions,
}

impl std::fmt::Display for MountInfoField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MountInfoField::MountId => "mount_id",
            MountInfoField::ParentId => "parent_id",
            MountInfoField::MajorMinor => "major:minor",
            MountInfoField::Root => "root",
            MountInfoField::MountPoint => "mount_point",
            MountInfoField::MountOptions => "mount_options",
            MountInfoField::FsType => "fs_type",
            MountInfoField::Source => "source",
            MountInfoField::SuperOptions => "super_options",
        };
        write!(f, "{name}")
    }
}

/// Errors that may occur when parsing a mountinfo line.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum ParseError {
    #[error("missing separator ` - ` in line: `{0}`")]
    MissingSeparator(String),

    #[error("missing `{field}` in pre-separator section of line: `{line}`")]
    MissingPreSeparatorField { field: MountInfoField, line: String },

    #[error("missing `{field}` in post-separator section of line: `{line}`")]
    MissingPostSeparatorField { field: MountInfoField, line: String },
}

/// Parses a single line of mountinfo data.
///
/// The line must follow the Linux kernel format described in [`proc_pid_mountinfo(5)`](https://man7.org/linux/man-pages/man5/proc_pid_mountinfo.5.html).
/// Fields are borrowed from the input line; only the optional fields and paths
/// containing octal escapes (e.g., `\040` for a space) allocate.
///
/// The separator is the first standalone `-` field, so any number of optional
/// fields and arbitrary whitespace between fields are accepted.
///
/// # Arguments
///
/// * `line` - A single line from `/proc/[pid]/mountinfo`.
///
/// # Returns
///
/// On success, returns a [`MountInfo`] struct referencing fields in the original input line.
///
/// # Errors
///
/// Returns [`ParseError`] variants for missing separator or required fields.
pub fn parse_mount_info_line<'a>(line: &'a str) -> Result<MountInfo<'a>, ParseError> {
    let mut fields = line.split_whitespace();
    let mut pre_fields = fields.by_ref().take_while(|field| *field != "-");

    let mut next_pre = |field: MountInfoField| {
        pre_fields
            .next()
            .ok_or_else(|| ParseError::MissingPreSeparatorField {
                field,
                line: line.to_owned(),
            })
    };

    let mount_id = next_pre(MountInfoField::MountId)?;
    let parent_id = next_pre(MountInfoField::ParentId)?;
    let major_minor = next_pre(MountInfoField::MajorMinor)?;
    let root = next_pre(MountInfoField::Root)?;
    let mount_point = next_pre(MountInfoField::MountPoint)?;
    let mount_options = next_pre(MountInfoField::MountOptions)?;

    let optional_fields: Vec<&str> = pre_fields.collect();

    // `take_while` consumed the separator; if it was never found the
    // remaining iterator is exhausted and no post-separator fields exist.
    let mut post_fields = fields.peekable();
    if post_fields.peek().is_none() && !has_separator(line) {
        return Err(ParseError::MissingSeparator(line.to_owned()));
    }

    let mut next_post = |field: MountInfoField| {
        post_fields
            .next()
            .ok_or_else(|| ParseError::MissingPostSeparatorField {
                field,
                line: line.to_owned(),
            })
    };

    let fs_type = next_post(MountInfoField::FsType)?;
    let source = next_post(MountInfoField::Source)?;
    let super_options = next_post(MountInfoField::SuperOptions)?;

    Ok(MountInfo {
        mount_id,
        parent_id,
        major_minor,
        root: unescape_octal(root),
        mount_point: unescape_octal(mount_point),
        mount_options,
        optional_fields,
        fs_type,
        source,
        super_options,
    })
}

fn has_separator(line: &str) -> bool {
    line.split_whitespace().any(|field| field == "-")
}

/// Decodes the `\ooo` escapes the kernel uses for space, tab, newline and
/// backslash in paths.
fn unescape_octal(field: &str) -> Cow<'_, str> {
    if !field.contains('\\') {
        return Cow::Borrowed(field);
    }

    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && is_octal_escape(&bytes[i + 1..i + 4]) {
            let value =
                (bytes[i + 1] - b'0') * 64 + (bytes[i + 2] - b'0') * 8 + (bytes[i + 3] - b'0');
            out.push(value);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    Cow::Owned(String::from_utf8_lossy(&out).into_owned())
}

fn is_octal_escape(digits: &[u8]) -> bool {
    digits.len() == 3
        && (b'0'..=b'3').contains(&digits[0])
        && digits[1..].iter().all(|d| (b'0'..=b'7').contains(d))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_mountinfo_line_with_optional_fields() {
        let line = "42 35 0:22 / /mnt rw,nosuid shared:7 - ext4 /dev/sda1 rw,data=ordered";
        let result = parse_mount_info_line(line).unwrap();

        assert_eq!(result.mount_id, "42");
        assert_eq!(result.parent_id, "35");
        assert_eq!(result.major_minor, "0:22");
        assert_eq!(result.root, "/");
        assert_eq!(result.mount_point, "/mnt");
        assert_eq!(result.mount_options, "rw,nosuid");
        assert_eq!(result.fs_type, "ext4");
        assert_eq!(result.source, "/dev/sda1");
        assert_eq!(result.super_options, "rw,data=ordered");
        assert_eq!(result.optional_fields, vec!["shared:7"]);
    }

    #[test]
    fn error_on_missing_separator() {
        let line = "42 35 0:22 / /mnt rw,nosuid ext4 /dev/sda1 rw";
        let err = parse_mount_info_line(line).unwrap_err();
        assert!(matches!(err, ParseError::MissingSeparator(_)));
    }

    #[test]
    fn error_on_missing_mount_point() {
        let line = "42 35 0:22 / - ext4 /dev/sda1 rw";
        let err = parse_mount_info_line(line).unwrap_err();
        match err {
            ParseError::MissingPreSeparatorField { field, .. } => {
                assert_eq!(field.to_string(), "mount_point");
            }
            _ => panic!("Expected MissingPreSeparatorField"),
        }
    }

    #[test]
    fn parses_valid_line_with_no_optional_fields() {
        let line = "36 25 0:32 / /sys rw - sysfs sysfs rw";
        let result = parse_mount_info_line(line).unwrap();
        assert_eq!(result.optional_fields.len(), 0);
        assert_eq!(result.fs_type, "sysfs");
    }

    #[test]
    fn parses_valid_line_with_multiple_optional_fields() {
        let line = "70 56 0:45 / /var rw,nosuid,nodev,noexec,relatime shared:20 master:1 - ext4 /dev/sdb1 rw,errors=remount-ro";
        let result = parse_mount_info_line(line).unwrap();
        assert_eq!(result.mount_options, "rw,nosuid,nodev,noexec,relatime");
        assert_eq!(result.optional_fields, vec!["shared:20", "master:1"]);
    }

    #[test]
    fn error_on_missing_post_separator_fields() {
        let line = "42 35 0:22 / /mnt rw - ext4 /dev/sda1";
        let err = parse_mount_info_line(line).unwrap_err();
        match err {
            ParseError::MissingPostSeparatorField { field, .. } => {
                assert_eq!(field.to_string(), "super_options");
            }
            _ => panic!("Expected MissingPostSeparatorField"),
        }
    }

    #[test]
    fn error_on_empty_line() {
        let err = parse_mount_info_line("").unwrap_err();
        assert!(matches!(
            err,
            ParseError::MissingPreSeparatorField { .. }
        ));
    }

    #[test]
    fn recognizes_cgroup2_regardless_of_spacing() {
        let line = "30  23 0:26   /   /sys/fs/cgroup\trw,nosuid,nodev,noexec,relatime shared:4  -  cgroup2 cgroup2   rw,nsdelegate,memory_recursiveprot";
        let result = parse_mount_info_line(line).unwrap();
        assert_eq!(result.fs_type, "cgroup2");
        assert_eq!(result.mount_point, "/sys/fs/cgroup");
        assert!(!result.is_read_only());
    }

    #[test]
    fn detects_read_only_mount_options() {
        let line = "1531 1508 0:29 /docker/abc /sys/fs/cgroup/memory ro,nosuid,nodev,noexec,relatime master:15 - cgroup cgroup rw,memory";
        let result = parse_mount_info_line(line).unwrap();
        assert!(result.is_read_only());
        assert_eq!(result.root, "/docker/abc");
        assert_eq!(
            result.super_option_names().collect::<Vec<_>>(),
            vec!["rw", "memory"]
        );
    }

    #[test]
    fn rw_prefix_is_not_read_only() {
        let line = "1 2 0:3 / /x rw,romantic - ext4 /dev/sda rw";
        let result = parse_mount_info_line(line).unwrap();
        assert!(!result.is_read_only());
    }

    #[test]
    fn unescapes_octal_sequences_in_paths() {
        let line = r"42 35 0:22 /my\040root /mnt/with\040space rw - ext4 /dev/sda1 rw";
        let result = parse_mount_info_line(line).unwrap();
        assert_eq!(result.root, "/my root");
        assert_eq!(result.mount_point, "/mnt/with space");
    }

    #[test]
    fn keeps_incomplete_escape_sequences() {
        assert_eq!(unescape_octal(r"/a\04"), r"/a\04");
        assert_eq!(unescape_octal(r"/a\9xx"), r"/a\9xx");
    }
}
