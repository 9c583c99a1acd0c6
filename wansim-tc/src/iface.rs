//! Interfaces: snapshots, naming-convention roles and listing.

use std::{fmt, path::PathBuf, time::Duration};

use async_trait::async_trait;
use serde::Serialize;

use crate::{
    command::{BoxedExecutor, Invocation},
    tc::impairment::ValidationError,
};

/// Substrings marking management, loopback and shadow interfaces. Any interface whose name
/// contains one of these is left out of every bulk operation.
pub const EXCLUDED_SUBSTRINGS: [&str; 4] = ["lo", "mgmt", "ifb", "internet"];

/// Maximum interface name length, `IFNAMSIZ` minus the trailing NUL.
pub const MAX_NAME_LEN: usize = 15;

/// Snapshot of the impairment currently applied to an interface.
///
/// Built fresh from the kernel report on every inspection. `None` means no impairment of that
/// kind is applied, which is different from an explicit zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interface {
    /// Kernel interface name.
    pub name: String,
    /// Loss in percent.
    pub loss: Option<u32>,
    /// Delay in milliseconds.
    pub delay: Option<u32>,
}

impl Interface {
    /// An unimpaired interface.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), loss: None, delay: None }
    }
}

/// Side of the control pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Interfaces tagged `left`.
    Left,
    /// Interfaces tagged `right`.
    Right,
}

impl Side {
    /// Substring tagging candidates for this side.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    /// Returns `true` if `name` may stand on this side of the control pair.
    ///
    /// Tags are matched as substrings, so a name carrying both tags is a candidate for both
    /// sides. Excluded names never are.
    pub fn admits(self, name: &str) -> bool {
        !is_excluded(name) && name.contains(self.tag())
    }
}

/// Returns `true` if `name` must be skipped by bulk operations.
pub fn is_excluded(name: &str) -> bool {
    EXCLUDED_SUBSTRINGS.iter().any(|s| name.contains(s))
}

/// Checks that `name` can be safely placed on a `tc` batch line.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::InterfaceName { name: name.to_string(), reason: "empty" });
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ValidationError::InterfaceName { name: name.to_string(), reason: "too long" });
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_control() || c == '/') {
        return Err(ValidationError::InterfaceName {
            name: name.to_string(),
            reason: "contains whitespace, control characters or '/'",
        });
    }

    Ok(())
}

/// Produces the current set of manageable interface names.
///
/// Listing never fails: implementations log the problem and return an empty list, which
/// callers treat as a topology with zero interfaces.
#[async_trait]
pub trait InterfaceLister: fmt::Debug + Send + Sync {
    /// Returns the interface names, in the order the source reports them.
    async fn list(&self) -> Vec<String>;
}

/// Lists interfaces by running an external program and splitting its stdout on whitespace.
#[derive(Debug)]
pub struct CommandLister {
    executor: BoxedExecutor,
    invocation: Invocation,
    timeout: Duration,
}

impl CommandLister {
    /// Runs `invocation` through `executor`, bounded by `timeout`, on every listing.
    pub fn new(executor: BoxedExecutor, invocation: Invocation, timeout: Duration) -> Self {
        Self { executor, invocation, timeout }
    }
}

#[async_trait]
impl InterfaceLister for CommandLister {
    async fn list(&self) -> Vec<String> {
        match self.executor.run(&self.invocation, self.timeout).await {
            Ok(output) => split_names(&output.stdout),
            Err(e) => {
                tracing::warn!(invocation = %self.invocation, error = %e, "failed to list interfaces");
                Vec::new()
            }
        }
    }
}

/// Lists the entries of a sysfs network class directory, `/sys/class/net` by default.
#[derive(Debug, Clone)]
pub struct SysfsLister {
    root: PathBuf,
}

impl Default for SysfsLister {
    fn default() -> Self {
        Self { root: PathBuf::from("/sys/class/net") }
    }
}

impl SysfsLister {
    /// Lists the entries of `root` instead.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl InterfaceLister for SysfsLister {
    async fn list(&self) -> Vec<String> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) => {
                tracing::warn!(root = ?self.root, error = %e, "failed to read interface directory");
                return Vec::new();
            }
        };

        let mut names = Vec::new();
        loop {
            match dir.next_entry().await {
                Ok(Some(entry)) => names.push(entry.file_name().to_string_lossy().into_owned()),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(root = ?self.root, error = %e, "failed to read interface entry");
                    return Vec::new();
                }
            }
        }

        names.sort();
        names
    }
}

fn split_names(stdout: &str) -> Vec<String> {
    stdout.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::FakeTc;

    #[test]
    fn sides_follow_naming_convention() {
        assert!(Side::Left.admits("left1"));
        assert!(!Side::Right.admits("left1"));
        assert!(Side::Right.admits("eth-right2"));
        assert!(!Side::Left.admits("other1") && !Side::Right.admits("other1"));

        for name in ["lo", "mgmt0", "ifb0", "internet0"] {
            assert!(is_excluded(name), "{name}");
        }
    }

    #[test]
    fn dual_tagged_name_admitted_on_both_sides() {
        assert!(Side::Left.admits("leftright0"));
        assert!(Side::Right.admits("leftright0"));
    }

    #[test]
    fn exclusion_wins_over_side_tags() {
        // Matching is by substring, so a left-tagged shadow device is still excluded.
        assert!(!Side::Left.admits("ifb-left1"));
        assert!(!Side::Right.admits("right-mgmt"));
        assert!(!is_excluded("right1"));
    }

    #[test]
    fn validate_name_rejects_unsafe_names() {
        assert!(validate_name("eth0").is_ok());
        assert!(validate_name("left1.100").is_ok());

        assert!(validate_name("").is_err());
        assert!(validate_name("a-very-long-ifname0").is_err());
        assert!(validate_name("eth0 root").is_err());
        assert!(validate_name("eth0\nqdisc").is_err());
        assert!(validate_name("../eth0").is_err());
    }

    #[test]
    fn split_names_drops_empty_tokens() {
        assert_eq!(split_names("left1  right1\nother1\n"), ["left1", "right1", "other1"]);
        assert!(split_names("\n").is_empty());
    }

    #[tokio::test]
    async fn command_lister_splits_output() {
        let tc = Arc::new(FakeTc::with_interfaces(["left1", "right1", "other1"]));
        let lister =
            CommandLister::new(tc, Invocation::new("/bin/listInterfaces"), Duration::from_secs(1));

        assert_eq!(lister.list().await, ["left1", "right1", "other1"]);
    }

    #[tokio::test]
    async fn command_lister_failure_is_empty() {
        let _ = tracing_subscriber::fmt::try_init();

        let tc = Arc::new(FakeTc::with_interfaces(["left1"]));
        tc.fail_listing();
        let lister =
            CommandLister::new(tc, Invocation::new("/bin/listInterfaces"), Duration::from_secs(1));

        assert!(lister.list().await.is_empty());
    }

    #[tokio::test]
    async fn sysfs_lister_returns_sorted_entries() {
        let root = std::env::temp_dir().join(format!("wansim-sysfs-{}", std::process::id()));
        for name in ["right1", "eth0", "left1", "lo"] {
            std::fs::create_dir_all(root.join(name)).unwrap();
        }

        let names = SysfsLister::with_root(&root).list().await;
        std::fs::remove_dir_all(&root).unwrap();

        assert_eq!(names, ["eth0", "left1", "lo", "right1"]);
    }

    #[tokio::test]
    async fn sysfs_lister_missing_root_is_empty() {
        let lister = SysfsLister::with_root("/nonexistent/sys/class/net");
        assert!(lister.list().await.is_empty());
    }
}
