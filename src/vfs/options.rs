use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// extended attribute carrying a node's content hash
pub const DEFAULT_XATTR_NAME: &str = "user.zub.hash";

/// how a mounted tree materializes content and reports metadata
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsOptions {
    /// defer blob decoding until the first read of an open handle
    pub lazy: bool,
    /// spool blobs to files under `spool_dir` instead of holding them in memory
    pub disk: bool,
    /// content-addressed spool directory for disk materialization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spool_dir: Option<PathBuf>,
    /// name of the synthetic hash attribute
    pub xattr_name: String,
    /// where reported timestamps come from
    pub timestamps: TimestampSource,
    /// present the root as a linked worktree (never persisted)
    #[serde(skip)]
    pub worktree: Option<WorktreeRedirect>,
}

impl Default for FsOptions {
    fn default() -> Self {
        Self {
            lazy: true,
            disk: false,
            spool_dir: None,
            xattr_name: DEFAULT_XATTR_NAME.to_string(),
            timestamps: TimestampSource::default(),
            worktree: None,
        }
    }
}

/// source of mtime/atime/ctime; the store keeps no per-file times
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampSource {
    /// the moment each node was materialized in this process
    #[default]
    Mount,
    /// the mounted commit's recorded timestamp, for every node
    Commit,
}

/// root-level context that makes a mounted tree look like a linked worktree
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorktreeRedirect {
    /// host directory the tree is mounted on
    pub mount_point: PathBuf,
    /// per-worktree administrative directory the marker points at
    pub admin_dir: PathBuf,
}

impl WorktreeRedirect {
    pub fn new(mount_point: impl Into<PathBuf>, admin_dir: impl Into<PathBuf>) -> Self {
        Self {
            mount_point: mount_point.into(),
            admin_dir: admin_dir.into(),
        }
    }

    /// content of the synthetic marker file
    pub fn marker_content(&self) -> Vec<u8> {
        format!("gitdir: {}\n", self.admin_dir.display()).into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_content() {
        let redirect = WorktreeRedirect::new("/src/wt", "/src/repo/.git/worktrees/wt");
        assert_eq!(
            redirect.marker_content(),
            b"gitdir: /src/repo/.git/worktrees/wt\n"
        );
    }

    #[test]
    fn test_worktree_not_serialized() {
        let options = FsOptions {
            worktree: Some(WorktreeRedirect::new("/a", "/b")),
            ..FsOptions::default()
        };
        let toml_str = toml::to_string(&options).unwrap();
        assert!(!toml_str.contains("worktree"));

        let parsed: FsOptions = toml::from_str(&toml_str).unwrap();
        assert!(parsed.worktree.is_none());
    }
}
