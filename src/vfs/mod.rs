//! read-only virtual filesystem over a committed tree
//!
//! a [`TreeFs`] exposes one revision as a path-addressed filesystem. nothing
//! is checked out: directories decode their tree object on first access,
//! files materialize their blob on first read, and symlinks resolve their
//! target once and keep it.
//!
//! every operation takes a path relative to the mount root (`""` is the
//! root itself) and answers with an [`FsResult`], whose error side maps to
//! an errno via [`FsError::errno`](crate::FsError::errno).

mod attr;
mod dir;
mod file;
mod link;
mod node;
mod options;
mod root;

#[cfg(test)]
mod testutil;

pub use attr::{DirEntry, FileAttr, FileKind};
pub use dir::DirNode;
pub use file::{FileHandle, FileNode, RedirectNode};
pub use link::LinkNode;
pub use node::{Node, NodeInfo};
pub use options::{FsOptions, TimestampSource, WorktreeRedirect, DEFAULT_XATTR_NAME};
pub use root::TreeFs;

use std::ffi::OsString;

use nix::fcntl::OFlag;
use nix::unistd::AccessFlags;

use crate::error::FsResult;

/// name of the synthetic worktree marker at the mount root
pub const WORKTREE_MARKER: &str = ".git";

/// operations a path-based filesystem dispatcher calls into
///
/// the dispatcher owns request lifetimes and calls these concurrently from
/// worker threads. paths are relative to the mount root and already
/// normalized.
pub trait PathFs: Send + Sync {
    /// attributes of the node at path
    fn get_attr(&self, path: &str) -> FsResult<FileAttr>;

    /// enumerate a directory
    fn open_dir(&self, path: &str) -> FsResult<Vec<DirEntry>>;

    /// open a regular file
    fn open(&self, path: &str, flags: OFlag) -> FsResult<FileHandle>;

    /// target of a symbolic link
    fn read_link(&self, path: &str) -> FsResult<OsString>;

    /// permission check
    fn access(&self, path: &str, mode: AccessFlags) -> FsResult<()>;

    /// extended attribute names of the node at path
    fn list_xattr(&self, path: &str) -> FsResult<Vec<String>>;

    /// value of one extended attribute
    fn get_xattr(&self, path: &str, name: &str) -> FsResult<Vec<u8>>;

    /// whether writes can ever succeed on this layer
    fn is_read_only(&self) -> bool {
        true
    }
}

/// does an open request carry any write intent
pub fn wants_write(flags: OFlag) -> bool {
    flags.intersects(
        OFlag::O_WRONLY | OFlag::O_RDWR | OFlag::O_APPEND | OFlag::O_CREAT | OFlag::O_TRUNC,
    )
}

/// split `a/b/c` into `("a", Some("b/c"))`
fn split_first(path: &str) -> (&str, Option<&str>) {
    match path.split_once('/') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    }
}
