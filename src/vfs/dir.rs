use std::collections::HashMap;
use std::ffi::OsString;
use std::sync::OnceLock;

use nix::fcntl::OFlag;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::attr::{DirEntry, FileAttr, FileKind};
use super::file::{FileHandle, RedirectNode};
use super::node::{Node, NodeInfo};
use super::{split_first, wants_write, WORKTREE_MARKER};
use crate::error::{FsError, FsResult};
use crate::types::Tree;

/// nominal size reported for directories
pub const DIR_SIZE: u64 = 64;

/// a tree, decoded into child nodes on first access
pub struct DirNode {
    info: NodeInfo,
    fill: Mutex<()>,
    children: OnceLock<Children>,
    /// `.` and `..` mirrored from the host (root only)
    parents: Vec<DirEntry>,
    /// content of the synthetic worktree marker (root only)
    marker: Option<Vec<u8>>,
}

struct Children {
    nodes: Vec<Node>,
    by_name: HashMap<String, usize>,
}

impl Children {
    fn get(&self, name: &str) -> Option<&Node> {
        self.by_name.get(name).map(|&i| &self.nodes[i])
    }
}

impl DirNode {
    pub(crate) fn new(info: NodeInfo) -> Self {
        Self {
            info,
            fill: Mutex::new(()),
            children: OnceLock::new(),
            parents: Vec::new(),
            marker: None,
        }
    }

    /// root directory, optionally carrying host navigation entries and a
    /// worktree marker
    pub(crate) fn root(info: NodeInfo, parents: Vec<DirEntry>, marker: Option<Vec<u8>>) -> Self {
        Self {
            parents,
            marker,
            ..Self::new(info)
        }
    }

    /// install children from a tree decoded elsewhere; a tree that cannot be
    /// mapped is left for the next access to report
    pub(crate) fn seed(&self, tree: Tree) {
        let _guard = self.fill.lock();
        if self.children.get().is_some() {
            return;
        }
        if let Ok(children) = self.build(tree) {
            let _ = self.children.set(children);
        }
    }

    pub fn info(&self) -> &NodeInfo {
        &self.info
    }

    pub fn attr(&self) -> FileAttr {
        self.info.attr(FileKind::Directory, DIR_SIZE, 2)
    }

    /// whether the tree has been decoded
    pub fn is_resolved(&self) -> bool {
        self.children.get().is_some()
    }

    /// decoded children, decoding the tree at most once
    fn children(&self) -> FsResult<&Children> {
        if let Some(children) = self.children.get() {
            return Ok(children);
        }

        let _guard = self.fill.lock();
        if let Some(children) = self.children.get() {
            return Ok(children);
        }

        let hash = self.info.hash();
        let tree = self
            .info
            .ctx()
            .store
            .decode_tree(hash)
            .map_err(|e| {
                warn!(tree = %hash, error = %e, "cannot decode tree");
                FsError::NotFound
            })?;
        let children = self.build(tree)?;
        debug!(tree = %hash, entries = children.nodes.len(), "decoded tree");

        Ok(self.children.get_or_init(|| children))
    }

    fn build(&self, tree: Tree) -> FsResult<Children> {
        let ctx = self.info.ctx();
        let mut nodes = Vec::with_capacity(tree.len() + 1);

        if let Some(content) = &self.marker {
            nodes.push(Node::Redirect(RedirectNode::new(
                ctx,
                WORKTREE_MARKER,
                content.clone(),
            )));
        }

        for entry in tree.into_entries() {
            if self.marker.is_some() && entry.name == WORKTREE_MARKER {
                debug!("tree entry {} shadowed by worktree marker", WORKTREE_MARKER);
                continue;
            }
            nodes.push(Node::from_entry(ctx, entry)?);
        }

        let by_name = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.name().to_string(), i))
            .collect();

        Ok(Children { nodes, by_name })
    }

    /// direct child by name
    pub fn lookup(&self, name: &str) -> FsResult<&Node> {
        self.children()?.get(name).ok_or(FsError::NotFound)
    }

    /// attributes of the node at path
    pub fn get_attr(&self, path: &str) -> FsResult<FileAttr> {
        if path.is_empty() {
            return Ok(self.attr());
        }

        let (name, rest) = split_first(path);
        match (self.lookup(name)?, rest) {
            (Node::Dir(dir), Some(rest)) => dir.get_attr(rest),
            (node, None) => Ok(node.attr()),
            (_, Some(_)) => Err(FsError::NotADirectory),
        }
    }

    /// entries of the directory at path
    pub fn open_dir(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        if path.is_empty() {
            return self.list();
        }

        let (name, rest) = split_first(path);
        match self.lookup(name)? {
            Node::Dir(dir) => dir.open_dir(rest.unwrap_or("")),
            _ => Err(FsError::NotADirectory),
        }
    }

    fn list(&self) -> FsResult<Vec<DirEntry>> {
        let children = self.children()?;
        let mut entries = Vec::with_capacity(self.parents.len() + children.nodes.len());
        entries.extend(self.parents.iter().cloned());
        entries.extend(children.nodes.iter().map(|node| node.info().dir_entry()));
        Ok(entries)
    }

    /// open the regular file at path
    pub fn open(&self, path: &str, flags: OFlag) -> FsResult<FileHandle> {
        if wants_write(flags) {
            return Err(FsError::PermissionDenied);
        }
        if path.is_empty() {
            return Err(FsError::IsADirectory);
        }

        let (name, rest) = split_first(path);
        match (self.lookup(name)?, rest) {
            (Node::Dir(dir), Some(rest)) => dir.open(rest, flags),
            (Node::Dir(_), None) => Err(FsError::IsADirectory),
            (Node::File(file), None) => file.open(flags),
            (Node::Redirect(redirect), None) => redirect.open(flags),
            (Node::Symlink(_), None) => Err(FsError::InvalidArgument),
            (_, Some(_)) => Err(FsError::NotADirectory),
        }
    }

    /// target of the symlink at path
    pub fn read_link(&self, path: &str) -> FsResult<OsString> {
        if path.is_empty() {
            return Err(FsError::InvalidArgument);
        }

        let (name, rest) = split_first(path);
        match (self.lookup(name)?, rest) {
            (Node::Dir(dir), Some(rest)) => dir.read_link(rest),
            (Node::Symlink(link), None) => link.read_link(),
            (_, None) => Err(FsError::InvalidArgument),
            (_, Some(_)) => Err(FsError::NotADirectory),
        }
    }

    /// resolve path and hand the node's shared state to `f`
    pub fn with_info<T>(&self, path: &str, f: impl FnOnce(&NodeInfo) -> T) -> FsResult<T> {
        if path.is_empty() {
            return Ok(f(&self.info));
        }

        let (name, rest) = split_first(path);
        match (self.lookup(name)?, rest) {
            (Node::Dir(dir), Some(rest)) => dir.with_info(rest, f),
            (node, None) => Ok(f(node.info())),
            (_, Some(_)) => Err(FsError::NotADirectory),
        }
    }

    /// any node that resolves is accessible; mode bits are the only policy
    pub fn access(&self, path: &str) -> FsResult<()> {
        self.with_info(path, |_| ())
    }

    pub fn list_xattr(&self, path: &str) -> FsResult<Vec<String>> {
        self.with_info(path, NodeInfo::list_xattr)
    }

    pub fn get_xattr(&self, path: &str, name: &str) -> FsResult<Vec<u8>> {
        self.with_info(path, |info| info.get_xattr(name))?
    }
}
