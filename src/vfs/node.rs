use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::warn;

use super::attr::{DirEntry, FileAttr, FileKind};
use super::dir::DirNode;
use super::file::{FileNode, RedirectNode};
use super::link::LinkNode;
use super::root::FsContext;
use crate::error::{FsError, FsResult};
use crate::hash::Hash;
use crate::types::{EntryKind, TreeEntry};

/// state shared by every node kind
pub struct NodeInfo {
    ctx: Arc<FsContext>,
    /// 0 until first requested
    ino: AtomicU64,
    name: String,
    mode: u32,
    hash: Hash,
    time: SystemTime,
}

impl NodeInfo {
    pub(crate) fn new(ctx: &Arc<FsContext>, name: impl Into<String>, mode: u32, hash: Hash) -> Self {
        Self {
            ctx: Arc::clone(ctx),
            ino: AtomicU64::new(0),
            name: name.into(),
            mode,
            hash,
            time: ctx.node_time(),
        }
    }

    /// pin the inode up front (root mirroring a host directory)
    pub(crate) fn with_ino(self, ino: u64) -> Self {
        self.ino.store(ino, Ordering::Release);
        self
    }

    /// pin the mode up front (root mirroring a host directory)
    pub(crate) fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    pub fn time(&self) -> SystemTime {
        self.time
    }

    /// stable inode id, allocated on first call
    pub fn ino(&self) -> u64 {
        let current = self.ino.load(Ordering::Acquire);
        if current != 0 {
            return current;
        }

        let fresh = self.ctx.allocate_ino();
        match self
            .ino
            .compare_exchange(0, fresh, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => fresh,
            // another caller won; its id stands and ours is skipped
            Err(winner) => winner,
        }
    }

    pub(crate) fn ctx(&self) -> &Arc<FsContext> {
        &self.ctx
    }

    pub(crate) fn attr(&self, kind: FileKind, size: u64, nlink: u32) -> FileAttr {
        FileAttr {
            ino: self.ino(),
            kind,
            mode: self.mode,
            size,
            nlink,
            mtime: self.time,
            atime: self.time,
            ctime: self.time,
        }
    }

    pub(crate) fn dir_entry(&self) -> DirEntry {
        DirEntry::new(self.ino(), self.mode, self.name.clone())
    }

    pub(crate) fn list_xattr(&self) -> Vec<String> {
        vec![self.ctx.options.xattr_name.clone()]
    }

    pub(crate) fn get_xattr(&self, name: &str) -> FsResult<Vec<u8>> {
        if name == self.ctx.options.xattr_name {
            Ok(self.hash.to_hex().into_bytes())
        } else {
            Err(FsError::NoSuchAttribute)
        }
    }
}

/// a decoded child of a directory
pub enum Node {
    Dir(DirNode),
    File(FileNode),
    Symlink(LinkNode),
    /// synthetic worktree marker
    Redirect(RedirectNode),
}

impl Node {
    /// build the node for one tree entry
    pub(crate) fn from_entry(ctx: &Arc<FsContext>, entry: TreeEntry) -> FsResult<Self> {
        let mode = entry.mode();
        match entry.kind {
            EntryKind::Directory { hash, .. } => {
                Ok(Node::Dir(DirNode::new(NodeInfo::new(ctx, entry.name, mode, hash))))
            }
            EntryKind::Regular { hash, size, .. } => Ok(Node::File(FileNode::new(
                NodeInfo::new(ctx, entry.name, mode, hash),
                size,
            ))),
            EntryKind::Symlink { hash, size } => Ok(Node::Symlink(LinkNode::new(
                NodeInfo::new(ctx, entry.name, mode, hash),
                size,
            ))),
            other => {
                warn!(
                    name = %entry.name,
                    kind = other.type_name(),
                    mode = %format!("{:o}", mode),
                    "unsupported entry type"
                );
                Err(FsError::Io)
            }
        }
    }

    pub fn info(&self) -> &NodeInfo {
        match self {
            Node::Dir(dir) => dir.info(),
            Node::File(file) => file.info(),
            Node::Symlink(link) => link.info(),
            Node::Redirect(redirect) => redirect.info(),
        }
    }

    pub fn name(&self) -> &str {
        self.info().name()
    }

    pub fn kind(&self) -> FileKind {
        match self {
            Node::Dir(_) => FileKind::Directory,
            Node::File(_) | Node::Redirect(_) => FileKind::RegularFile,
            Node::Symlink(_) => FileKind::Symlink,
        }
    }

    /// this node's own attributes
    pub fn attr(&self) -> FileAttr {
        match self {
            Node::Dir(dir) => dir.attr(),
            Node::File(file) => file.attr(),
            Node::Symlink(link) => link.attr(),
            Node::Redirect(redirect) => redirect.attr(),
        }
    }
}
