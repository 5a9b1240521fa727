use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use nix::fcntl::OFlag;
use nix::libc;
use nix::unistd::AccessFlags;
use tracing::{debug, error, info};

use super::attr::{DirEntry, FileAttr};
use super::dir::DirNode;
use super::file::FileHandle;
use super::node::NodeInfo;
use super::options::{FsOptions, TimestampSource, WorktreeRedirect};
use super::PathFs;
use crate::error::{Error, FsResult, IoResultExt, Result};
use crate::fs::FileMetadata;
use crate::hash::Hash;
use crate::store::ObjectStore;

/// per-mount state every node holds a reference to
pub(crate) struct FsContext {
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) options: FsOptions,
    next_ino: AtomicU64,
    /// set when every node reports the commit time
    fixed_time: Option<SystemTime>,
}

impl FsContext {
    pub(crate) fn new(
        store: Arc<dyn ObjectStore>,
        options: FsOptions,
        fixed_time: Option<SystemTime>,
    ) -> Self {
        Self {
            store,
            options,
            next_ino: AtomicU64::new(0),
            fixed_time,
        }
    }

    /// next inode id; 0 is never handed out
    pub(crate) fn allocate_ino(&self) -> u64 {
        self.next_ino.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// keep every later id above `floor` (host inodes pinned by the root)
    pub(crate) fn reserve_ino(&self, floor: u64) {
        self.next_ino.fetch_max(floor, Ordering::Relaxed);
    }

    /// timestamp for a node created now
    pub(crate) fn node_time(&self) -> SystemTime {
        self.fixed_time.unwrap_or_else(SystemTime::now)
    }

    pub(crate) fn spool_dir(&self) -> Result<&Path> {
        self.options
            .spool_dir
            .as_deref()
            .ok_or(Error::MissingSpoolDir)
    }
}

/// one revision mounted as a read-only filesystem
pub struct TreeFs {
    ctx: Arc<FsContext>,
    commit: Hash,
    tree: Hash,
    root: DirNode,
}

impl TreeFs {
    /// resolve `revision` and build the root directory for its tree
    ///
    /// the root tree is decoded here, so a dangling commit or tree fails
    /// the mount instead of the first call.
    pub fn mount(store: Arc<dyn ObjectStore>, revision: &str, options: FsOptions) -> Result<Self> {
        let commit_hash = store.resolve_revision(revision)?;
        let commit = store.read_commit(&commit_hash)?;
        let tree = store.decode_tree(&commit.tree)?;

        if options.disk {
            let spool = options
                .spool_dir
                .as_deref()
                .ok_or(Error::MissingSpoolDir)?;
            fs::create_dir_all(spool).with_path(spool)?;
        }

        let fixed_time = match options.timestamps {
            TimestampSource::Mount => None,
            TimestampSource::Commit => Some(commit.time()),
        };
        let ctx = Arc::new(FsContext::new(store, options, fixed_time));

        let root = build_root(&ctx, commit.tree);
        root.seed(tree);

        info!(
            revision,
            commit = %commit_hash,
            tree = %commit.tree,
            lazy = ctx.options.lazy,
            disk = ctx.options.disk,
            "mounted revision"
        );

        Ok(Self {
            ctx,
            commit: commit_hash,
            tree: commit.tree,
            root,
        })
    }

    pub fn root(&self) -> &DirNode {
        &self.root
    }

    /// mounted commit
    pub fn commit(&self) -> Hash {
        self.commit
    }

    /// root tree of the mounted commit
    pub fn tree(&self) -> Hash {
        self.tree
    }

    pub fn options(&self) -> &FsOptions {
        &self.ctx.options
    }

    pub fn allocate_ino(&self) -> u64 {
        self.ctx.allocate_ino()
    }
}

fn build_root(ctx: &Arc<FsContext>, tree: Hash) -> DirNode {
    let info = NodeInfo::new(ctx, "", libc::S_IFDIR as u32 | 0o755, tree);
    let Some(redirect) = &ctx.options.worktree else {
        return DirNode::new(info);
    };

    let marker = Some(redirect.marker_content());
    match host_entries(redirect) {
        Ok((this, parent)) => {
            ctx.reserve_ino(this.ino.max(parent.ino));
            let info = info.with_ino(this.ino).with_mode(this.mode);
            let parents = vec![
                DirEntry::new(this.ino, this.mode, "."),
                DirEntry::new(parent.ino, parent.mode, ".."),
            ];
            DirNode::root(info, parents, marker)
        }
        Err(e) => {
            error!(
                mount_point = %redirect.mount_point.display(),
                error = %e,
                "cannot stat mount point, omitting navigation entries"
            );
            DirNode::root(info, Vec::new(), marker)
        }
    }
}

/// host metadata of the mount point and its parent
fn host_entries(redirect: &WorktreeRedirect) -> Result<(FileMetadata, FileMetadata)> {
    let mount_point = &redirect.mount_point;
    let parent = mount_point.parent().unwrap_or(mount_point);
    Ok((
        FileMetadata::from_path(mount_point)?,
        FileMetadata::from_path(parent)?,
    ))
}

/// strip leading and trailing separators
fn normalize(path: &str) -> &str {
    path.trim_matches('/')
}

fn logged<T>(op: &'static str, path: &str, result: FsResult<T>) -> FsResult<T> {
    match &result {
        Ok(_) => debug!(op, path, "ok"),
        Err(e) => debug!(op, path, error = %e, "failed"),
    }
    result
}

impl PathFs for TreeFs {
    fn get_attr(&self, path: &str) -> FsResult<FileAttr> {
        let path = normalize(path);
        logged("getattr", path, self.root.get_attr(path))
    }

    fn open_dir(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        let path = normalize(path);
        logged("opendir", path, self.root.open_dir(path))
    }

    fn open(&self, path: &str, flags: OFlag) -> FsResult<FileHandle> {
        let path = normalize(path);
        logged("open", path, self.root.open(path, flags))
    }

    fn read_link(&self, path: &str) -> FsResult<OsString> {
        let path = normalize(path);
        logged("readlink", path, self.root.read_link(path))
    }

    fn access(&self, path: &str, _mode: AccessFlags) -> FsResult<()> {
        let path = normalize(path);
        logged("access", path, self.root.access(path))
    }

    fn list_xattr(&self, path: &str) -> FsResult<Vec<String>> {
        let path = normalize(path);
        logged("listxattr", path, self.root.list_xattr(path))
    }

    fn get_xattr(&self, path: &str, name: &str) -> FsResult<Vec<u8>> {
        let path = normalize(path);
        logged("getxattr", path, self.root.get_xattr(path, name))
    }
}
