//! shared fixtures for filesystem tests

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tempfile::{tempdir, TempDir};

use super::options::{FsOptions, DEFAULT_XATTR_NAME};
use super::root::{FsContext, TreeFs};
use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::object::{write_blob, write_commit, write_tree};
use crate::refs::write_ref;
use crate::repo::Repo;
use crate::store::ObjectStore;
use crate::types::{Commit, EntryKind, Tree, TreeEntry};

pub(crate) const FIXTURE_TIMESTAMP: i64 = 1_700_000_000;

/// store that holds nothing
struct NullStore;

impl ObjectStore for NullStore {
    fn resolve_revision(&self, revision: &str) -> Result<Hash> {
        Err(Error::RevisionNotFound(revision.to_string()))
    }

    fn read_commit(&self, hash: &Hash) -> Result<Commit> {
        Err(Error::ObjectNotFound(*hash))
    }

    fn decode_tree(&self, hash: &Hash) -> Result<Tree> {
        Err(Error::ObjectNotFound(*hash))
    }

    fn open_blob(&self, hash: &Hash) -> Result<Box<dyn Read + Send>> {
        Err(Error::ObjectNotFound(*hash))
    }
}

/// bare context for node-level tests
pub(crate) fn context() -> Arc<FsContext> {
    Arc::new(FsContext::new(
        Arc::new(NullStore),
        FsOptions::default(),
        None,
    ))
}

/// repo-backed store that counts decodes and can be made to fail
pub(crate) struct CountingStore {
    inner: Repo,
    pub tree_decodes: AtomicUsize,
    pub blob_opens: AtomicUsize,
    pub fail_blobs: AtomicBool,
    decode_delay: Duration,
    blob_delay: Duration,
}

impl CountingStore {
    pub fn new(repo_path: &Path) -> Self {
        Self {
            inner: Repo::open(repo_path).unwrap(),
            tree_decodes: AtomicUsize::new(0),
            blob_opens: AtomicUsize::new(0),
            fail_blobs: AtomicBool::new(false),
            decode_delay: Duration::ZERO,
            blob_delay: Duration::ZERO,
        }
    }

    pub fn with_decode_delay(mut self, delay: Duration) -> Self {
        self.decode_delay = delay;
        self
    }

    pub fn with_blob_delay(mut self, delay: Duration) -> Self {
        self.blob_delay = delay;
        self
    }
}

impl ObjectStore for CountingStore {
    fn resolve_revision(&self, revision: &str) -> Result<Hash> {
        self.inner.resolve_revision(revision)
    }

    fn read_commit(&self, hash: &Hash) -> Result<Commit> {
        self.inner.read_commit(hash)
    }

    fn decode_tree(&self, hash: &Hash) -> Result<Tree> {
        self.tree_decodes.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.decode_delay);
        self.inner.decode_tree(hash)
    }

    fn open_blob(&self, hash: &Hash) -> Result<Box<dyn Read + Send>> {
        if self.fail_blobs.load(Ordering::SeqCst) {
            return Err(Error::ObjectNotFound(*hash));
        }
        self.blob_opens.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.blob_delay);
        self.inner.open_blob(hash)
    }
}

/// a repository holding one commit on `main`:
///
/// ```text
/// a.txt     "hello world\n"
/// dup.txt   "hello world\n"
/// empty/
/// sub/b.txt "nested\n"
/// sub/link  -> ../a.txt
/// tool.sh   (0755)
/// ```
pub(crate) struct Fixture {
    _dir: TempDir,
    path: PathBuf,
    repo: Repo,
}

pub(crate) fn fixture() -> Fixture {
    let dir = tempdir().unwrap();
    let path = dir.path().join("repo");
    let repo = Repo::init(&path).unwrap();
    let fx = Fixture {
        _dir: dir,
        path,
        repo,
    };

    let hello = fx.blob(b"hello world\n");
    let tool = fx.blob(b"#!/bin/sh\necho hi\n");
    let nested = fx.blob(b"nested\n");
    let target = fx.blob(b"../a.txt");

    let sub = fx.tree(vec![
        TreeEntry::new("b.txt", EntryKind::regular(nested, 7, 0o644)),
        TreeEntry::new("link", EntryKind::symlink(target, 8)),
    ]);
    let empty = fx.tree(vec![]);

    let root = Tree::new(vec![
        TreeEntry::new("a.txt", EntryKind::regular(hello, 12, 0o644)),
        TreeEntry::new("dup.txt", EntryKind::regular(hello, 12, 0o644)),
        TreeEntry::new("empty", EntryKind::directory(empty, 0o755)),
        TreeEntry::new("sub", EntryKind::directory(sub, 0o755)),
        TreeEntry::new("tool.sh", EntryKind::regular(tool, 18, 0o755)),
    ])
    .unwrap();
    fx.commit(root, "main");

    fx
}

impl Fixture {
    pub fn repo_path(&self) -> PathBuf {
        self.path.clone()
    }

    pub fn repo(&self) -> &Repo {
        &self.repo
    }

    pub fn xattr_name(&self) -> String {
        DEFAULT_XATTR_NAME.to_string()
    }

    pub fn blob(&self, content: &[u8]) -> Hash {
        write_blob(&self.repo, content).unwrap()
    }

    pub fn tree(&self, entries: Vec<TreeEntry>) -> Hash {
        write_tree(&self.repo, &Tree::new(entries).unwrap()).unwrap()
    }

    /// commit a root tree and point `ref_name` at it
    pub fn commit(&self, root: Tree, ref_name: &str) -> Hash {
        let tree = write_tree(&self.repo, &root).unwrap();
        let commit = Commit::with_timestamp(tree, vec![], "test", FIXTURE_TIMESTAMP, "fixture");
        let hash = write_commit(&self.repo, &commit).unwrap();
        write_ref(&self.repo, ref_name, &hash).unwrap();
        hash
    }

    /// mount `main` straight from the repository
    pub fn mount(&self, options: FsOptions) -> TreeFs {
        self.mount_with(Arc::new(Repo::open(&self.path).unwrap()), options)
    }

    /// mount `main` through a custom store
    pub fn mount_with(&self, store: Arc<dyn ObjectStore>, options: FsOptions) -> TreeFs {
        TreeFs::mount(store, "main", options).unwrap()
    }

    /// commit `root` on a scratch ref and mount it
    pub fn mount_tree(&self, root: Tree, options: FsOptions) -> TreeFs {
        self.commit(root, "scratch");
        TreeFs::mount(Arc::new(Repo::open(&self.path).unwrap()), "scratch", options).unwrap()
    }
}
