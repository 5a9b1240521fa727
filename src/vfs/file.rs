use std::fs::{self, File};
use std::io::{self, Write};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;

use nix::fcntl::OFlag;
use nix::libc;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::attr::{FileAttr, FileKind};
use super::node::NodeInfo;
use super::root::FsContext;
use super::wants_write;
use crate::error::{FsError, FsResult, IoResultExt, Result};
use crate::hash::{compute_blob_hash, Hash};

/// a regular file backed by a blob
pub struct FileNode {
    info: NodeInfo,
    size: u64,
}

impl FileNode {
    pub(crate) fn new(info: NodeInfo, size: u64) -> Self {
        Self { info, size }
    }

    pub fn info(&self) -> &NodeInfo {
        &self.info
    }

    /// declared blob length
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn attr(&self) -> FileAttr {
        self.info.attr(FileKind::RegularFile, self.size, 1)
    }

    /// fresh content handle; nothing is shared between opens
    pub fn open(&self, flags: OFlag) -> FsResult<FileHandle> {
        if wants_write(flags) {
            return Err(FsError::PermissionDenied);
        }

        let source = BlobSource {
            ctx: Arc::clone(self.info.ctx()),
            hash: *self.info.hash(),
        };
        let handle = FileHandle::deferred(source);
        if !self.info.ctx().options.lazy {
            handle.load()?;
        }
        Ok(handle)
    }
}

/// synthetic read-only file with fixed in-memory content
pub struct RedirectNode {
    info: NodeInfo,
    content: Arc<[u8]>,
}

impl RedirectNode {
    pub(crate) fn new(ctx: &Arc<FsContext>, name: &str, content: Vec<u8>) -> Self {
        let hash = compute_blob_hash(&content);
        Self {
            info: NodeInfo::new(ctx, name, libc::S_IFREG as u32 | 0o644, hash),
            content: content.into(),
        }
    }

    pub fn info(&self) -> &NodeInfo {
        &self.info
    }

    pub fn attr(&self) -> FileAttr {
        self.info.attr(FileKind::RegularFile, self.content.len() as u64, 1)
    }

    /// handle over the fixed content; the store is never consulted
    pub fn open(&self, flags: OFlag) -> FsResult<FileHandle> {
        if wants_write(flags) {
            return Err(FsError::PermissionDenied);
        }
        Ok(FileHandle::ready(Content::Fixed(Arc::clone(&self.content))))
    }
}

/// blob a handle materializes from
struct BlobSource {
    ctx: Arc<FsContext>,
    hash: Hash,
}

impl BlobSource {
    fn materialize(&self) -> Result<Content> {
        if self.ctx.options.disk {
            self.spool().map(Content::Disk)
        } else {
            self.ctx.store.read_blob(&self.hash).map(Content::Memory)
        }
    }

    /// open the spool file for this blob, writing it first if absent
    fn spool(&self) -> Result<File> {
        let dir = self.ctx.spool_dir()?;
        let path = dir.join(self.hash.to_hex());

        if !path.exists() {
            let tmp = dir.join(format!(".{}.{}.tmp", self.hash.to_hex(), uuid::Uuid::new_v4()));
            if let Err(e) = self.write_spool(&tmp, &path) {
                let _ = fs::remove_file(&tmp);
                return Err(e);
            }
            debug!(blob = %self.hash, path = %path.display(), "spooled blob");
        }

        File::open(&path).with_path(&path)
    }

    fn write_spool(&self, tmp: &Path, path: &Path) -> Result<()> {
        let mut reader = self.ctx.store.open_blob(&self.hash)?;
        let mut file = File::create(tmp).with_path(tmp)?;
        io::copy(&mut reader, &mut file).with_path(tmp)?;
        file.flush().with_path(tmp)?;
        file.sync_all().with_path(tmp)?;

        // same hash, same bytes: losing a rename race is harmless
        fs::rename(tmp, path).with_path(path)
    }
}

/// materialized blob content
enum Content {
    Memory(Vec<u8>),
    Disk(File),
    Fixed(Arc<[u8]>),
}

impl Content {
    fn read_at(&self, offset: u64, size: usize) -> io::Result<Vec<u8>> {
        match self {
            Content::Memory(data) => Ok(clamp(data, offset, size).to_vec()),
            Content::Fixed(data) => Ok(clamp(data, offset, size).to_vec()),
            Content::Disk(file) => {
                let len = file.metadata()?.len();
                if offset >= len {
                    return Ok(Vec::new());
                }
                let want = usize::try_from(len - offset).map_or(size, |avail| avail.min(size));
                let mut buf = vec![0u8; want];
                let mut filled = 0;
                while filled < want {
                    match file.read_at(&mut buf[filled..], offset + filled as u64) {
                        Ok(0) => break,
                        Ok(n) => filled += n,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e),
                    }
                }
                buf.truncate(filled);
                Ok(buf)
            }
        }
    }
}

/// `min(size, max(0, len - offset))` bytes starting at offset
fn clamp(data: &[u8], offset: u64, size: usize) -> &[u8] {
    let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
    let end = start.saturating_add(size).min(data.len());
    &data[start..end]
}

/// per-open content handle
///
/// starts unopened; the first read materializes the blob and later reads
/// reuse it. dropping the handle (or [`FileHandle::release`]) frees it.
pub struct FileHandle {
    source: Option<BlobSource>,
    content: Mutex<Option<Content>>,
}

impl FileHandle {
    fn deferred(source: BlobSource) -> Self {
        Self {
            source: Some(source),
            content: Mutex::new(None),
        }
    }

    fn ready(content: Content) -> Self {
        Self {
            source: None,
            content: Mutex::new(Some(content)),
        }
    }

    /// whether content has been materialized
    pub fn is_loaded(&self) -> bool {
        self.content.lock().is_some()
    }

    /// read up to `size` bytes at `offset`; short at end of content
    pub fn read(&self, offset: u64, size: usize) -> FsResult<Vec<u8>> {
        let mut guard = self.content.lock();
        let content = match &mut *guard {
            Some(content) => content,
            empty => empty.insert(self.materialize()?),
        };

        content.read_at(offset, size).map_err(|e| {
            warn!(error = %e, "cannot read materialized content");
            FsError::Io
        })
    }

    /// release the handle
    pub fn release(self) {}

    fn load(&self) -> FsResult<()> {
        let mut guard = self.content.lock();
        if guard.is_none() {
            *guard = Some(self.materialize()?);
        }
        Ok(())
    }

    fn materialize(&self) -> FsResult<Content> {
        let Some(source) = &self.source else {
            return Err(FsError::Io);
        };

        source.materialize().map_err(|e| {
            warn!(blob = %source.hash, error = %e, "cannot materialize blob");
            FsError::Io
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::vfs::testutil::{fixture, CountingStore};
    use crate::vfs::FsOptions;
    use tempfile::tempdir;

    #[test]
    fn test_clamp() {
        let data = b"hello world\n";
        assert_eq!(clamp(data, 0, 5), b"hello");
        assert_eq!(clamp(data, 6, 100), b"world\n");
        assert_eq!(clamp(data, 12, 4), b"");
        assert_eq!(clamp(data, 100, 4), b"");
        assert_eq!(clamp(data, u64::MAX, usize::MAX), b"");
        assert_eq!(clamp(b"", 0, 10), b"");
    }

    #[test]
    fn test_lazy_read() {
        let fx = fixture();
        let store = Arc::new(CountingStore::new(&fx.repo_path()));
        let mnt = fx.mount_with(store.clone(), FsOptions::default());

        let handle = mnt.root().open("a.txt", OFlag::O_RDONLY).unwrap();
        assert!(!handle.is_loaded());
        assert_eq!(store.blob_opens.load(Ordering::SeqCst), 0);

        assert_eq!(handle.read(0, 5).unwrap(), b"hello");
        assert_eq!(handle.read(6, 100).unwrap(), b"world\n");
        assert_eq!(handle.read(12, 4).unwrap(), b"");
        assert_eq!(handle.read(1000, 4).unwrap(), b"");
        assert!(handle.is_loaded());
        assert_eq!(store.blob_opens.load(Ordering::SeqCst), 1);
        handle.release();

        // a fresh open starts unopened again
        let again = mnt.root().open("a.txt", OFlag::O_RDONLY).unwrap();
        assert!(!again.is_loaded());
        assert_eq!(again.read(0, 100).unwrap(), b"hello world\n");
        assert_eq!(store.blob_opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_eager_open() {
        let fx = fixture();
        let store = Arc::new(CountingStore::new(&fx.repo_path()));
        let mnt = fx.mount_with(
            store.clone(),
            FsOptions {
                lazy: false,
                ..FsOptions::default()
            },
        );

        let handle = mnt.root().open("sub/b.txt", OFlag::O_RDONLY).unwrap();
        assert!(handle.is_loaded());
        assert_eq!(store.blob_opens.load(Ordering::SeqCst), 1);
        assert_eq!(handle.read(0, 100).unwrap(), b"nested\n");
        assert_eq!(store.blob_opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lazy_failure_surfaces_on_read() {
        let fx = fixture();
        let store = Arc::new(CountingStore::new(&fx.repo_path()));
        let mnt = fx.mount_with(store.clone(), FsOptions::default());

        store.fail_blobs.store(true, Ordering::SeqCst);
        let handle = mnt.root().open("a.txt", OFlag::O_RDONLY).unwrap();
        assert_eq!(handle.read(0, 5), Err(FsError::Io));
        assert!(!handle.is_loaded());

        store.fail_blobs.store(false, Ordering::SeqCst);
        assert_eq!(handle.read(0, 5).unwrap(), b"hello");
    }

    #[test]
    fn test_eager_failure_surfaces_on_open() {
        let fx = fixture();
        let store = Arc::new(CountingStore::new(&fx.repo_path()));
        let mnt = fx.mount_with(
            store.clone(),
            FsOptions {
                lazy: false,
                ..FsOptions::default()
            },
        );

        store.fail_blobs.store(true, Ordering::SeqCst);
        assert!(matches!(
            mnt.root().open("a.txt", OFlag::O_RDONLY),
            Err(FsError::Io)
        ));
    }

    #[test]
    fn test_disk_spool_dedup() {
        let fx = fixture();
        let spool = tempdir().unwrap();
        let store = Arc::new(CountingStore::new(&fx.repo_path()));
        let mnt = fx.mount_with(
            store.clone(),
            FsOptions {
                disk: true,
                spool_dir: Some(spool.path().to_path_buf()),
                ..FsOptions::default()
            },
        );

        // two paths, identical content
        let a = mnt.root().open("a.txt", OFlag::O_RDONLY).unwrap();
        let dup = mnt.root().open("dup.txt", OFlag::O_RDONLY).unwrap();
        assert_eq!(a.read(0, 100).unwrap(), b"hello world\n");
        assert_eq!(dup.read(6, 5).unwrap(), b"world");
        assert_eq!(store.blob_opens.load(Ordering::SeqCst), 1);

        let files: Vec<_> = fs::read_dir(spool.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        let hex = compute_blob_hash(b"hello world\n").to_hex();
        assert_eq!(files, vec![hex.clone()]);
        assert_eq!(
            fs::read(spool.path().join(&hex)).unwrap(),
            b"hello world\n"
        );
        assert_eq!(a.read(100, 5).unwrap(), b"");
    }

    #[test]
    fn test_disk_read_clamped_to_content() {
        let fx = fixture();
        let spool = tempdir().unwrap();
        let mnt = fx.mount(FsOptions {
            disk: true,
            spool_dir: Some(spool.path().to_path_buf()),
            ..FsOptions::default()
        });

        let handle = mnt.root().open("a.txt", OFlag::O_RDONLY).unwrap();
        assert_eq!(handle.read(0, usize::MAX).unwrap(), b"hello world\n");
        assert_eq!(handle.read(6, usize::MAX).unwrap(), b"world\n");
        assert_eq!(handle.read(u64::MAX, 4).unwrap(), b"");
        assert_eq!(handle.read(12, usize::MAX).unwrap(), b"");
    }

    #[test]
    fn test_disk_spool_concurrent_population() {
        let fx = fixture();
        let spool = tempdir().unwrap();
        let mnt = fx.mount(FsOptions {
            disk: true,
            spool_dir: Some(spool.path().to_path_buf()),
            ..FsOptions::default()
        });

        let root = mnt.root();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let handle = root.open("tool.sh", OFlag::O_RDONLY).unwrap();
                    assert_eq!(handle.read(0, 2).unwrap(), b"#!");
                });
            }
        });

        let count = fs::read_dir(spool.path()).unwrap().count();
        assert_eq!(count, 1);
    }

    /// whole content read back in small uneven chunks
    fn read_chunked(mnt: &crate::vfs::TreeFs, path: &str) -> Vec<u8> {
        let handle = mnt.root().open(path, OFlag::O_RDONLY).unwrap();
        let mut out = Vec::new();
        loop {
            let chunk = handle.read(out.len() as u64, 7).unwrap();
            if chunk.is_empty() {
                break;
            }
            out.extend_from_slice(&chunk);
        }
        handle.release();
        out
    }

    #[test]
    fn test_materialization_modes_agree() {
        let fx = fixture();
        let spool = tempdir().unwrap();
        let body: Vec<u8> = (0..70_000u32).map(|i| (i % 251) as u8).collect();
        let blob = fx.blob(&body);
        let root = crate::types::Tree::new(vec![
            crate::types::TreeEntry::new(
                "big.bin",
                crate::types::EntryKind::regular(blob, body.len() as u64, 0o644),
            ),
            crate::types::TreeEntry::new(
                "small.txt",
                crate::types::EntryKind::regular(fx.blob(b"nested\n"), 7, 0o644),
            ),
        ])
        .unwrap();

        let lazy = fx.mount_tree(root.clone(), FsOptions::default());
        let eager = fx.mount_tree(
            root.clone(),
            FsOptions {
                lazy: false,
                ..FsOptions::default()
            },
        );
        let disk = fx.mount_tree(
            root,
            FsOptions {
                disk: true,
                spool_dir: Some(spool.path().to_path_buf()),
                ..FsOptions::default()
            },
        );

        for path in ["big.bin", "small.txt"] {
            let from_eager = read_chunked(&eager, path);
            assert_eq!(read_chunked(&lazy, path), from_eager, "{path}");
            assert_eq!(read_chunked(&disk, path), from_eager, "{path}");
        }
        assert_eq!(read_chunked(&eager, "big.bin"), body);
    }

    #[test]
    fn test_redirect_handle() {
        let fx = fixture();
        let mnt = fx.mount(FsOptions::default());
        let ctx = Arc::clone(mnt.root().info().ctx());

        let node = RedirectNode::new(&ctx, ".git", b"gitdir: /x\n".to_vec());
        assert_eq!(node.attr().size, 11);
        assert!(matches!(node.open(OFlag::O_RDWR), Err(FsError::PermissionDenied)));

        let handle = node.open(OFlag::O_RDONLY).unwrap();
        assert!(handle.is_loaded());
        assert_eq!(handle.read(0, 6).unwrap(), b"gitdir");
        assert_eq!(handle.read(8, 10).unwrap(), b"x\n");
    }
}
