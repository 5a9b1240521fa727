use std::fs::{self, File};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{IoResultExt, Result};
use crate::fs::{read_symlink_target, FileMetadata, FileType};
use crate::hash::Hash;
use crate::object::{write_blob, write_blob_streaming, write_commit, write_tree};
use crate::refs::{read_ref, ref_exists, write_ref};
use crate::repo::Repo;
use crate::types::{Commit, EntryKind, Tree, TreeEntry};

/// commit a directory tree to a ref
pub fn commit(
    repo: &Repo,
    source: &Path,
    ref_name: &str,
    message: Option<&str>,
    author: Option<&str>,
) -> Result<Hash> {
    commit_with_metadata(repo, source, ref_name, message, author, &[])
}

/// commit a directory tree to a ref with custom metadata
pub fn commit_with_metadata(
    repo: &Repo,
    source: &Path,
    ref_name: &str,
    message: Option<&str>,
    author: Option<&str>,
    metadata: &[(&str, &str)],
) -> Result<Hash> {
    let _lock = repo.lock()?;

    let tree_hash = commit_tree(repo, source)?;

    let parents = if ref_exists(repo, ref_name) {
        vec![read_ref(repo, ref_name)?]
    } else {
        vec![]
    };

    let mut commit = Commit::new(
        tree_hash,
        parents,
        author.unwrap_or("zubfs"),
        message.unwrap_or(""),
    );
    for (key, value) in metadata {
        commit = commit.with_metadata(*key, *value);
    }

    let commit_hash = write_commit(repo, &commit)?;
    write_ref(repo, ref_name, &commit_hash)?;

    info!(
        source = %source.display(),
        ref_name,
        commit = %commit_hash,
        tree = %tree_hash,
        "committed snapshot"
    );

    Ok(commit_hash)
}

/// record one directory (recursive helper)
fn commit_tree(repo: &Repo, dir: &Path) -> Result<Hash> {
    let mut entries = Vec::new();

    let mut dir_entries: Vec<_> = fs::read_dir(dir)
        .with_path(dir)?
        .collect::<std::io::Result<Vec<_>>>()
        .with_path(dir)?;
    dir_entries.sort_by_key(|e| e.file_name());

    for entry in dir_entries {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        let meta = FileMetadata::from_path(&path)?;
        let perm = meta.perm();

        let kind = match meta.file_type {
            FileType::Regular => {
                let mut file = File::open(&path).with_path(&path)?;
                let (hash, size) = write_blob_streaming(repo, &mut file)?;
                EntryKind::regular(hash, size, perm)
            }

            FileType::Symlink => {
                let target = read_symlink_target(&path)?;
                let bytes = target.as_os_str().as_bytes();
                let hash = write_blob(repo, bytes)?;
                EntryKind::symlink(hash, bytes.len() as u64)
            }

            FileType::Directory => EntryKind::directory(commit_tree(repo, &path)?, perm),

            FileType::BlockDevice => {
                let (major, minor) = meta.rdev.unwrap_or((0, 0));
                EntryKind::BlockDevice {
                    major,
                    minor,
                    mode: perm,
                }
            }

            FileType::CharDevice => {
                let (major, minor) = meta.rdev.unwrap_or((0, 0));
                EntryKind::CharDevice {
                    major,
                    minor,
                    mode: perm,
                }
            }

            FileType::Fifo => EntryKind::Fifo { mode: perm },

            FileType::Socket => EntryKind::Socket { mode: perm },
        };

        debug!(path = %path.display(), kind = kind.type_name(), "recorded entry");
        entries.push(TreeEntry::new(name, kind));
    }

    let tree = Tree::new(entries)?;
    write_tree(repo, &tree)
}
