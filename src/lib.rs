//! zubfs - mount committed trees as read-only filesystems
//!
//! a content-addressed object store with git-like revisions, plus a virtual
//! filesystem layer that serves any revision straight from the store without
//! checking it out.
//!
//! # Core concepts
//!
//! - **Blob**: file content, stored zstd-compressed
//! - **Tree**: a serialized directory listing (CBOR + zstd)
//! - **Commit**: a snapshot of a tree with metadata (CBOR + zstd)
//! - **Ref**: a named pointer to a commit
//! - **Revision**: a ref, tag, hash or hash prefix, optionally followed by
//!   `~N` / `^` ancestry suffixes
//!
//! # Hash format
//!
//! blob hash = SHA256(content), so identical content is stored once.
//! tree and commit hashes are taken over their compressed encoding.
//!
//! # Example usage
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use nix::fcntl::OFlag;
//! use zubfs::vfs::{FsOptions, PathFs, TreeFs};
//! use zubfs::{ops, Repo};
//!
//! let repo = Repo::init(Path::new("/path/to/repo")).unwrap();
//! ops::commit(&repo, Path::new("/source"), "main", Some("initial"), None).unwrap();
//!
//! let fs = TreeFs::mount(Arc::new(repo), "main", FsOptions::default()).unwrap();
//! let handle = fs.open("etc/hostname", OFlag::O_RDONLY).unwrap();
//! let bytes = handle.read(0, 4096).unwrap();
//! ```

mod config;
mod error;
mod hash;
mod object;
mod refs;
mod repo;
mod store;

pub mod fs;
pub mod ops;
pub mod types;
pub mod vfs;

pub use config::Config;
pub use error::{Error, FsError, FsResult, Result};
pub use hash::{compute_blob_hash, Hash};
pub use object::{
    blob_exists, open_blob, read_blob, read_commit, read_tree, write_blob, write_blob_streaming,
    write_commit, write_tree,
};
pub use refs::{
    delete_ref, list_refs, list_refs_matching, read_ref, read_tag, ref_exists, resolve_ref,
    resolve_revision, write_ref, write_tag,
};
pub use repo::Repo;
pub use store::ObjectStore;
pub use types::{Commit, EntryKind, Tree, TreeEntry};
