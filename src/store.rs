//! read-side object access used by the virtual filesystem

use std::io::Read;

use crate::error::Result;
use crate::hash::Hash;
use crate::repo::Repo;
use crate::types::{Commit, Tree};

/// object lookups a mounted filesystem needs
///
/// implementations are shared between dispatcher worker threads, so every
/// method takes `&self`. object decode may block on local disk I/O.
pub trait ObjectStore: Send + Sync {
    /// resolve a revision (branch, tag, hash or prefix, with ancestry
    /// suffixes) to a commit hash
    fn resolve_revision(&self, revision: &str) -> Result<Hash>;

    /// decode a commit object
    fn read_commit(&self, hash: &Hash) -> Result<Commit>;

    /// decode a tree object
    fn decode_tree(&self, hash: &Hash) -> Result<Tree>;

    /// open a blob as a stream of its uncompressed bytes
    fn open_blob(&self, hash: &Hash) -> Result<Box<dyn Read + Send>>;

    /// root tree of a commit
    fn commit_tree(&self, hash: &Hash) -> Result<Hash> {
        Ok(self.read_commit(hash)?.tree)
    }

    /// read a whole blob into memory
    fn read_blob(&self, hash: &Hash) -> Result<Vec<u8>> {
        let mut reader = self.open_blob(hash)?;
        let mut content = Vec::new();
        reader
            .read_to_end(&mut content)
            .map_err(|source| crate::Error::Io {
                path: format!("<blob {}>", hash).into(),
                source,
            })?;
        Ok(content)
    }
}

impl ObjectStore for Repo {
    fn resolve_revision(&self, revision: &str) -> Result<Hash> {
        crate::refs::resolve_revision(self, revision)
    }

    fn read_commit(&self, hash: &Hash) -> Result<Commit> {
        crate::object::read_commit(self, hash)
    }

    fn decode_tree(&self, hash: &Hash) -> Result<Tree> {
        crate::object::read_tree(self, hash)
    }

    fn open_blob(&self, hash: &Hash) -> Result<Box<dyn Read + Send>> {
        crate::object::open_blob(self, hash)
    }

    fn read_blob(&self, hash: &Hash) -> Result<Vec<u8>> {
        crate::object::read_blob(self, hash)
    }
}
