use crate::error::Result;
use crate::hash::Hash;
use crate::repo::Repo;
use crate::types::Commit;

use super::encoded::{read_encoded, write_encoded};

/// store a commit; identical commits share one object
pub fn write_commit(repo: &Repo, commit: &Commit) -> Result<Hash> {
    write_encoded(repo, &repo.commits_path(), commit)
}

/// load and verify a commit
pub fn read_commit(repo: &Repo, hash: &Hash) -> Result<Commit> {
    read_encoded(&repo.commits_path(), hash)
}
