use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::repo::Repo;
use crate::types::Tree;

use super::encoded::{read_encoded, write_encoded};

/// store a tree; its hash is taken over the compressed encoding
pub fn write_tree(repo: &Repo, tree: &Tree) -> Result<Hash> {
    write_encoded(repo, &repo.trees_path(), tree)
}

/// load and verify a tree
///
/// entry names are re-validated, so a tree object that would not survive
/// `Tree::new` is reported as corrupt.
pub fn read_tree(repo: &Repo, hash: &Hash) -> Result<Tree> {
    let tree: Tree = read_encoded(&repo.trees_path(), hash)?;
    Tree::new(tree.into_entries()).map_err(|_| Error::CorruptObject(*hash))
}
