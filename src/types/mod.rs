mod commit;
mod tree;

pub use commit::Commit;
pub use tree::{EntryKind, Tree, TreeEntry};
