mod blob;
mod commit;
mod encoded;
mod tree;

pub use blob::{blob_exists, open_blob, read_blob, write_blob, write_blob_streaming};
pub use commit::{read_commit, write_commit};
pub use tree::{read_tree, write_tree};
