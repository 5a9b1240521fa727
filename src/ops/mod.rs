//! high-level operations on zubfs repositories

mod commit;

pub use commit::{commit, commit_with_metadata};
