//! host filesystem inspection

pub mod read;

pub use read::{read_symlink_target, FileMetadata, FileType};
