use nix::libc;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash::Hash;

/// a directory tree - collection of entries sorted by name
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// create a new tree, validating and sorting entries
    pub fn new(mut entries: Vec<TreeEntry>) -> Result<Self> {
        for entry in &entries {
            validate_entry_name(&entry.name)?;
        }

        // sort by name (byte-wise)
        entries.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));

        for window in entries.windows(2) {
            if window[0].name == window[1].name {
                return Err(Error::DuplicateEntryName(window[0].name.clone()));
            }
        }

        Ok(Self { entries })
    }

    /// create an empty tree
    pub fn empty() -> Self {
        Self { entries: vec![] }
    }

    /// get entries slice
    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    /// consume and return entries
    pub fn into_entries(self) -> Vec<TreeEntry> {
        self.entries
    }

    /// look up entry by name
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries
            .binary_search_by(|e| e.name.as_bytes().cmp(name.as_bytes()))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// is tree empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// validate an entry name
fn validate_entry_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidEntryName("empty name".to_string()));
    }
    if name.contains('/') {
        return Err(Error::InvalidEntryName(format!(
            "name contains '/': {}",
            name
        )));
    }
    if name.contains('\0') {
        return Err(Error::InvalidEntryName(format!(
            "name contains null byte: {}",
            name
        )));
    }
    if name == "." || name == ".." {
        return Err(Error::InvalidEntryName(format!("reserved name: {}", name)));
    }
    Ok(())
}

/// a single entry in a tree
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl TreeEntry {
    pub fn new(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// full POSIX mode bits (file type + permissions)
    pub fn mode(&self) -> u32 {
        self.kind.mode()
    }

    /// get the type name for error messages
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }
}

/// kind of tree entry with associated metadata
///
/// `mode` fields hold permission bits only; the file type is implied by the
/// variant and added back by [`EntryKind::mode`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryKind {
    /// regular file
    Regular { hash: Hash, size: u64, mode: u32 },

    /// symbolic link, target stored as blob content
    Symlink { hash: Hash, size: u64 },

    /// directory
    Directory { hash: Hash, mode: u32 },

    /// block device
    BlockDevice { major: u32, minor: u32, mode: u32 },

    /// character device
    CharDevice { major: u32, minor: u32, mode: u32 },

    /// named pipe (fifo)
    Fifo { mode: u32 },

    /// unix socket
    Socket { mode: u32 },
}

impl EntryKind {
    /// get the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            EntryKind::Regular { .. } => "regular",
            EntryKind::Symlink { .. } => "symlink",
            EntryKind::Directory { .. } => "directory",
            EntryKind::BlockDevice { .. } => "block_device",
            EntryKind::CharDevice { .. } => "char_device",
            EntryKind::Fifo { .. } => "fifo",
            EntryKind::Socket { .. } => "socket",
        }
    }

    /// full POSIX mode bits
    pub fn mode(&self) -> u32 {
        let (kind, perm) = match self {
            EntryKind::Regular { mode, .. } => (libc::S_IFREG, *mode),
            EntryKind::Symlink { .. } => (libc::S_IFLNK, 0o777),
            EntryKind::Directory { mode, .. } => (libc::S_IFDIR, *mode),
            EntryKind::BlockDevice { mode, .. } => (libc::S_IFBLK, *mode),
            EntryKind::CharDevice { mode, .. } => (libc::S_IFCHR, *mode),
            EntryKind::Fifo { mode } => (libc::S_IFIFO, *mode),
            EntryKind::Socket { mode } => (libc::S_IFSOCK, *mode),
        };
        kind as u32 | (perm & 0o7777)
    }

    /// get the hash if this entry has one (files, symlinks, directories)
    pub fn hash(&self) -> Option<&Hash> {
        match self {
            EntryKind::Regular { hash, .. } => Some(hash),
            EntryKind::Symlink { hash, .. } => Some(hash),
            EntryKind::Directory { hash, .. } => Some(hash),
            _ => None,
        }
    }

    /// declared content length (file bytes or link target length)
    pub fn size(&self) -> u64 {
        match self {
            EntryKind::Regular { size, .. } | EntryKind::Symlink { size, .. } => *size,
            _ => 0,
        }
    }

    /// create a regular file entry
    pub fn regular(hash: Hash, size: u64, mode: u32) -> Self {
        Self::Regular { hash, size, mode }
    }

    /// create a symlink entry
    pub fn symlink(hash: Hash, size: u64) -> Self {
        Self::Symlink { hash, size }
    }

    /// create a directory entry
    pub fn directory(hash: Hash, mode: u32) -> Self {
        Self::Directory { hash, mode }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_empty() {
        let t = Tree::empty();
        assert!(t.is_empty());
        assert_eq!(t.len(), 0);
    }

    #[test]
    fn test_tree_sorting() {
        let entries = vec![
            TreeEntry::new("zebra", EntryKind::regular(Hash::ZERO, 0, 0o644)),
            TreeEntry::new("alpha", EntryKind::regular(Hash::ZERO, 0, 0o644)),
            TreeEntry::new("beta", EntryKind::regular(Hash::ZERO, 0, 0o644)),
        ];
        let tree = Tree::new(entries).unwrap();
        let names: Vec<_> = tree.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta", "zebra"]);
    }

    #[test]
    fn test_tree_get() {
        let entries = vec![
            TreeEntry::new("alpha", EntryKind::regular(Hash::ZERO, 10, 0o644)),
            TreeEntry::new("beta", EntryKind::regular(Hash::ZERO, 20, 0o644)),
        ];
        let tree = Tree::new(entries).unwrap();

        assert!(tree.get("alpha").is_some());
        assert!(tree.get("beta").is_some());
        assert!(tree.get("gamma").is_none());
    }

    #[test]
    fn test_tree_rejects_bad_names() {
        for name in ["", "foo/bar", "foo\0bar", ".", ".."] {
            let entries = vec![TreeEntry::new(name, EntryKind::regular(Hash::ZERO, 0, 0o644))];
            assert!(Tree::new(entries).is_err(), "accepted {:?}", name);
        }
    }

    #[test]
    fn test_tree_rejects_duplicates() {
        let entries = vec![
            TreeEntry::new("same", EntryKind::regular(Hash::ZERO, 0, 0o644)),
            TreeEntry::new("same", EntryKind::regular(Hash::ZERO, 0, 0o644)),
        ];
        assert!(matches!(
            Tree::new(entries),
            Err(Error::DuplicateEntryName(_))
        ));
    }

    #[test]
    fn test_entry_mode_bits() {
        assert_eq!(
            EntryKind::regular(Hash::ZERO, 0, 0o755).mode(),
            libc::S_IFREG as u32 | 0o755
        );
        assert_eq!(
            EntryKind::directory(Hash::ZERO, 0o700).mode(),
            libc::S_IFDIR as u32 | 0o700
        );
        assert_eq!(
            EntryKind::symlink(Hash::ZERO, 4).mode(),
            libc::S_IFLNK as u32 | 0o777
        );
        assert_eq!(
            EntryKind::Fifo { mode: 0o644 }.mode() & libc::S_IFMT as u32,
            libc::S_IFIFO as u32
        );
        // type bits smuggled into the permission field are dropped
        assert_eq!(
            EntryKind::regular(Hash::ZERO, 0, libc::S_IFDIR as u32 | 0o644).mode(),
            libc::S_IFREG as u32 | 0o644
        );
    }

    #[test]
    fn test_entry_kind_hash_and_size() {
        let h = Hash::from_hex("abcdef0123456789abcdef0123456789abcdef0123456789abcdef0123456789")
            .unwrap();

        assert_eq!(EntryKind::regular(h, 7, 0o644).hash(), Some(&h));
        assert_eq!(EntryKind::symlink(h, 3).hash(), Some(&h));
        assert_eq!(EntryKind::directory(h, 0o755).hash(), Some(&h));
        assert!(EntryKind::Socket { mode: 0o755 }.hash().is_none());

        assert_eq!(EntryKind::regular(h, 7, 0o644).size(), 7);
        assert_eq!(EntryKind::symlink(h, 3).size(), 3);
        assert_eq!(EntryKind::directory(h, 0o755).size(), 0);
    }

    #[test]
    fn test_tree_cbor_determinism() {
        let entries1 = vec![
            TreeEntry::new("b", EntryKind::regular(Hash::ZERO, 0, 0o644)),
            TreeEntry::new("a", EntryKind::symlink(Hash::ZERO, 1)),
        ];
        let entries2 = vec![
            TreeEntry::new("a", EntryKind::symlink(Hash::ZERO, 1)),
            TreeEntry::new("b", EntryKind::regular(Hash::ZERO, 0, 0o644)),
        ];

        let mut bytes1 = Vec::new();
        let mut bytes2 = Vec::new();
        ciborium::into_writer(&Tree::new(entries1).unwrap(), &mut bytes1).unwrap();
        ciborium::into_writer(&Tree::new(entries2).unwrap(), &mut bytes2).unwrap();

        assert_eq!(bytes1, bytes2);
    }
}
