use std::time::SystemTime;

use nix::libc;

/// node type as seen by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Directory,
    RegularFile,
    Symlink,
}

impl FileKind {
    /// classify POSIX mode bits; device, fifo and socket types have no
    /// representation here
    pub fn from_mode(mode: u32) -> Option<Self> {
        match mode & libc::S_IFMT as u32 {
            m if m == libc::S_IFDIR as u32 => Some(FileKind::Directory),
            m if m == libc::S_IFREG as u32 => Some(FileKind::RegularFile),
            m if m == libc::S_IFLNK as u32 => Some(FileKind::Symlink),
            _ => None,
        }
    }
}

/// attributes reported for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttr {
    pub ino: u64,
    pub kind: FileKind,
    /// full mode bits, type included
    pub mode: u32,
    pub size: u64,
    pub nlink: u32,
    pub mtime: SystemTime,
    pub atime: SystemTime,
    pub ctime: SystemTime,
}

impl FileAttr {
    /// permission bits only
    pub fn perm(&self) -> u32 {
        self.mode & 0o7777
    }
}

/// one entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: u64,
    pub mode: u32,
    pub name: String,
}

impl DirEntry {
    pub fn new(ino: u64, mode: u32, name: impl Into<String>) -> Self {
        Self {
            ino,
            mode,
            name: name.into(),
        }
    }

    pub fn kind(&self) -> Option<FileKind> {
        FileKind::from_mode(self.mode)
    }
}
