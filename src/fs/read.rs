use std::fs::{self, Metadata};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};

use crate::error::{IoResultExt, Result};

/// file type of a host entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
}

impl FileType {
    pub fn from_metadata(meta: &Metadata) -> Self {
        let ft = meta.file_type();
        if ft.is_dir() {
            FileType::Directory
        } else if ft.is_symlink() {
            FileType::Symlink
        } else if ft.is_block_device() {
            FileType::BlockDevice
        } else if ft.is_char_device() {
            FileType::CharDevice
        } else if ft.is_fifo() {
            FileType::Fifo
        } else if ft.is_socket() {
            FileType::Socket
        } else {
            FileType::Regular
        }
    }
}

/// the parts of a host stat that snapshots and mounts care about
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub file_type: FileType,
    /// full mode bits, type included
    pub mode: u32,
    pub size: u64,
    pub ino: u64,
    pub dev: u64,
    /// device major/minor for block/char devices
    pub rdev: Option<(u32, u32)>,
}

impl FileMetadata {
    /// stat a path without following symlinks
    pub fn from_path(path: &Path) -> Result<Self> {
        let meta = fs::symlink_metadata(path).with_path(path)?;
        Ok(Self::from_std_metadata(&meta))
    }

    pub fn from_std_metadata(meta: &Metadata) -> Self {
        let file_type = FileType::from_metadata(meta);
        let rdev = match file_type {
            FileType::BlockDevice | FileType::CharDevice => {
                let rdev = meta.rdev();
                Some((
                    nix::sys::stat::major(rdev) as u32,
                    nix::sys::stat::minor(rdev) as u32,
                ))
            }
            _ => None,
        };

        Self {
            file_type,
            mode: meta.mode(),
            size: meta.len(),
            ino: meta.ino(),
            dev: meta.dev(),
            rdev,
        }
    }

    /// permission bits only
    pub fn perm(&self) -> u32 {
        self.mode & 0o7777
    }
}

/// read symlink target; the bytes are kept as the host returns them
pub fn read_symlink_target(path: &Path) -> Result<PathBuf> {
    fs::read_link(path).with_path(path)
}
