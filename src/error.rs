use std::path::PathBuf;

use nix::errno::Errno;

use crate::Hash;

/// error type for zubfs store and mount operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("repository not found at {0}")]
    NoRepo(PathBuf),

    #[error("repository already exists at {0}")]
    RepoExists(PathBuf),

    #[error("ref not found: {0}")]
    RefNotFound(String),

    #[error("invalid ref name: {0}")]
    InvalidRef(String),

    #[error("cannot resolve revision: {0}")]
    RevisionNotFound(String),

    #[error("ambiguous revision: {0}")]
    AmbiguousRevision(String),

    #[error("object not found: {0}")]
    ObjectNotFound(Hash),

    #[error("corrupt object: hash mismatch for {0}")]
    CorruptObject(Hash),

    #[error("lock contention on repository")]
    LockContention,

    #[error("invalid tree entry name: {0}")]
    InvalidEntryName(String),

    #[error("duplicate tree entry name: {0}")]
    DuplicateEntryName(String),

    #[error("spool directory required for disk materialization")]
    MissingSpoolDir,

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cbor serialization error: {0}")]
    CborEncode(#[from] ciborium::ser::Error<std::io::Error>),

    #[error("cbor deserialization error: {0}")]
    CborDecode(#[from] ciborium::de::Error<std::io::Error>),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("invalid hash hex: {0}")]
    InvalidHashHex(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}

/// status of a single filesystem call
///
/// these are ordinary results handed back to the dispatcher; none of them
/// tear down the mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,

    #[error("not a directory")]
    NotADirectory,

    #[error("is a directory")]
    IsADirectory,

    #[error("permission denied")]
    PermissionDenied,

    #[error("invalid argument")]
    InvalidArgument,

    #[error("input/output error")]
    Io,

    #[error("no such attribute")]
    NoSuchAttribute,
}

impl FsError {
    /// errno reported to the kernel for this status
    pub fn errno(self) -> Errno {
        match self {
            FsError::NotFound => Errno::ENOENT,
            FsError::NotADirectory => Errno::ENOTDIR,
            FsError::IsADirectory => Errno::EISDIR,
            FsError::PermissionDenied => Errno::EPERM,
            FsError::InvalidArgument => Errno::EINVAL,
            FsError::Io => Errno::EIO,
            FsError::NoSuchAttribute => Errno::ENODATA,
        }
    }
}

pub type FsResult<T> = std::result::Result<T, FsError>;
