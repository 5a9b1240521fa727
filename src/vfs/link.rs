use std::ffi::OsString;
use std::os::unix::ffi::OsStringExt;
use std::sync::OnceLock;

use parking_lot::Mutex;
use tracing::warn;

use super::attr::{FileAttr, FileKind};
use super::node::NodeInfo;
use crate::error::{FsError, FsResult};

/// a symbolic link whose target is the content of a blob
pub struct LinkNode {
    info: NodeInfo,
    size: u64,
    fill: Mutex<()>,
    target: OnceLock<OsString>,
}

impl LinkNode {
    pub(crate) fn new(info: NodeInfo, size: u64) -> Self {
        Self {
            info,
            size,
            fill: Mutex::new(()),
            target: OnceLock::new(),
        }
    }

    pub fn info(&self) -> &NodeInfo {
        &self.info
    }

    pub fn attr(&self) -> FileAttr {
        self.info.attr(FileKind::Symlink, self.size, 1)
    }

    /// link target, decoded once; failures are retried on the next call
    ///
    /// targets are raw bytes, like any host symlink.
    pub fn read_link(&self) -> FsResult<OsString> {
        if let Some(target) = self.target.get() {
            return Ok(target.clone());
        }

        let _guard = self.fill.lock();
        if let Some(target) = self.target.get() {
            return Ok(target.clone());
        }

        let hash = self.info.hash();
        let bytes = self.info.ctx().store.read_blob(hash).map_err(|e| {
            warn!(link = %self.info.name(), blob = %hash, error = %e, "cannot read link target");
            FsError::Io
        })?;
        let target = OsString::from_vec(bytes);

        Ok(self.target.get_or_init(|| target).clone())
    }
}
