use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::hash::Hash;

/// a commit object pointing to a tree with metadata
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// root tree hash
    pub tree: Hash,
    /// parent commit hashes (empty for initial, 1 for linear, 2+ for merge)
    pub parents: Vec<Hash>,
    /// author identity
    pub author: String,
    /// unix timestamp (seconds since epoch)
    pub timestamp: i64,
    /// commit message
    pub message: String,
    /// optional key-value metadata (uses BTreeMap for deterministic serialization)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Commit {
    /// create a new commit
    pub fn new(
        tree: Hash,
        parents: Vec<Hash>,
        author: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tree,
            parents,
            author: author.into(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0),
            message: message.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// create a new commit with explicit timestamp
    pub fn with_timestamp(
        tree: Hash,
        parents: Vec<Hash>,
        author: impl Into<String>,
        timestamp: i64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tree,
            parents,
            author: author.into(),
            timestamp,
            message: message.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// add metadata key-value pair
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// first parent, followed by `~` and `^` revision suffixes
    pub fn first_parent(&self) -> Option<&Hash> {
        self.parents.first()
    }

    /// commit timestamp as a system time (pre-epoch clamps to the epoch)
    pub fn time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.timestamp.max(0) as u64)
    }
}
