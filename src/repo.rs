use std::fs::{self, File};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, IoResultExt, Result};

const CONFIG_FILE: &str = "config.toml";
const LOCK_FILE: &str = ".lock";

/// directories every repository carries, relative to its root
const LAYOUT: &[&str] = &[
    "objects/blobs",
    "objects/trees",
    "objects/commits",
    "refs/heads",
    "refs/tags",
    "tmp/spool",
];

/// an object store on disk, plus the `[fs]` defaults for mounting it
pub struct Repo {
    path: PathBuf,
    config: Config,
}

impl Repo {
    /// create the layout and a default config.toml at `path`
    pub fn init(path: &Path) -> Result<Self> {
        let config_path = path.join(CONFIG_FILE);
        if config_path.exists() {
            return Err(Error::RepoExists(path.to_path_buf()));
        }

        for dir in LAYOUT {
            let dir = path.join(dir);
            fs::create_dir_all(&dir).with_path(&dir)?;
        }

        let config = Config::default();
        config.save(&config_path)?;
        debug!(path = %path.display(), "initialized repository");

        Ok(Self {
            path: path.to_path_buf(),
            config,
        })
    }

    /// open a repository and load its config
    pub fn open(path: &Path) -> Result<Self> {
        let config_path = path.join(CONFIG_FILE);
        if !config_path.is_file() {
            return Err(Error::NoRepo(path.to_path_buf()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            config: Config::load(&config_path)?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn blobs_path(&self) -> PathBuf {
        self.path.join("objects/blobs")
    }

    pub fn trees_path(&self) -> PathBuf {
        self.path.join("objects/trees")
    }

    pub fn commits_path(&self) -> PathBuf {
        self.path.join("objects/commits")
    }

    /// branch refs
    pub fn refs_path(&self) -> PathBuf {
        self.path.join("refs/heads")
    }

    pub fn tags_path(&self) -> PathBuf {
        self.path.join("refs/tags")
    }

    /// staging area for atomic object and ref writes
    pub fn tmp_path(&self) -> PathBuf {
        self.path.join("tmp")
    }

    /// default spool directory for disk-materialized blobs
    pub fn spool_path(&self) -> PathBuf {
        self.tmp_path().join("spool")
    }

    /// take the writer lock; fails at once if another writer holds it
    ///
    /// readers (mounted filesystems) never lock: objects are immutable and
    /// installed by rename.
    pub fn lock(&self) -> Result<RepoLock> {
        let lock_path = self.path.join(LOCK_FILE);
        let file = File::create(&lock_path).with_path(&lock_path)?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(flock) => Ok(RepoLock { _flock: flock }),
            Err((_, Errno::EWOULDBLOCK)) => Err(Error::LockContention),
            Err((_, errno)) => Err(Error::Io {
                path: lock_path,
                source: errno.into(),
            }),
        }
    }
}

/// writer lock, released on drop
pub struct RepoLock {
    _flock: Flock<File>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::TimestampSource;
    use tempfile::tempdir;

    #[test]
    fn test_init_creates_layout() {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("repo");
        let repo = Repo::init(&repo_path).unwrap();

        for sub in LAYOUT {
            assert!(repo_path.join(sub).is_dir(), "{sub}");
        }
        assert!(repo_path.join(CONFIG_FILE).is_file());
        assert!(repo.spool_path().is_dir());
        assert!(repo.config().fs.lazy);
        assert!(!repo.config().fs.disk);
    }

    #[test]
    fn test_init_twice() {
        let dir = tempdir().unwrap();
        Repo::init(dir.path()).unwrap();
        assert!(matches!(Repo::init(dir.path()), Err(Error::RepoExists(_))));
    }

    #[test]
    fn test_open_missing() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            Repo::open(&dir.path().join("absent")),
            Err(Error::NoRepo(_))
        ));
    }

    #[test]
    fn test_open_reads_fs_defaults() {
        let dir = tempdir().unwrap();
        Repo::init(dir.path()).unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "[fs]\ndisk = true\ntimestamps = \"commit\"\n",
        )
        .unwrap();

        let repo = Repo::open(dir.path()).unwrap();
        assert_eq!(repo.path(), dir.path());
        assert!(repo.config().fs.disk);
        assert!(repo.config().fs.lazy);
        assert_eq!(repo.config().fs.timestamps, TimestampSource::Commit);
    }

    #[test]
    fn test_lock_is_exclusive() {
        let dir = tempdir().unwrap();
        let repo = Repo::init(dir.path()).unwrap();
        let other = Repo::open(dir.path()).unwrap();

        let held = repo.lock().unwrap();
        assert!(matches!(other.lock(), Err(Error::LockContention)));

        drop(held);
        assert!(other.lock().is_ok());
    }
}
