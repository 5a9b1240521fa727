//! structured objects (trees, commits): CBOR, zstd, hashed compressed

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, IoResultExt, Result};
use crate::hash::{compute_compressed_hash, Hash};
use crate::repo::Repo;

/// zstd level for structured objects
const LEVEL: i32 = 3;

/// `<kind_dir>/<xx>/<rest>` for an object hash
pub(crate) fn object_path(kind_dir: &Path, hash: &Hash) -> PathBuf {
    let (dir, file) = hash.to_path_components();
    kind_dir.join(dir).join(file)
}

/// fresh temp path inside the repository
pub(crate) fn temp_path(repo: &Repo) -> PathBuf {
    repo.tmp_path().join(uuid::Uuid::new_v4().to_string())
}

/// open an object file; a missing file is a missing object
pub(crate) fn open_object(path: &Path, hash: &Hash) -> Result<File> {
    File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::ObjectNotFound(*hash),
        _ => Error::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })
}

/// move a finished temp file into place and sync its directory
pub(crate) fn install(tmp_path: &Path, object_path: &Path) -> Result<()> {
    let Some(dir) = object_path.parent() else {
        return Ok(());
    };
    fs::create_dir_all(dir).with_path(dir)?;
    fs::rename(tmp_path, object_path).with_path(object_path)?;
    File::open(dir).with_path(dir)?.sync_all().with_path(dir)
}

/// encode and store `value` under `kind_dir`; existing objects are kept
pub(crate) fn write_encoded<T: Serialize>(repo: &Repo, kind_dir: &Path, value: &T) -> Result<Hash> {
    let mut cbor = Vec::new();
    ciborium::into_writer(value, &mut cbor)?;
    let compressed = zstd::encode_all(&cbor[..], LEVEL).with_path("<zstd>")?;

    let hash = compute_compressed_hash(&compressed);
    let path = object_path(kind_dir, &hash);
    if path.exists() {
        return Ok(hash);
    }

    let tmp = temp_path(repo);
    let mut file = File::create(&tmp).with_path(&tmp)?;
    file.write_all(&compressed).with_path(&tmp)?;
    file.sync_all().with_path(&tmp)?;
    drop(file);

    install(&tmp, &path)?;
    Ok(hash)
}

/// load, verify and decode the object `hash` under `kind_dir`
pub(crate) fn read_encoded<T: DeserializeOwned>(kind_dir: &Path, hash: &Hash) -> Result<T> {
    let path = object_path(kind_dir, hash);
    let compressed = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(Error::ObjectNotFound(*hash)),
        Err(e) => return Err(Error::Io { path, source: e }),
    };

    if compute_compressed_hash(&compressed) != *hash {
        return Err(Error::CorruptObject(*hash));
    }

    let cbor = zstd::decode_all(&compressed[..]).with_path(&path)?;
    Ok(ciborium::from_reader(&cbor[..])?)
}
