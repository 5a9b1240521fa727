use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;

use crate::error::{Error, IoResultExt, Result};
use crate::hash::{compute_blob_hash, BlobHasher, Hash};
use crate::repo::Repo;

use super::encoded::{install, object_path, open_object, temp_path};

/// zstd level used for blob storage
const BLOB_COMPRESSION_LEVEL: i32 = 3;

/// write a blob to the object store
///
/// the hash is computed over the uncompressed content; the stored file is
/// the zstd-compressed content.
pub fn write_blob(repo: &Repo, content: &[u8]) -> Result<Hash> {
    let hash = compute_blob_hash(content);

    if blob_exists(repo, &hash) {
        return Ok(hash);
    }

    let compressed = zstd::encode_all(content, BLOB_COMPRESSION_LEVEL).with_path("<zstd>")?;

    let tmp_path = temp_path(repo);
    {
        let mut tmp_file = File::create(&tmp_path).with_path(&tmp_path)?;
        tmp_file.write_all(&compressed).with_path(&tmp_path)?;
        tmp_file.sync_all().with_path(&tmp_path)?;
    }

    install(&tmp_path, &blob_path(repo, &hash))?;
    Ok(hash)
}

/// write a blob with streaming content (for large files)
///
/// returns the hash and the number of uncompressed bytes consumed.
pub fn write_blob_streaming<R: Read>(repo: &Repo, reader: &mut R) -> Result<(Hash, u64)> {
    let tmp_path = temp_path(repo);

    // compress into temp file while computing hash
    let mut hasher = BlobHasher::new();
    let mut total = 0u64;
    {
        let tmp_file = File::create(&tmp_path).with_path(&tmp_path)?;
        let mut encoder =
            zstd::Encoder::new(tmp_file, BLOB_COMPRESSION_LEVEL).with_path(&tmp_path)?;
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf).with_path(&tmp_path)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            encoder.write_all(&buf[..n]).with_path(&tmp_path)?;
            total += n as u64;
        }
        let tmp_file = encoder.finish().with_path(&tmp_path)?;
        tmp_file.sync_all().with_path(&tmp_path)?;
    }

    let hash = hasher.finalize();
    if blob_exists(repo, &hash) {
        fs::remove_file(&tmp_path).with_path(&tmp_path)?;
        return Ok((hash, total));
    }

    install(&tmp_path, &blob_path(repo, &hash))?;
    Ok((hash, total))
}

fn blob_path(repo: &Repo, hash: &Hash) -> PathBuf {
    object_path(&repo.blobs_path(), hash)
}

/// whether the store already holds this content
pub fn blob_exists(repo: &Repo, hash: &Hash) -> bool {
    blob_path(repo, hash).is_file()
}

/// open a blob for streaming decompression
pub fn open_blob(repo: &Repo, hash: &Hash) -> Result<Box<dyn Read + Send>> {
    let path = blob_path(repo, hash);
    let file = open_object(&path, hash)?;

    let decoder = zstd::Decoder::with_buffer(BufReader::new(file)).with_path(&path)?;
    Ok(Box::new(decoder))
}

/// read and verify blob content
pub fn read_blob(repo: &Repo, hash: &Hash) -> Result<Vec<u8>> {
    let mut reader = open_blob(repo, hash)?;
    let mut content = Vec::new();
    reader
        .read_to_end(&mut content)
        .with_path(blob_path(repo, hash))?;

    if compute_blob_hash(&content) != *hash {
        return Err(Error::CorruptObject(*hash));
    }
    Ok(content)
}
