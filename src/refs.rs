use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, IoResultExt, Result};
use crate::hash::Hash;
use crate::object::read_commit;
use crate::repo::Repo;

/// shortest commit hash prefix accepted as a revision
const MIN_PREFIX_LEN: usize = 4;

/// write a branch ref (create or update)
///
/// ref_name can contain slashes for hierarchical refs like "x86_64/pkg/foo/1.0/outputs/bin"
pub fn write_ref(repo: &Repo, ref_name: &str, hash: &Hash) -> Result<()> {
    write_ref_file(repo, &repo.refs_path(), ref_name, hash)
}

/// write a tag (create or update)
pub fn write_tag(repo: &Repo, tag_name: &str, hash: &Hash) -> Result<()> {
    write_ref_file(repo, &repo.tags_path(), tag_name, hash)
}

/// read a branch ref
pub fn read_ref(repo: &Repo, ref_name: &str) -> Result<Hash> {
    read_ref_file(&repo.refs_path(), ref_name)
}

/// read a tag
pub fn read_tag(repo: &Repo, tag_name: &str) -> Result<Hash> {
    read_ref_file(&repo.tags_path(), tag_name)
}

/// delete a branch ref
pub fn delete_ref(repo: &Repo, ref_name: &str) -> Result<()> {
    validate_ref_name(ref_name)?;
    let ref_path = repo.refs_path().join(ref_name);

    fs::remove_file(&ref_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::RefNotFound(ref_name.to_string())
        } else {
            Error::Io {
                path: ref_path,
                source: e,
            }
        }
    })
}

/// resolve a ref or hash string to a hash
///
/// if the string looks like a hash (64 hex chars), parse it directly.
/// otherwise, look it up as a ref name.
pub fn resolve_ref(repo: &Repo, ref_or_hash: &str) -> Result<Hash> {
    if is_full_hash(ref_or_hash) {
        return Hash::from_hex(ref_or_hash);
    }
    read_ref(repo, ref_or_hash)
}

/// resolve a revision to a commit hash
///
/// a revision is a base followed by any number of `~N` / `^` suffixes, each
/// walking first parents. the base is tried as a full hash, a branch, a tag,
/// and finally a unique prefix of a stored commit hash.
pub fn resolve_revision(repo: &Repo, revision: &str) -> Result<Hash> {
    let (base, steps) = split_ancestry(revision)?;
    let mut hash = resolve_base(repo, base, revision)?;

    for _ in 0..steps {
        let commit = read_commit(repo, &hash)?;
        hash = *commit
            .first_parent()
            .ok_or_else(|| Error::RevisionNotFound(revision.to_string()))?;
    }

    Ok(hash)
}

/// list all branch refs
pub fn list_refs(repo: &Repo) -> Result<Vec<String>> {
    let refs_dir = repo.refs_path();
    let mut refs = Vec::new();

    if refs_dir.exists() {
        collect_refs(&refs_dir, &refs_dir, &mut refs)?;
    }

    refs.sort();
    Ok(refs)
}

/// list refs matching a glob pattern
pub fn list_refs_matching(repo: &Repo, pattern: &str) -> Result<Vec<String>> {
    let all_refs = list_refs(repo)?;
    let glob = glob::Pattern::new(pattern).map_err(|e| Error::InvalidRef(e.to_string()))?;

    Ok(all_refs.into_iter().filter(|r| glob.matches(r)).collect())
}

/// check if a branch ref exists
pub fn ref_exists(repo: &Repo, ref_name: &str) -> bool {
    repo.refs_path().join(ref_name).exists()
}

fn write_ref_file(repo: &Repo, base: &Path, ref_name: &str, hash: &Hash) -> Result<()> {
    validate_ref_name(ref_name)?;

    let ref_path = base.join(ref_name);

    if let Some(parent) = ref_path.parent() {
        fs::create_dir_all(parent).with_path(parent)?;
    }

    // atomic write: temp -> fsync -> rename
    let tmp_path = repo.tmp_path().join(uuid::Uuid::new_v4().to_string());
    {
        let mut tmp_file = File::create(&tmp_path).with_path(&tmp_path)?;
        writeln!(tmp_file, "{}", hash.to_hex()).with_path(&tmp_path)?;
        tmp_file.sync_all().with_path(&tmp_path)?;
    }

    fs::rename(&tmp_path, &ref_path).with_path(&ref_path)?;

    if let Some(parent) = ref_path.parent() {
        let dir = File::open(parent).with_path(parent)?;
        dir.sync_all().with_path(parent)?;
    }

    Ok(())
}

fn read_ref_file(base: &Path, ref_name: &str) -> Result<Hash> {
    let ref_path = base.join(ref_name);

    let content = fs::read_to_string(&ref_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::RefNotFound(ref_name.to_string())
        } else {
            Error::Io {
                path: ref_path.clone(),
                source: e,
            }
        }
    })?;

    Hash::from_hex(content.trim())
}

fn resolve_base(repo: &Repo, base: &str, revision: &str) -> Result<Hash> {
    // a directory of hierarchical refs is not itself a ref
    let named = validate_ref_name(base).is_ok();
    if is_full_hash(base) || (named && repo.refs_path().join(base).is_file()) {
        return resolve_ref(repo, base);
    }
    if named && repo.tags_path().join(base).is_file() {
        return read_tag(repo, base);
    }

    if base.len() >= MIN_PREFIX_LEN && base.chars().all(|c| c.is_ascii_hexdigit()) {
        return resolve_commit_prefix(repo, &base.to_ascii_lowercase(), revision);
    }

    Err(Error::RevisionNotFound(revision.to_string()))
}

/// find the single stored commit whose hex hash starts with prefix
fn resolve_commit_prefix(repo: &Repo, prefix: &str, revision: &str) -> Result<Hash> {
    let (dir, rest) = prefix.split_at(2);
    let bucket = repo.commits_path().join(dir);
    if !bucket.is_dir() {
        return Err(Error::RevisionNotFound(revision.to_string()));
    }

    let mut found = None;
    for entry in fs::read_dir(&bucket).with_path(&bucket)? {
        let entry = entry.with_path(&bucket)?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.starts_with(rest) {
            continue;
        }
        if found.is_some() {
            return Err(Error::AmbiguousRevision(revision.to_string()));
        }
        found = Some(Hash::from_hex(&format!("{}{}", dir, name))?);
    }

    found.ok_or_else(|| Error::RevisionNotFound(revision.to_string()))
}

/// split `base~2^` into ("base", 3)
fn split_ancestry(revision: &str) -> Result<(&str, usize)> {
    let invalid = || Error::RevisionNotFound(revision.to_string());

    let cut = revision.find(['~', '^']).unwrap_or(revision.len());
    let (base, mut rest) = revision.split_at(cut);
    if base.is_empty() {
        return Err(invalid());
    }

    let mut steps = 0usize;
    while let Some(op) = rest.chars().next() {
        if op != '~' && op != '^' {
            return Err(invalid());
        }
        rest = &rest[op.len_utf8()..];
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let (digits, tail) = rest.split_at(digits_end);
        rest = tail;

        let n = if digits.is_empty() {
            1
        } else {
            digits.parse::<usize>().map_err(|_| invalid())?
        };

        // only first parents are walked: `^0` is the commit itself
        if op == '^' && n > 1 {
            return Err(invalid());
        }
        steps = steps.checked_add(n).ok_or_else(invalid)?;
    }

    Ok((base, steps))
}

fn is_full_hash(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// recursively collect refs from directory
fn collect_refs(base: &PathBuf, dir: &PathBuf, refs: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir).with_path(dir)? {
        let entry = entry.with_path(dir)?;
        let path = entry.path();

        if path.is_dir() {
            collect_refs(base, &path, refs)?;
        } else if path.is_file() {
            if let Ok(rel) = path.strip_prefix(base) {
                refs.push(rel.to_string_lossy().to_string());
            }
        }
    }
    Ok(())
}

/// validate ref name
fn validate_ref_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidRef("empty ref name".to_string()));
    }

    if name.starts_with('/') || name.ends_with('/') {
        return Err(Error::InvalidRef(format!(
            "ref name cannot start or end with '/': {}",
            name
        )));
    }

    if name.contains("//") {
        return Err(Error::InvalidRef(format!(
            "ref name cannot contain '//': {}",
            name
        )));
    }

    if name.contains(['\0', '~', '^']) {
        return Err(Error::InvalidRef(format!(
            "ref name cannot contain null, '~' or '^': {}",
            name
        )));
    }

    // check for path traversal
    for component in name.split('/') {
        if component == "." || component == ".." {
            return Err(Error::InvalidRef(format!(
                "ref name cannot contain '.' or '..': {}",
                name
            )));
        }
    }

    Ok(())
}
