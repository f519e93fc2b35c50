//! Filesystem utilities.
//!
//! Every recursive operation here walks with `follow_links(false)`: nested
//! symlinks are copied or unlinked as links, never traversed. Removing a tree
//! requires its top-level entry to be a real directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{Result, SksError};

/// What sits at a path, without following a top-level symlink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryKind {
    Absent,
    Symlink { dest: PathBuf },
    Dir,
    File,
}

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Expand a leading `~` to the home directory.
#[must_use]
pub fn expand_tilde(input: &str) -> PathBuf {
    if let Some(stripped) = input.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    if input == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(input)
}

/// Classify the entry at `path` using `symlink_metadata`.
pub fn entry_kind(path: &Path) -> Result<EntryKind> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => Ok(EntryKind::Symlink {
            dest: fs::read_link(path)?,
        }),
        Ok(meta) if meta.is_dir() => Ok(EntryKind::Dir),
        Ok(_) => Ok(EntryKind::File),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(EntryKind::Absent),
        Err(err) => Err(err.into()),
    }
}

/// Resolve a symlink destination relative to the directory holding the link.
#[must_use]
pub fn resolve_link_dest(link: &Path, dest: &Path) -> PathBuf {
    if dest.is_absolute() {
        dest.to_path_buf()
    } else {
        link.parent().map_or_else(|| dest.to_path_buf(), |p| p.join(dest))
    }
}

/// Canonicalize when possible, otherwise return the path unchanged.
#[must_use]
pub fn canonical_or_self(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(unix)]
pub fn symlink_dir(original: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
pub fn symlink_dir(original: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(original, link)
}

/// A sibling path used for staging, hidden and unique per call.
#[must_use]
pub fn staging_path(path: &Path, tag: &str) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "entry".into(), |n| n.to_string_lossy().into_owned());
    let unique = uuid::Uuid::new_v4().simple().to_string();
    let staged = format!(".{name}.sks-{tag}-{}", &unique[..12]);
    path.with_file_name(staged)
}

/// Point `link` at `dest`, atomically replacing an existing link.
///
/// The new link is created under a temporary name in the same directory and
/// renamed over `link`, so readers see either the old or the new link. Fails
/// if `link` is a real directory; callers move such content aside first.
pub fn atomic_symlink(dest: &Path, link: &Path) -> Result<()> {
    if let Some(parent) = link.parent() {
        ensure_dir(parent)?;
    }
    let tmp = staging_path(link, "link");
    symlink_dir(dest, &tmp)?;
    if let Err(err) = fs::rename(&tmp, link) {
        let _ = remove_link(&tmp);
        return Err(err.into());
    }
    Ok(())
}

/// Remove a single symlink entry without touching what it points at.
pub fn remove_link(path: &Path) -> Result<()> {
    match entry_kind(path)? {
        EntryKind::Symlink { .. } => {
            #[cfg(windows)]
            {
                if fs::remove_dir(path).is_ok() {
                    return Ok(());
                }
            }
            fs::remove_file(path)?;
            Ok(())
        }
        EntryKind::Absent => Ok(()),
        _ => Err(SksError::UnsafeRemoval(format!(
            "{} is not a symlink",
            path.display()
        ))),
    }
}

/// Recursively delete a real directory.
///
/// Refuses when `path` itself is a symlink. Nested symlinks are unlinked,
/// never followed.
pub fn remove_tree(path: &Path) -> Result<()> {
    match entry_kind(path)? {
        EntryKind::Absent => return Ok(()),
        EntryKind::Symlink { .. } => {
            return Err(SksError::UnsafeRemoval(format!(
                "refusing to recurse through symlink {}",
                path.display()
            )));
        }
        EntryKind::File => {
            fs::remove_file(path)?;
            return Ok(());
        }
        EntryKind::Dir => {}
    }

    for entry in WalkDir::new(path)
        .follow_links(false)
        .contents_first(true)
    {
        let entry = entry?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::remove_dir(entry.path())?;
        } else {
            set_writable(entry.path())?;
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

/// Copy a directory tree. Nested symlinks are recreated, not followed.
///
/// A top-level symlink is resolved so that a foreign link's content can be
/// imported; `dst` must not exist.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<u64> {
    copy_tree_filtered(src, dst, &|_| false)
}

/// [`copy_tree`] skipping every entry whose path relative to `src` matches
/// `skip`. A skipped directory is not descended into.
pub fn copy_tree_filtered(src: &Path, dst: &Path, skip: &dyn Fn(&Path) -> bool) -> Result<u64> {
    if fs::symlink_metadata(dst).is_ok() {
        return Err(SksError::InvalidPath {
            path: dst.to_path_buf(),
            reason: "copy destination already exists".to_string(),
        });
    }
    if let Some(parent) = dst.parent() {
        ensure_dir(parent)?;
    }

    let root = fs::canonicalize(src)?;
    if root.is_file() {
        fs::copy(&root, dst)?;
        return Ok(1);
    }

    let mut files = 0u64;
    let walker = WalkDir::new(&root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.path().strip_prefix(&root).map_or(true, |rel| !skip(rel)));
    for entry in walker {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(&root)
            .map_err(|err| SksError::ValidationFailed(err.to_string()))?;
        let out = dst.join(rel);
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            symlink_dir(&fs::read_link(entry.path())?, &out)?;
        } else if file_type.is_dir() {
            fs::create_dir_all(&out)?;
        } else {
            fs::copy(entry.path(), &out)?;
            files += 1;
        }
    }
    Ok(files)
}

/// Copy `src` into place at `dst` via a staging sibling and a rename.
pub fn copy_tree_atomic(src: &Path, dst: &Path) -> Result<u64> {
    let staging = staging_path(dst, "copy");
    let files = match copy_tree(src, &staging) {
        Ok(files) => files,
        Err(err) => {
            let _ = remove_tree(&staging);
            return Err(err);
        }
    };
    if let Err(err) = fs::rename(&staging, dst) {
        let _ = remove_tree(&staging);
        return Err(err.into());
    }
    Ok(files)
}

/// Content digest of a tree: relative paths, file bytes and link targets.
///
/// Two trees with the same digest are interchangeable as skill content.
pub fn tree_digest(path: &Path) -> Result<String> {
    tree_digest_filtered(path, &|_| false)
}

/// [`tree_digest`] over the entries `skip` does not match.
pub fn tree_digest_filtered(path: &Path, skip: &dyn Fn(&Path) -> bool) -> Result<String> {
    let root = fs::canonicalize(path)?;
    let mut hasher = Sha256::new();
    if root.is_file() {
        hasher.update(fs::read(&root)?);
        return Ok(hex::encode(hasher.finalize()));
    }

    let walker = WalkDir::new(&root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.path().strip_prefix(&root).map_or(true, |rel| !skip(rel)));
    for entry in walker {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(&root)
            .map_err(|err| SksError::ValidationFailed(err.to_string()))?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let rel = rel.to_string_lossy().replace('\\', "/");
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            hasher.update(b"L\0");
            hasher.update(rel.as_bytes());
            hasher.update(b"\0");
            hasher.update(fs::read_link(entry.path())?.to_string_lossy().as_bytes());
        } else if file_type.is_dir() {
            hasher.update(b"D\0");
            hasher.update(rel.as_bytes());
        } else {
            hasher.update(b"F\0");
            hasher.update(rel.as_bytes());
            hasher.update(b"\0");
            hasher.update(fs::read(entry.path())?);
        }
        hasher.update(b"\n");
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Mark every regular file under `path` read-only.
pub fn seal_tree(path: &Path) -> Result<()> {
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_file() {
            let mut perms = fs::metadata(entry.path())?.permissions();
            perms.set_readonly(true);
            fs::set_permissions(entry.path(), perms)?;
        }
    }
    Ok(())
}

/// Make every regular file under `path` writable again.
pub fn unseal_tree(path: &Path) -> Result<()> {
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_file() {
            set_writable(entry.path())?;
        }
    }
    Ok(())
}

fn set_writable(path: &Path) -> Result<()> {
    let Ok(meta) = fs::symlink_metadata(path) else {
        return Ok(());
    };
    if meta.file_type().is_symlink() {
        return Ok(());
    }
    let mut perms = meta.permissions();
    if perms.readonly() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            perms.set_mode(perms.mode() | 0o200);
        }
        #[cfg(not(unix))]
        {
            #[allow(clippy::permissions_set_readonly_false)]
            perms.set_readonly(false);
        }
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}
