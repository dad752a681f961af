//! Filesystem helpers
//!
//! Thin wrappers over `std::fs` for the handful of operations the restore
//! engine needs: listing children, creating and pruning mirrored
//! directories, and copying a single file. Errors on a specific entry are
//! mapped to `MissingEntry` when the entry has disappeared, so callers can
//! tell races apart from real I/O failures.

use crate::error::{DeversionError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;

/// List the direct children of a directory
///
/// Order is whatever the OS returns. Callers that need chronological order
/// sort the result themselves.
pub fn list_children(path: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(path).map_err(|e| DeversionError::from_access(path, e))?;
    let mut children = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DeversionError::from_access(path, e))?;
        children.push(entry.path());
    }
    Ok(children)
}

/// What a backup-tree entry is, without following symbolic links
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    Directory,
    File,
    Symlink,
}

/// Classify `path` from its own metadata
///
/// A symbolic link is reported as such when its target exists. A dangling
/// link, like an entry that vanished after listing, is `MissingEntry`.
pub fn classify(path: &Path) -> Result<ChildKind> {
    let meta = fs::symlink_metadata(path).map_err(|e| DeversionError::from_access(path, e))?;
    let file_type = meta.file_type();
    if file_type.is_symlink() {
        fs::metadata(path).map_err(|e| DeversionError::from_access(path, e))?;
        Ok(ChildKind::Symlink)
    } else if file_type.is_dir() {
        Ok(ChildKind::Directory)
    } else {
        Ok(ChildKind::File)
    }
}

/// Create a directory, succeeding if it already exists
pub fn create_dir_idempotent(path: &Path) -> Result<()> {
    match fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(e) => Err(DeversionError::Io(e)),
    }
}

/// Remove a directory; fails if it is not empty
pub fn remove_empty_dir(path: &Path) -> Result<()> {
    fs::remove_dir(path)?;
    trace!("Removed empty directory: {:?}", path);
    Ok(())
}

/// Whether `path` is a directory holding at least one entry
pub fn has_entries(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Copy `src` to `dst`, mapping any failure to `CopyFailed`
pub fn copy_file(src: &Path, dst: &Path) -> Result<u64> {
    fs::copy(src, dst).map_err(|source| DeversionError::CopyFailed {
        src: src.to_path_buf(),
        dst: dst.to_path_buf(),
        source,
    })
}

/// Make `path` absolute against the current directory without touching the filesystem
pub fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Length of a path in characters, as the path-length guard counts it
pub fn path_len(path: &Path) -> usize {
    path.to_string_lossy().chars().count()
}
