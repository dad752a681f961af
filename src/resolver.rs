//! Version folder resolution
//!
//! A version folder holds one logical file's history: a set of version
//! entries named `YYYYMMDDHHMMSS`, each holding exactly one file. That file
//! is either real content or a zero-byte deletion marker.
//!
//! Resolution scans the entries newest first. Deletion markers are skipped
//! until the first real file, which becomes the chosen version. Only the
//! most recent deletion episode matters. Markers older than the chosen
//! version are never looked at.
//!
//! ```rust,no_run
//! use deversion::resolver::resolve;
//! use std::path::Path;
//!
//! # fn main() -> deversion::Result<()> {
//! let resolution = resolve(Path::new("backup/report.docx："), None)?;
//! if resolution.decision.should_restore() {
//!     println!("restore {:?}", resolution.chosen);
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{DeversionError, Result};
use crate::types::{is_deletion_marker, VersionTimestamp};
use crate::utils;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// What to do with a resolved version folder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreDecision {
    /// File is live; restore its newest version
    Restore,
    /// File is deleted, but after the cutoff; restore its last live version
    RestoreDeleted,
    /// File is deleted; do not restore it
    SkipDeleted,
}

impl RestoreDecision {
    /// Whether the chosen version should be copied
    pub fn should_restore(self) -> bool {
        !matches!(self, RestoreDecision::SkipDeleted)
    }
}

/// Outcome of resolving one version folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionResolution {
    /// Chosen version file. For a fully deleted folder this is the oldest marker.
    pub chosen: PathBuf,
    /// Timestamp of the most recent deletion marker, if the file is deleted
    pub deletion: Option<VersionTimestamp>,
    /// Entries minus the deletion markers scanned before the live version
    pub version_count: usize,
    /// True when every entry is a deletion marker
    pub fully_deleted: bool,
    /// Restore decision under the requested cutoff
    pub decision: RestoreDecision,
}

impl VersionResolution {
    /// Whether the file is currently deleted
    pub fn is_deleted(&self) -> bool {
        self.deletion.is_some()
    }
}

/// Decide whether a file should be restored
///
/// Live files are always restored. Deleted files are restored only when a
/// cutoff is given and the deletion happened strictly after it. A folder
/// made only of markers has nothing to restore.
pub fn decide(
    deletion: Option<&VersionTimestamp>,
    fully_deleted: bool,
    cutoff: Option<&VersionTimestamp>,
) -> RestoreDecision {
    match (deletion, cutoff) {
        (None, _) => RestoreDecision::Restore,
        _ if fully_deleted => RestoreDecision::SkipDeleted,
        (Some(deleted_at), Some(cutoff)) if deleted_at > cutoff => RestoreDecision::RestoreDeleted,
        _ => RestoreDecision::SkipDeleted,
    }
}

/// Resolve a version folder to the version that should be restored
///
/// Fails with `DataIntegrity` when the folder has no entries, when an entry
/// name is not a 14-digit timestamp, or when an inspected entry does not hold
/// exactly one file. Fails with `MissingEntry` when the folder disappears
/// while it is being read.
pub fn resolve(version_folder: &Path, cutoff: Option<&VersionTimestamp>) -> Result<VersionResolution> {
    let mut entries = Vec::new();
    for path in utils::list_children(version_folder)? {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let timestamp = VersionTimestamp::from_entry_name(&name).ok_or_else(|| {
            DeversionError::integrity(&path, "version entry name is not a 14-digit timestamp")
        })?;
        entries.push((timestamp, path));
    }

    if entries.is_empty() {
        return Err(DeversionError::integrity(version_folder, "version folder has no entries"));
    }

    // Newest first
    entries.sort_by(|a, b| b.0.cmp(&a.0));

    let mut version_count = entries.len();
    let mut deletion: Option<VersionTimestamp> = None;
    let mut chosen: Option<PathBuf> = None;
    let mut last_marker: Option<PathBuf> = None;

    for (timestamp, entry) in &entries {
        let file = single_file(entry)?;
        if is_deletion_marker(&file) {
            trace!("Deletion marker at {} in {:?}", timestamp, version_folder);
            version_count -= 1;
            if deletion.is_none() {
                deletion = Some(timestamp.clone());
            }
            last_marker = Some(file);
            continue;
        }
        chosen = Some(file);
        break;
    }

    let fully_deleted = chosen.is_none();
    let chosen = match chosen.or(last_marker) {
        Some(path) => path,
        None => return Err(DeversionError::integrity(version_folder, "no version file found")),
    };

    let decision = decide(deletion.as_ref(), fully_deleted, cutoff);
    debug!(
        "Resolved {:?}: {:?} (versions: {}, deleted: {:?})",
        version_folder, decision, version_count, deletion
    );

    Ok(VersionResolution {
        chosen,
        deletion,
        version_count,
        fully_deleted,
        decision,
    })
}

/// The single file inside a version entry
fn single_file(entry: &Path) -> Result<PathBuf> {
    if !entry.is_dir() {
        return Err(DeversionError::integrity(entry, "version entry is not a directory"));
    }
    let mut files = utils::list_children(entry)?;
    if files.len() != 1 {
        return Err(DeversionError::integrity(
            entry,
            format!("expected exactly one file in version entry, found {}", files.len()),
        ));
    }
    let file = files.remove(0);
    if file.is_dir() {
        return Err(DeversionError::integrity(&file, "version entry holds a directory"));
    }
    Ok(file)
}
