//! Core types used throughout deversion
//!
//! This module contains the data structures shared by the resolver, the copy
//! worker pool and the restore engine:
//!
//! - **Naming**: the version folder suffix and deletion marker name used by
//!   the backup tool, and `VersionTimestamp` for version entry names
//! - **Work**: `RestoreJob`, a single copy handed to a worker
//! - **Results**: `RestoreReport` and `WorkerTally`, the counters returned by
//!   the walk and by the workers
//!
//! ## Examples
//!
//! ```rust
//! use deversion::types::VersionTimestamp;
//!
//! let deleted: VersionTimestamp = "20230201000000".parse().unwrap();
//! let cutoff: VersionTimestamp = "2023-01-15".parse().unwrap();
//! assert!(deleted > cutoff);
//! ```

use crate::error::DeversionError;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Last character of a version folder name
pub const VERSION_FOLDER_MARKER: char = '：';

/// Name of the zero-byte file that marks a deleted version
pub const DELETION_MARKER: &str = "cbbdeleted";

/// Default path-length guard, in characters
pub const DEFAULT_MAX_PATH_LEN: usize = 260;

/// Number of digits in a version entry name (`YYYYMMDDHHMMSS`)
pub const TIMESTAMP_LEN: usize = 14;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Check whether a backup directory is a version folder
pub fn is_version_folder(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().ends_with(VERSION_FOLDER_MARKER))
        .unwrap_or(false)
}

/// Check whether a file inside a version entry is a deletion marker
pub fn is_deletion_marker(path: &Path) -> bool {
    path.file_name()
        .map(|name| name == DELETION_MARKER)
        .unwrap_or(false)
}

/// A 14-digit `YYYYMMDDHHMMSS` timestamp
///
/// Version entries are named with these. Zero-padded fixed-width digits sort
/// lexicographically in chronological order, so ordering is plain string
/// ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionTimestamp(String);

impl VersionTimestamp {
    /// Accept only an exact version entry name (14 ASCII digits)
    pub fn from_entry_name(name: &str) -> Option<Self> {
        if name.len() == TIMESTAMP_LEN && name.bytes().all(|b| b.is_ascii_digit()) {
            Some(VersionTimestamp(name.to_string()))
        } else {
            None
        }
    }

    /// The timestamp as its 14-digit string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Interpret the timestamp as a calendar date and time
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.0, TIMESTAMP_FORMAT).ok()
    }
}

impl FromStr for VersionTimestamp {
    type Err = DeversionError;

    /// Parse a cutoff date in any of the accepted spellings
    ///
    /// Accepted: `YYYYMMDDHHMMSS`, `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` and
    /// `YYYY-MM-DDTHH:MM:SS`. A bare date means midnight.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(ts) = VersionTimestamp::from_entry_name(s) {
            if ts.to_datetime().is_some() {
                return Ok(ts);
            }
            return Err(DeversionError::InvalidTimestamp(s.to_string()));
        }

        let parsed = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
            .or_else(|_| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::MIN))
            })
            .map_err(|_| DeversionError::InvalidTimestamp(s.to_string()))?;

        Ok(VersionTimestamp(parsed.format(TIMESTAMP_FORMAT).to_string()))
    }
}

impl TryFrom<String> for VersionTimestamp {
    type Error = DeversionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VersionTimestamp> for String {
    fn from(ts: VersionTimestamp) -> Self {
        ts.0
    }
}

impl fmt::Display for VersionTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single copy handed to a worker
///
/// Owned by whichever queue or worker currently holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreJob {
    /// Chosen version file inside the backup tree
    pub src: PathBuf,
    /// Destination path in the restore tree
    pub dst: PathBuf,
}

impl RestoreJob {
    /// Create a job copying `src` to `dst`
    pub fn new(src: impl Into<PathBuf>, dst: impl Into<PathBuf>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
        }
    }
}

/// Counters owned by one copy worker
///
/// Each worker keeps its own tally and hands it back when it is joined, so
/// workers never share mutable state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerTally {
    /// Files copied (or simulated in dry-run mode)
    pub copied: usize,
    /// Destinations that already existed and were left alone
    pub already_present: usize,
    /// Copies that failed
    pub failed: usize,
    /// Source paths of failed copies
    pub failed_paths: Vec<PathBuf>,
}

impl WorkerTally {
    /// Add another worker's tally into this one
    pub fn merge(&mut self, other: WorkerTally) {
        self.copied += other.copied;
        self.already_present += other.already_present;
        self.failed += other.failed;
        self.failed_paths.extend(other.failed_paths);
    }
}

/// Aggregated statistics of a restore
///
/// Each level of the recursive walk builds its own report and the caller
/// merges it into its running totals. A finished report is never modified
/// by the code that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreReport {
    /// Mirrored directories created (or that would be created in dry-run)
    pub folder_count: usize,
    /// Version folders processed, live or deleted
    pub file_count: usize,
    /// Live versions seen across all version folders
    pub version_count: usize,
    /// Version folders skipped because the file is deleted
    pub deleted_file_count: usize,
    /// Mirrored directories removed because everything in them was deleted
    pub deleted_folder_count: usize,
    /// Failed accesses and copies
    pub failed_count: usize,
    /// Paths of failed accesses and copies
    pub failed_paths: Vec<PathBuf>,
    /// Files copied, or simulated in dry-run mode
    pub files_copied: usize,
    /// Destinations that already existed and were not overwritten
    pub files_already_present: usize,
    /// Whether the walk stopped early because of a cancellation
    pub interrupted: bool,
}

impl RestoreReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for `path`
    pub fn record_failure(&mut self, path: impl Into<PathBuf>) {
        self.failed_count += 1;
        self.failed_paths.push(path.into());
    }

    /// Add a sub-report into this one
    pub fn merge(&mut self, other: RestoreReport) {
        self.folder_count += other.folder_count;
        self.file_count += other.file_count;
        self.version_count += other.version_count;
        self.deleted_file_count += other.deleted_file_count;
        self.deleted_folder_count += other.deleted_folder_count;
        self.failed_count += other.failed_count;
        self.failed_paths.extend(other.failed_paths);
        self.files_copied += other.files_copied;
        self.files_already_present += other.files_already_present;
        self.interrupted |= other.interrupted;
    }

    /// Fold the workers' tallies into the report
    pub fn merge_tally(&mut self, tally: WorkerTally) {
        self.files_copied += tally.copied;
        self.files_already_present += tally.already_present;
        self.failed_count += tally.failed;
        self.failed_paths.extend(tally.failed_paths);
    }

    /// Check whether every version folder in this subtree was a skipped deletion
    pub fn only_deletions(&self) -> bool {
        self.file_count == self.deleted_file_count
    }

    /// Check whether the restore finished without failures or interruption
    pub fn is_clean(&self) -> bool {
        self.failed_count == 0 && !self.interrupted
    }
}
