//! Directories excluded from the walk
//!
//! A `SkipSet` holds backup-tree directory paths that the caller does not
//! want restored. Entries are single use: the walk removes an entry when it
//! skips the matching directory. Whatever is left after a run was never
//! encountered.

use crate::error::{DeversionError, Result};
use crate::utils;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Mutable set of paths to skip, consumed as the walk proceeds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipSet {
    paths: BTreeSet<PathBuf>,
}

impl SkipSet {
    /// Create an empty skip set
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a skip-list file with one path per line
    ///
    /// Surrounding whitespace is trimmed and blank lines are ignored.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| DeversionError::from_access(path, e))?;
        Ok(Self::parse(&content))
    }

    /// Parse skip-list text with one path per line
    pub fn parse(content: &str) -> Self {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect()
    }

    /// Add a path to the set
    pub fn insert(&mut self, path: impl Into<PathBuf>) {
        self.paths.insert(path.into());
    }

    /// Remove `path` if present, returning whether it was there
    pub fn take(&mut self, path: &Path) -> bool {
        self.paths.remove(path)
    }

    /// Resolve relative entries against the current directory
    ///
    /// The walk compares absolute paths, so a relative entry only matches
    /// after this has run with the same working directory as the roots.
    pub fn make_absolute(&mut self) -> Result<()> {
        self.paths = self
            .paths
            .iter()
            .map(|path| utils::absolute(path))
            .collect::<Result<BTreeSet<_>>>()?;
        Ok(())
    }

    /// Whether the set contains `path`
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    /// Number of entries still in the set
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Iterate over the entries still in the set
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }
}

impl<P: Into<PathBuf>> FromIterator<P> for SkipSet {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().map(Into::into).collect(),
        }
    }
}
