//! Recursive restore of a versioned backup tree
//!
//! The backup tree mirrors the original directory layout, except that every
//! file has been replaced by a version folder (a directory whose name ends
//! in `：`). `RestoreEngine` walks the tree depth first and mirrors every
//! plain directory into the restore tree. It resolves each version folder
//! and copies the chosen version next to its mirrored siblings.
//!
//! ## Aggregation
//!
//! Each directory level builds its own `RestoreReport`. The caller merges it
//! into its totals, so no counters are shared between levels. Errors on a
//! single node (a path that is too long, a broken version folder, a failed
//! copy) become report entries. A plain file where only directories are
//! allowed aborts the rest of that directory, and its siblings higher up are
//! still restored. Symbolic links are never followed; they are recorded as
//! failures like entries that vanished after the listing.
//!
//! ## Cancellation
//!
//! The engine checks its `CancellationFlag` before every entry and after
//! every synchronous copy. A cancelled walk unwinds level by level, and each
//! level merges what it has counted so far. The caller gets the partial
//! report with `interrupted` set.
//!
//! ## Example
//!
//! ```rust,no_run
//! use deversion::{RestoreBuilder, SkipSet};
//! use std::path::Path;
//!
//! # fn main() -> deversion::Result<()> {
//! let engine = RestoreBuilder::new()
//!     .restore_deletions_after(Some("2023-01-15".parse()?))
//!     .workers(Some(8))
//!     .build()?;
//!
//! let mut skip = SkipSet::new();
//! let report = engine.restore(Path::new("/mnt/backup"), Path::new("/mnt/restore"), &mut skip)?;
//! println!("Restored {} files", report.files_copied);
//! # Ok(())
//! # }
//! ```

use crate::cancel::CancellationFlag;
use crate::error::{DeversionError, Result};
use crate::resolver::{self, RestoreDecision};
use crate::skip_list::SkipSet;
use crate::types::{is_version_folder, RestoreReport, VersionTimestamp, DEFAULT_MAX_PATH_LEN};
use crate::utils::{self, ChildKind};
use crate::worker_pool::{CopyWorkerPool, DEFAULT_QUEUE_CAPACITY};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace, warn};

/// Default number of copy workers
pub const DEFAULT_WORKERS: usize = 4;

/// Settings for a restore run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreOptions {
    /// Restore deleted files whose deletion is strictly later than this
    pub restore_deletions_after: Option<VersionTimestamp>,
    /// Number of copy workers; `None` copies synchronously during the walk
    pub workers: Option<usize>,
    /// Jobs each worker queue holds before the walk blocks
    pub queue_capacity: usize,
    /// Remove mirrored directories whose files were all deleted
    pub prune_empty_dirs: bool,
    /// Log what would happen without touching the restore tree
    pub dry_run: bool,
    /// Paths longer than this many characters are recorded as failures
    pub max_path_len: usize,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            restore_deletions_after: None,
            workers: Some(DEFAULT_WORKERS),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            prune_empty_dirs: true,
            dry_run: false,
            max_path_len: DEFAULT_MAX_PATH_LEN,
        }
    }
}

impl RestoreOptions {
    /// Check the options for values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.workers == Some(0) {
            return Err(DeversionError::InvalidConfiguration(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(DeversionError::InvalidConfiguration(
                "queue capacity must be at least 1".to_string(),
            ));
        }
        if self.max_path_len == 0 {
            return Err(DeversionError::InvalidConfiguration(
                "maximum path length must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for `RestoreEngine`
///
/// Defaults:
/// - no deletion cutoff (deleted files are never restored)
/// - 4 copy workers, 100 queued jobs each
/// - pruning of all-deleted directories enabled
/// - dry run disabled
/// - 260-character path guard
#[derive(Debug, Default)]
pub struct RestoreBuilder {
    options: RestoreOptions,
    cancel: Option<CancellationFlag>,
}

impl RestoreBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing options
    pub fn from_options(options: RestoreOptions) -> Self {
        Self {
            options,
            cancel: None,
        }
    }

    /// Restore files deleted strictly after `cutoff`
    pub fn restore_deletions_after(mut self, cutoff: Option<VersionTimestamp>) -> Self {
        self.options.restore_deletions_after = cutoff;
        self
    }

    /// Set the number of copy workers, or `None` for synchronous copies
    pub fn workers(mut self, workers: Option<usize>) -> Self {
        self.options.workers = workers;
        self
    }

    /// Set the per-worker queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.options.queue_capacity = capacity;
        self
    }

    /// Enable or disable pruning of all-deleted directories
    pub fn prune_empty_dirs(mut self, prune: bool) -> Self {
        self.options.prune_empty_dirs = prune;
        self
    }

    /// Enable or disable dry-run mode
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.options.dry_run = dry_run;
        self
    }

    /// Set the path-length guard
    pub fn max_path_len(mut self, len: usize) -> Self {
        self.options.max_path_len = len;
        self
    }

    /// Share a cancellation flag with the engine and its workers
    pub fn cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Validate the options and build the engine
    pub fn build(self) -> Result<RestoreEngine> {
        self.options.validate()?;
        Ok(RestoreEngine {
            options: self.options,
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}

/// Walks a backup tree and restores the latest live version of every file
#[derive(Debug)]
pub struct RestoreEngine {
    options: RestoreOptions,
    cancel: CancellationFlag,
}

impl RestoreEngine {
    /// Create an engine from options with a fresh cancellation flag
    pub fn new(options: RestoreOptions) -> Result<Self> {
        RestoreBuilder::from_options(options).build()
    }

    /// Options this engine runs with
    pub fn options(&self) -> &RestoreOptions {
        &self.options
    }

    /// Flag that cancels this engine's runs
    pub fn cancellation(&self) -> &CancellationFlag {
        &self.cancel
    }

    /// Restore everything under `backup_root` into `restore_root`
    ///
    /// Creates the worker pool when workers are configured, walks the whole
    /// tree, then closes the pool once and folds the workers' tallies into
    /// the report. Relative entries of `skip` are made absolute like the
    /// roots, and entries that match a directory are removed.
    ///
    /// Only an unusable `backup_root` or a pool that cannot start is an
    /// error. Everything that goes wrong during the walk ends up in the
    /// report.
    pub fn restore(
        &self,
        backup_root: &Path,
        restore_root: &Path,
        skip: &mut SkipSet,
    ) -> Result<RestoreReport> {
        let backup_root = utils::absolute(backup_root)?;
        let restore_root = utils::absolute(restore_root)?;

        if !backup_root.is_dir() {
            return Err(DeversionError::InvalidConfiguration(format!(
                "backup root is not a directory: {:?}",
                backup_root
            )));
        }
        skip.make_absolute()?;
        if !self.options.dry_run && !restore_root.exists() {
            warn!("Restore path not found! Creating {:?}", restore_root);
            std::fs::create_dir_all(&restore_root)?;
        }

        info!("Restoring {:?} into {:?}", backup_root, restore_root);

        let mut pool = match self.options.workers {
            Some(workers) => Some(CopyWorkerPool::with_capacity(
                workers,
                self.options.queue_capacity,
                self.options.dry_run,
                self.cancel.clone(),
            )?),
            None => None,
        };

        let mut report = self.restore_folder(&backup_root, &restore_root, skip, pool.as_mut());

        if let Some(mut pool) = pool {
            pool.close();
            match pool.await_closed() {
                Ok(tally) => report.merge_tally(tally),
                Err(e) => {
                    error!("Copy workers failed: {}", e);
                    report.record_failure(&backup_root);
                }
            }
        }

        if self.cancel.is_cancelled() {
            report.interrupted = true;
        }
        Ok(report)
    }

    /// Restore one plain directory level and everything beneath it
    ///
    /// Never fails. A structural violation or an unreadable directory is
    /// logged and recorded, and the partial report is returned.
    pub fn restore_folder(
        &self,
        backup_path: &Path,
        restore_path: &Path,
        skip: &mut SkipSet,
        pool: Option<&mut CopyWorkerPool>,
    ) -> RestoreReport {
        let mut report = RestoreReport::new();
        if let Err(e) = self.walk(backup_path, restore_path, skip, pool, &mut report) {
            if e.is_interrupt() {
                report.interrupted = true;
            } else {
                error!("Restore folder failed with errors: {}", e);
                warn!("Attempting to continue...");
                report.record_failure(failure_path(&e, backup_path));
            }
        }
        report
    }

    fn walk(
        &self,
        backup_path: &Path,
        restore_path: &Path,
        skip: &mut SkipSet,
        mut pool: Option<&mut CopyWorkerPool>,
        report: &mut RestoreReport,
    ) -> Result<()> {
        let mut children = utils::list_children(backup_path)?;
        children.sort();
        for child in children {
            self.cancel.check()?;

            let len = utils::path_len(&child);
            if len > self.options.max_path_len {
                let err = DeversionError::PathTooLong {
                    path: child.clone(),
                    len,
                    limit: self.options.max_path_len,
                };
                error!("ERROR: {}", err);
                report.record_failure(child);
                continue;
            }

            match utils::classify(&child) {
                Ok(ChildKind::Directory) => {}
                Ok(ChildKind::File) => return Err(DeversionError::StructuralViolation(child)),
                Ok(ChildKind::Symlink) => {
                    warn!("Not following symbolic link: {:?}", child);
                    report.record_failure(child);
                    continue;
                }
                Err(e) => {
                    error!("ERROR: {}", e.user_message());
                    report.record_failure(child);
                    continue;
                }
            }

            if is_version_folder(&child) {
                self.restore_version_folder(&child, restore_path, pool.as_deref_mut(), report)?;
                continue;
            }

            if skip.take(&child) {
                info!("Skipping directory at user request: {:?}", child);
                continue;
            }

            let Some(name) = child.file_name() else {
                continue;
            };
            let next_restore_path = restore_path.join(name);
            report.folder_count += 1;
            if self.options.dry_run {
                info!("Dry run: Create directory {:?}", next_restore_path);
            } else if let Err(e) = utils::create_dir_idempotent(&next_restore_path) {
                error!("Could not create directory {:?}: {}", next_restore_path, e);
                report.record_failure(&child);
                continue;
            } else {
                info!("Create directory {:?}", next_restore_path);
            }

            let sub = self.restore_folder(&child, &next_restore_path, skip, pool.as_deref_mut());
            let interrupted = sub.interrupted;
            if !interrupted && self.options.prune_empty_dirs && sub.only_deletions() {
                self.prune(&child, &next_restore_path, report);
            }
            report.merge(sub);
            if interrupted {
                return Err(DeversionError::Interrupted);
            }
        }
        Ok(())
    }

    /// Resolve one version folder and copy or enqueue the chosen version
    ///
    /// Returns an error only when the run is interrupted.
    fn restore_version_folder(
        &self,
        folder: &Path,
        restore_path: &Path,
        pool: Option<&mut CopyWorkerPool>,
        report: &mut RestoreReport,
    ) -> Result<()> {
        let resolution = match resolver::resolve(folder, self.options.restore_deletions_after.as_ref()) {
            Ok(resolution) => resolution,
            Err(e) => {
                error!("ERROR: {}", e.user_message());
                report.record_failure(folder);
                return Ok(());
            }
        };

        report.file_count += 1;
        report.version_count += resolution.version_count;

        match resolution.decision {
            RestoreDecision::Restore => {}
            RestoreDecision::RestoreDeleted => {
                info!("Restoring deleted file: {:?}", folder);
            }
            RestoreDecision::SkipDeleted => {
                match (&resolution.deletion, &self.options.restore_deletions_after) {
                    (Some(date), Some(_)) => {
                        info!("Ignoring deleted file because date was {}: {:?}", date, folder)
                    }
                    _ => info!("Ignoring deleted file: {:?}", folder),
                }
                report.deleted_file_count += 1;
                return Ok(());
            }
        }

        let Some(file_name) = resolution.chosen.file_name() else {
            report.record_failure(folder);
            return Ok(());
        };
        let dst = restore_path.join(file_name);
        if dst.exists() {
            info!("Restored file already exists...skipping: {:?}", dst);
            report.files_already_present += 1;
            return Ok(());
        }

        match pool {
            Some(pool) => match pool.submit(&resolution.chosen, &dst) {
                Ok(()) => trace!("Average worker pool workload: {:.1}", pool.average_workload()),
                Err(e) if e.is_interrupt() => return Err(e),
                Err(e) => {
                    error!("FAILED: could not queue {:?}: {}", resolution.chosen, e);
                    report.record_failure(&resolution.chosen);
                }
            },
            None if self.options.dry_run => {
                info!("Dry run: Copy {:?} to {:?}", resolution.chosen, dst);
                report.files_copied += 1;
            }
            None => {
                info!("Copy {:?} to {:?}", resolution.chosen, dst);
                match utils::copy_file(&resolution.chosen, &dst) {
                    Ok(bytes) => {
                        debug!("Copied {} bytes", bytes);
                        report.files_copied += 1;
                    }
                    Err(e) => {
                        error!("FAILED: {}", e);
                        report.record_failure(&resolution.chosen);
                    }
                }
                self.cancel.check()?;
            }
        }
        Ok(())
    }

    /// Remove a mirrored directory whose files were all skipped deletions
    fn prune(&self, backup_dir: &Path, restored_dir: &Path, report: &mut RestoreReport) {
        info!("All files in this directory are deleted...deleting directory: {:?}", backup_dir);
        if self.options.dry_run {
            if utils::has_entries(restored_dir) {
                warn!("Dry run: Could not prune {:?}, it is not empty", restored_dir);
                return;
            }
            info!("Dry run: Deleting empty restored directory: {:?}", restored_dir);
            report.deleted_folder_count += 1;
            return;
        }
        match utils::remove_empty_dir(restored_dir) {
            Ok(()) => {
                info!("Deleting empty restored directory: {:?}", restored_dir);
                report.deleted_folder_count += 1;
            }
            Err(e) => warn!("Could not prune {:?}, keeping it: {}", restored_dir, e),
        }
    }
}

/// Path to report for an error that aborted a directory level
fn failure_path(err: &DeversionError, fallback: &Path) -> PathBuf {
    match err {
        DeversionError::StructuralViolation(path)
        | DeversionError::MissingEntry(path)
        | DeversionError::PathTooLong { path, .. }
        | DeversionError::DataIntegrity { path, .. } => path.clone(),
        _ => fallback.to_path_buf(),
    }
}
