//! # deversion - Restore plain files from a versioned backup tree
//!
//! Some incremental backup tools store every file as a *version folder*: a
//! directory named after the file plus a `：` suffix, holding one subfolder
//! per snapshot (`YYYYMMDDHHMMSS`), each with a single copy of the file or a
//! zero-byte `cbbdeleted` marker. deversion walks such a tree and rebuilds a
//! plain directory mirror containing the latest live version of every file.
//!
//! ## Overview
//!
//! - Resolve each version folder to its newest live version, honouring
//!   deletion markers and an optional deletion cutoff date
//! - Copy files through a bounded pool of worker threads, or synchronously
//! - Skip user-selected directories
//! - Prune mirrored directories whose files were all deleted
//! - Cancel cooperatively (Ctrl-C) and still get a partial report
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use deversion::{RestoreBuilder, SkipSet};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = RestoreBuilder::new().build()?;
//! let report = engine.restore(
//!     Path::new("./backup"),
//!     Path::new("./restored"),
//!     &mut SkipSet::new(),
//! )?;
//! println!("Restored {} files, {} failures", report.files_copied, report.failed_count);
//! # Ok(())
//! # }
//! ```
//!
//! ## Restoring recently deleted files
//!
//! ```rust,no_run
//! use deversion::{RestoreBuilder, SkipSet};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Files deleted after this date come back from their last live version
//! let engine = RestoreBuilder::new()
//!     .restore_deletions_after(Some("2023-01-15".parse()?))
//!     .dry_run(true)
//!     .build()?;
//! let report = engine.restore(Path::new("./backup"), Path::new("./restored"), &mut SkipSet::new())?;
//! println!("{} deleted files skipped", report.deleted_file_count);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`]: the recursive restore walk and its options
//! - [`resolver`]: version folder resolution
//! - [`worker_pool`]: parallel copy workers
//! - [`skip_list`]: directories excluded from the walk
//! - [`cancel`]: cooperative cancellation
//! - [`types`]: reports, jobs and naming constants
//! - [`error`]: error types and handling

pub mod cancel;
pub mod engine;
pub mod error;
pub mod resolver;
pub mod skip_list;
pub mod types;
pub mod worker_pool;

mod utils;

pub use cancel::CancellationFlag;
pub use engine::{RestoreBuilder, RestoreEngine, RestoreOptions};
pub use error::{DeversionError, Result};
pub use resolver::{RestoreDecision, VersionResolution};
pub use skip_list::SkipSet;
pub use types::*;
pub use worker_pool::CopyWorkerPool;
