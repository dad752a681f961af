//! # deversion CLI - Un-version a backup tree
//!
//! Rebuilds a plain directory mirror from a versioned backup tree, restoring
//! the latest live version of every file.
//!
//! ## Usage
//! ```bash
//! # Restore everything that is not deleted
//! deversion /mnt/backup /mnt/restore
//!
//! # Skip some directories and bring back files deleted after a date
//! deversion /mnt/backup /mnt/restore --skip-list skip.txt --restore-deleted-after 2023-01-15
//!
//! # See what would happen
//! deversion /mnt/backup /mnt/restore --dry-run
//! ```

use anyhow::Context;
use clap::Parser;
use colored::*;
use deversion::engine::DEFAULT_WORKERS;
use deversion::{CancellationFlag, RestoreBuilder, RestoreReport, SkipSet, VersionTimestamp};
use humantime::format_duration;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// deversion - restore the latest version of every file in a versioned backup
#[derive(Parser)]
#[command(name = "deversion")]
#[command(version)]
#[command(about = "Restore the latest live version of every file in a versioned backup tree")]
#[command(long_about = None)]
struct Cli {
    /// Root of the versioned backup tree
    backup_root: PathBuf,

    /// Directory to restore into
    restore_root: PathBuf,

    /// File listing backup directories to skip, one path per line
    #[arg(short, long, value_name = "FILE")]
    skip_list: Option<PathBuf>,

    /// Restore files deleted after this date (YYYYMMDDHHMMSS or YYYY-MM-DD[ HH:MM:SS])
    #[arg(long, alias = "cutoff", value_name = "DATE")]
    restore_deleted_after: Option<String>,

    /// Number of parallel copy workers
    #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Copy synchronously during the walk instead of using workers
    #[arg(long, conflicts_with = "workers")]
    no_workers: bool,

    /// Show what would be restored without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Keep mirrored directories whose files were all deleted
    #[arg(long)]
    keep_empty_dirs: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    match run(cli) {
        Ok(report) if report.interrupted => std::process::exit(130),
        Ok(_) => {}
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            std::process::exit(1);
        }
    }
}

/// Main command runner
fn run(cli: Cli) -> anyhow::Result<RestoreReport> {
    let mut skip = match &cli.skip_list {
        Some(path) => {
            let skip = SkipSet::load(path)
                .with_context(|| format!("failed to read skip list {}", path.display()))?;
            print_skip_list(&skip);
            skip
        }
        None => SkipSet::new(),
    };

    let cutoff = cli
        .restore_deleted_after
        .as_deref()
        .map(|s| s.parse::<VersionTimestamp>())
        .transpose()
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    let cancel = CancellationFlag::new();
    cancel.install_ctrlc_handler()?;

    let engine = RestoreBuilder::new()
        .restore_deletions_after(cutoff)
        .workers(if cli.no_workers { None } else { Some(cli.workers) })
        .prune_empty_dirs(!cli.keep_empty_dirs)
        .dry_run(cli.dry_run)
        .cancellation(cancel)
        .build()?;

    let start = Instant::now();
    let report = engine
        .restore(&cli.backup_root, &cli.restore_root, &mut skip)
        .context("restore failed")?;
    let elapsed = start.elapsed();

    for unmatched in skip.iter() {
        warn!("Skip-list entry was never encountered: {}", unmatched.display());
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, cli.dry_run, elapsed);
    }
    Ok(report)
}

fn print_skip_list(skip: &SkipSet) {
    println!("{}", "Skip directories loaded:".bold());
    for path in skip.iter() {
        println!("\t{}", path.display().to_string().cyan());
    }
}

fn print_report(report: &RestoreReport, dry_run: bool, elapsed: Duration) {
    if dry_run {
        println!("{}", "Dry run:".yellow().bold());
    }
    if report.interrupted {
        println!("{}", "Interrupted - partial results:".yellow().bold());
    }
    println!("{}", "Restore report:".bold());
    println!("     Folders found: {}", report.folder_count);
    println!("     Files restored: {}", report.file_count);
    println!("     Versions found: {}", report.version_count);
    println!("     Deleted files: {}", report.deleted_file_count);
    println!("     Deleted folders: {}", report.deleted_folder_count);
    println!("     Files copied: {}", report.files_copied.to_string().green());
    println!("     Already present: {}", report.files_already_present);
    let failed = report.failed_count.to_string();
    println!(
        "     Failed access/copy count: {}",
        if report.failed_count > 0 { failed.red() } else { failed.normal() }
    );
    println!("     List of failed file restores:");
    for path in &report.failed_paths {
        println!("\t {}", path.display());
    }
    let elapsed = Duration::from_millis(elapsed.as_millis() as u64);
    println!("\n{}", format!("Total time: {}", format_duration(elapsed)).dimmed());
}
