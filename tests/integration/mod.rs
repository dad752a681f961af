//! End-to-end restore tests
//!
//! Builds versioned backup trees on disk and checks the restored mirror and
//! the report, both with the worker pool and with synchronous copies.

use ::deversion::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A backup tree and an empty restore target, both temporary
pub struct BackupTree {
    pub backup_dir: TempDir,
    pub restore_dir: TempDir,
}

impl BackupTree {
    /// Create an empty backup tree and restore target
    pub fn new() -> Self {
        Self {
            backup_dir: TempDir::new().unwrap(),
            restore_dir: TempDir::new().unwrap(),
        }
    }

    pub fn backup(&self) -> &Path {
        self.backup_dir.path()
    }

    pub fn restore(&self) -> &Path {
        self.restore_dir.path()
    }

    /// Create a plain directory in the backup tree
    pub fn dir(&self, rel: &str) -> anyhow::Result<PathBuf> {
        let path = self.backup().join(rel);
        fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Path of the version folder for `rel_file` (e.g. `docs/a.txt`)
    pub fn version_folder(&self, rel_file: &str) -> PathBuf {
        let rel = Path::new(rel_file);
        let name = rel.file_name().unwrap().to_string_lossy();
        let parent = rel.parent().unwrap_or(Path::new(""));
        self.backup()
            .join(parent)
            .join(format!("{}{}", name, VERSION_FOLDER_MARKER))
    }

    /// Add a live version of `rel_file` at `stamp`
    pub fn live(&self, rel_file: &str, stamp: &str, content: &str) -> anyhow::Result<PathBuf> {
        let entry = self.version_folder(rel_file).join(stamp);
        fs::create_dir_all(&entry)?;
        let file = entry.join(Path::new(rel_file).file_name().unwrap());
        fs::write(&file, content)?;
        Ok(file)
    }

    /// Add a deletion marker for `rel_file` at `stamp`
    pub fn deleted(&self, rel_file: &str, stamp: &str) -> anyhow::Result<PathBuf> {
        let entry = self.version_folder(rel_file).join(stamp);
        fs::create_dir_all(&entry)?;
        let marker = entry.join(DELETION_MARKER);
        fs::write(&marker, "")?;
        Ok(marker)
    }

    /// Run a restore with the given builder and an empty skip set
    pub fn run(&self, builder: RestoreBuilder) -> RestoreReport {
        self.run_with_skip(builder, &mut SkipSet::new())
    }

    /// Run a restore with the given builder and skip set
    pub fn run_with_skip(&self, builder: RestoreBuilder, skip: &mut SkipSet) -> RestoreReport {
        builder
            .build()
            .unwrap()
            .restore(self.backup(), self.restore(), skip)
            .unwrap()
    }

    /// Restored files, relative to the restore root, sorted
    pub fn restored_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<_> = walkdir::WalkDir::new(self.restore())
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().strip_prefix(self.restore()).unwrap().to_path_buf())
            .collect();
        files.sort();
        files
    }

    /// Content of a restored file
    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.restore().join(rel)).unwrap()
    }
}

/// Worker settings for the two copy modes every scenario runs under
pub fn modes() -> Vec<(&'static str, Option<usize>)> {
    vec![("workers", Some(3)), ("sync", None)]
}

#[cfg(test)]
mod restore_scenarios {
    use super::*;

    #[test]
    fn test_live_file_is_restored() {
        for (mode, workers) in modes() {
            let builder = RestoreBuilder::new().workers(workers);
            let tree = BackupTree::new();
            tree.live("fileA", "20230101000000", "A").unwrap();

            let report = tree.run(builder);
            assert_eq!(report.file_count, 1, "{}", mode);
            assert_eq!(report.deleted_file_count, 0, "{}", mode);
            assert_eq!(report.files_copied, 1, "{}", mode);
            assert_eq!(report.failed_count, 0, "{}", mode);
            assert_eq!(tree.read("fileA"), "A", "{}", mode);
        }
    }

    #[test]
    fn test_deleted_file_is_skipped() {
        for (mode, workers) in modes() {
            let builder = RestoreBuilder::new().workers(workers);
            let tree = BackupTree::new();
            tree.live("fileB", "20230101000000", "B").unwrap();
            tree.deleted("fileB", "20230201000000").unwrap();

            let report = tree.run(builder);
            assert_eq!(report.deleted_file_count, 1, "{}", mode);
            assert_eq!(report.files_copied, 0, "{}", mode);
            assert!(!tree.restore().join("fileB").exists(), "{}", mode);
            assert!(!tree.restore().join(DELETION_MARKER).exists(), "{}", mode);
        }
    }

    #[test]
    fn test_deleted_after_cutoff_is_restored() {
        for (mode, workers) in modes() {
            let builder = RestoreBuilder::new().workers(workers);
            let tree = BackupTree::new();
            tree.live("fileB", "20230101000000", "B from January").unwrap();
            tree.deleted("fileB", "20230201000000").unwrap();

            let cutoff: VersionTimestamp = "2023-01-15".parse().unwrap();
            let report = tree.run(builder.restore_deletions_after(Some(cutoff)));
            assert_eq!(report.deleted_file_count, 0, "{}", mode);
            assert_eq!(report.files_copied, 1, "{}", mode);
            assert_eq!(tree.read("fileB"), "B from January", "{}", mode);
        }
    }

    #[test]
    fn test_deleted_before_cutoff_stays_deleted() {
        let tree = BackupTree::new();
        tree.live("fileB", "20230101000000", "B").unwrap();
        tree.deleted("fileB", "20230201000000").unwrap();

        let cutoff: VersionTimestamp = "2023-03-01".parse().unwrap();
        let report = tree.run(RestoreBuilder::new().restore_deletions_after(Some(cutoff)));
        assert_eq!(report.deleted_file_count, 1);
        assert!(tree.restored_files().is_empty());
    }

    #[test]
    fn test_second_run_overwrites_nothing() {
        for (mode, workers) in modes() {
            let builder = RestoreBuilder::new().workers(workers);
            let tree = BackupTree::new();
            tree.live("docs/a.txt", "20230101000000", "a").unwrap();
            tree.live("docs/b.txt", "20230101000000", "b").unwrap();
            tree.live("c.txt", "20230101000000", "c").unwrap();

            let first = tree.run(RestoreBuilder::new().workers(workers));
            assert_eq!(first.files_copied, 3, "{}", mode);

            fs::write(tree.restore().join("c.txt"), "edited").unwrap();
            let second = tree.run(builder);
            assert_eq!(second.files_copied, 0, "{}", mode);
            assert_eq!(second.files_already_present, 3, "{}", mode);
            assert_eq!(second.failed_count, 0, "{}", mode);
            assert_eq!(tree.read("c.txt"), "edited", "{}", mode);
        }
    }

    #[test]
    fn test_all_deleted_directory_is_pruned() {
        for (mode, workers) in modes() {
            let builder = RestoreBuilder::new().workers(workers);
            let tree = BackupTree::new();
            tree.live("gone/x.txt", "20230101000000", "x").unwrap();
            tree.deleted("gone/x.txt", "20230201000000").unwrap();
            tree.deleted("gone/y.txt", "20230301000000").unwrap();
            tree.live("kept/z.txt", "20230101000000", "z").unwrap();
            tree.deleted("kept/w.txt", "20230201000000").unwrap();

            let report = tree.run(builder);
            assert_eq!(report.folder_count, 2, "{}", mode);
            assert_eq!(report.deleted_folder_count, 1, "{}", mode);
            assert_eq!(report.deleted_file_count, 3, "{}", mode);
            assert!(!tree.restore().join("gone").exists(), "{}", mode);
            assert_eq!(tree.read("kept/z.txt"), "z", "{}", mode);
        }
    }

    #[test]
    fn test_pruning_can_be_disabled() {
        let tree = BackupTree::new();
        tree.deleted("gone/x.txt", "20230201000000").unwrap();

        let report = tree.run(RestoreBuilder::new().prune_empty_dirs(false));
        assert_eq!(report.deleted_folder_count, 0);
        assert!(tree.restore().join("gone").is_dir());
    }

    #[test]
    fn test_nested_pruning_counts_each_level() {
        let tree = BackupTree::new();
        tree.deleted("a/b/c/x.txt", "20230201000000").unwrap();

        let report = tree.run(RestoreBuilder::new());
        assert_eq!(report.folder_count, 3);
        assert_eq!(report.deleted_folder_count, 3);
        assert!(!tree.restore().join("a").exists());
    }

    #[test]
    fn test_skip_list_entries_are_consumed() {
        for (mode, workers) in modes() {
            let builder = RestoreBuilder::new().workers(workers);
            let tree = BackupTree::new();
            tree.live("private/secret.txt", "20230101000000", "s").unwrap();
            tree.live("public/readme.txt", "20230101000000", "r").unwrap();

            let never_seen = tree.backup().join("does-not-exist");
            let mut skip: SkipSet = [tree.backup().join("private"), never_seen.clone()]
                .into_iter()
                .collect();

            let report = tree.run_with_skip(builder, &mut skip);
            assert_eq!(report.folder_count, 1, "{}", mode);
            assert_eq!(report.file_count, 1, "{}", mode);
            assert!(!tree.restore().join("private").exists(), "{}", mode);
            assert_eq!(tree.read("public/readme.txt"), "r", "{}", mode);

            let remaining: Vec<_> = skip.iter().map(Path::to_path_buf).collect();
            assert_eq!(remaining, vec![never_seen], "{}", mode);
        }
    }

    #[test]
    fn test_structural_violation_spares_siblings() {
        for (mode, workers) in modes() {
            let builder = RestoreBuilder::new().workers(workers);
            let tree = BackupTree::new();
            let bad = tree.dir("bad").unwrap();
            let stray = bad.join("stray.txt");
            fs::write(&stray, "not versioned").unwrap();
            tree.live("good/ok.txt", "20230101000000", "ok").unwrap();

            let report = tree.run(builder);
            assert!(report.failed_paths.contains(&stray), "{}", mode);
            assert_eq!(report.failed_count, 1, "{}", mode);
            assert_eq!(tree.read("good/ok.txt"), "ok", "{}", mode);
            assert!(!report.interrupted, "{}", mode);
        }
    }

    #[test]
    fn test_broken_version_folders_are_recorded() {
        for (mode, workers) in modes() {
            let builder = RestoreBuilder::new().workers(workers);
            let tree = BackupTree::new();
            let empty = tree.version_folder("empty.txt");
            fs::create_dir_all(&empty).unwrap();
            tree.live("crowded.txt", "20230101000000", "1").unwrap();
            let crowded = tree.version_folder("crowded.txt");
            fs::write(crowded.join("20230101000000").join("extra"), "2").unwrap();
            tree.live("fine.txt", "20230101000000", "fine").unwrap();

            let report = tree.run(builder);
            assert_eq!(report.failed_count, 2, "{}", mode);
            assert!(report.failed_paths.contains(&empty), "{}", mode);
            assert!(report.failed_paths.contains(&crowded), "{}", mode);
            assert_eq!(report.file_count, 1, "{}", mode);
            assert_eq!(tree.restored_files(), vec![PathBuf::from("fine.txt")], "{}", mode);
        }
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        for (mode, workers) in modes() {
            let builder = RestoreBuilder::new().workers(workers);
            let tree = BackupTree::new();
            tree.live("docs/a.txt", "20230101000000", "a").unwrap();
            tree.deleted("old/b.txt", "20230101000000").unwrap();

            let report = tree.run(builder.dry_run(true));
            assert_eq!(report.folder_count, 2, "{}", mode);
            assert_eq!(report.files_copied, 1, "{}", mode);
            assert_eq!(report.deleted_folder_count, 1, "{}", mode);
            assert!(tree.restored_files().is_empty(), "{}", mode);
            assert!(!tree.restore().join("docs").exists(), "{}", mode);
        }
    }

    #[test]
    fn test_dry_run_prune_count_matches_real_run() {
        for (mode, workers) in modes() {
            let tree = BackupTree::new();
            tree.deleted("old/b.txt", "20230101000000").unwrap();
            tree.deleted("gone/c.txt", "20230101000000").unwrap();
            fs::create_dir_all(tree.restore().join("old")).unwrap();
            fs::write(tree.restore().join("old").join("earlier.txt"), "keep").unwrap();

            let dry = tree.run(RestoreBuilder::new().workers(workers).dry_run(true));
            let real = tree.run(RestoreBuilder::new().workers(workers));
            assert_eq!(dry.deleted_folder_count, 1, "{}", mode);
            assert_eq!(real.deleted_folder_count, dry.deleted_folder_count, "{}", mode);
            assert_eq!(tree.read("old/earlier.txt"), "keep", "{}", mode);
            assert!(!tree.restore().join("gone").exists(), "{}", mode);
        }
    }

    #[test]
    fn test_version_counts_accumulate() {
        let tree = BackupTree::new();
        tree.live("a.txt", "20230101000000", "1").unwrap();
        tree.live("a.txt", "20230201000000", "2").unwrap();
        tree.live("a.txt", "20230301000000", "3").unwrap();
        tree.live("sub/b.txt", "20230101000000", "1").unwrap();
        tree.deleted("sub/b.txt", "20230201000000").unwrap();

        let report = tree.run(RestoreBuilder::new());
        assert_eq!(report.file_count, 2);
        assert_eq!(report.version_count, 4);
        assert_eq!(tree.read("a.txt"), "3");
    }

    #[test]
    fn test_large_tree_with_small_queues() {
        let tree = BackupTree::new();
        let mut expected = Vec::new();
        for d in 0..5 {
            for f in 0..40 {
                let rel = format!("dir_{}/nested_{}/file_{}.txt", d, d % 2, f);
                tree.live(&rel, "20230101000000", &format!("v1 {}", rel)).unwrap();
                tree.live(&rel, "20230601000000", &format!("v2 {}", rel)).unwrap();
                expected.push(PathBuf::from(rel));
            }
        }
        expected.sort();

        let report = tree.run(RestoreBuilder::new().workers(Some(4)).queue_capacity(2));
        assert_eq!(report.file_count, 200);
        assert_eq!(report.version_count, 400);
        assert_eq!(report.files_copied, 200);
        assert!(report.is_clean());
        assert_eq!(tree.restored_files(), expected);
        assert_eq!(tree.read("dir_3/nested_1/file_7.txt"), "v2 dir_3/nested_1/file_7.txt");
    }
}
