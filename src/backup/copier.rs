use std::path::{Path, PathBuf};

use compio::fs;
use filetime::FileTime;
use snafu::{Report, ResultExt, Snafu};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::ext::BestEffortPathExt;
use crate::scanner::BackupStamp;

/// Outcome of one full-tree backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub stamp: BackupStamp,
    pub destination: PathBuf,
    pub copied: usize,
    pub failed: usize,
}

/// Mirrors every regular file of `source` into a fresh `backup_root/<stamp>`
/// directory, keeping access and modification times of the originals.
#[derive(Debug, Clone)]
pub struct TreeCopier {
    source: PathBuf,
    backup_root: PathBuf,
}

impl TreeCopier {
    pub fn new(source: impl Into<PathBuf>, backup_root: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            backup_root: backup_root.into(),
        }
    }

    pub fn destination_for(&self, stamp: BackupStamp) -> PathBuf {
        self.backup_root.join(stamp.to_string())
    }

    /// Copies the tree. Only failing to create the destination aborts the
    /// backup; individual files that cannot be copied are logged and counted.
    pub async fn copy(&self, stamp: BackupStamp) -> Result<BackupReport, BackupError> {
        let destination = self.destination_for(stamp);
        info!(
            "Starting new backup to {}",
            destination.best_effort_path_display()
        );

        fs::create_dir_all(&destination)
            .await
            .context(CreateDestinationSnafu {
                path: destination.best_effort_path_display(),
            })?;

        let mut report = BackupReport {
            stamp,
            destination,
            copied: 0,
            failed: 0,
        };

        let walker = WalkDir::new(&self.source)
            .into_iter()
            .filter_entry(|entry| !self.is_backup_root(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Skipping unreadable entry: {}", err);
                    report.failed += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            match self.copy_file(entry.path(), &report.destination).await {
                Ok(target) => {
                    debug!(
                        "Copied: {} -> {}",
                        entry.path().display(),
                        target.display()
                    );
                    report.copied += 1;
                }
                Err(err) => {
                    warn!(
                        "Error copying {}: {}",
                        entry.path().display(),
                        Report::from_error(err)
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            "Backup {} finished: {} files copied, {} failed",
            report.stamp, report.copied, report.failed
        );
        Ok(report)
    }

    fn is_backup_root(&self, entry: &DirEntry) -> bool {
        entry.file_type().is_dir() && entry.path() == self.backup_root
    }

    async fn copy_file(
        &self,
        source: &Path,
        destination_root: &Path,
    ) -> Result<PathBuf, CopyFileError> {
        let relative = source
            .strip_prefix(&self.source)
            .map_err(|_| CopyFileError::OutsideSourceError {
                path: source.to_path_buf(),
            })?;
        let target = destination_root.join(relative);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .context(CreateDirSnafu { path: parent })?;
        }

        let metadata = std::fs::metadata(source).context(ReadSnafu { path: source })?;
        let bytes = fs::read(source).await.context(ReadSnafu { path: source })?;
        fs::write(&target, bytes)
            .await
            .0
            .context(WriteSnafu { path: &target })?;

        filetime::set_file_times(
            &target,
            FileTime::from_last_access_time(&metadata),
            FileTime::from_last_modification_time(&metadata),
        )
        .context(PreserveTimesSnafu { path: &target })?;

        Ok(target)
    }
}

#[derive(Debug, Snafu)]
pub enum BackupError {
    #[snafu(display("Failed to create backup directory {}", path))]
    CreateDestinationError {
        path: String,
        source: std::io::Error,
    },
}

#[derive(Debug, Snafu)]
pub enum CopyFileError {
    #[snafu(display("{} is not inside the source tree", path.display()))]
    OutsideSourceError { path: PathBuf },
    #[snafu(display("Failed to create directory {}", path.display()))]
    CreateDirError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to read {}", path.display()))]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to write {}", path.display()))]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to preserve file times on {}", path.display()))]
    PreserveTimesError {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use std::fs as std_fs;
    use tempfile::TempDir;

    fn stamp() -> BackupStamp {
        BackupStamp::from_instant(
            Local
                .with_ymd_and_hms(2024, 1, 1, 1, 23, 46)
                .earliest()
                .expect("Test instant should exist in local time"),
        )
    }

    fn write(path: PathBuf, contents: &str) {
        std_fs::create_dir_all(path.parent().unwrap()).unwrap();
        std_fs::write(path, contents).unwrap();
    }

    #[compio::test]
    async fn test_copy_mirrors_nested_tree_into_stamped_directory() {
        let source = TempDir::new().expect("Failed to create source dir");
        let backups = TempDir::new().expect("Failed to create backup dir");
        write(source.path().join("level.dat"), "level");
        write(source.path().join("region").join("r.0.0.mca"), "region");
        write(source.path().join("a").join("b").join("c.txt"), "deep");
        std_fs::create_dir(source.path().join("empty")).unwrap();

        let copier = TreeCopier::new(source.path(), backups.path());
        let report = copier.copy(stamp()).await.expect("Backup should succeed");

        let destination = backups.path().join("20240101_012346");
        assert_eq!(report.destination, destination);
        assert_eq!(report.copied, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(std_fs::read_to_string(destination.join("level.dat")).unwrap(), "level");
        assert_eq!(
            std_fs::read_to_string(destination.join("region").join("r.0.0.mca")).unwrap(),
            "region"
        );
        assert_eq!(
            std_fs::read_to_string(destination.join("a").join("b").join("c.txt")).unwrap(),
            "deep"
        );
    }

    #[compio::test]
    async fn test_copy_preserves_modification_times() {
        let source = TempDir::new().expect("Failed to create source dir");
        let backups = TempDir::new().expect("Failed to create backup dir");
        let original = source.path().join("world").join("level.dat");
        write(original.clone(), "level");
        let mtime = FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(&original, mtime).unwrap();

        let report = TreeCopier::new(source.path(), backups.path())
            .copy(stamp())
            .await
            .expect("Backup should succeed");

        let copied_meta =
            std_fs::metadata(report.destination.join("world").join("level.dat")).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&copied_meta), mtime);
    }

    #[compio::test]
    async fn test_copy_leaves_source_change_time_untouched() {
        let source = TempDir::new().expect("Failed to create source dir");
        let backups = TempDir::new().expect("Failed to create backup dir");
        write(source.path().join("level.dat"), "level");
        filetime::set_file_mtime(
            source.path().join("level.dat"),
            FileTime::from_unix_time(1_600_000_000, 0),
        )
        .unwrap();
        let before = crate::scanner::latest_change_instant(source.path());

        TreeCopier::new(source.path(), backups.path())
            .copy(stamp())
            .await
            .expect("Backup should succeed");

        assert_eq!(crate::scanner::latest_change_instant(source.path()), before);
    }

    #[compio::test]
    async fn test_copy_is_found_by_backup_scan() {
        let source = TempDir::new().expect("Failed to create source dir");
        let backups = TempDir::new().expect("Failed to create backup dir");
        write(source.path().join("level.dat"), "level");

        TreeCopier::new(source.path(), backups.path())
            .copy(stamp())
            .await
            .expect("Backup should succeed");

        assert_eq!(
            crate::scanner::latest_backup_instant(backups.path()),
            stamp().instant()
        );
    }

    #[compio::test]
    async fn test_copy_skips_backup_root_nested_in_source() {
        let source = TempDir::new().expect("Failed to create source dir");
        let backup_root = source.path().join("backups");
        write(source.path().join("level.dat"), "level");
        write(backup_root.join("20200101_000000").join("level.dat"), "old");

        let report = TreeCopier::new(source.path(), &backup_root)
            .copy(stamp())
            .await
            .expect("Backup should succeed");

        assert_eq!(report.copied, 1);
        assert!(!report.destination.join("backups").exists());
    }

    #[compio::test]
    async fn test_copy_of_empty_tree_creates_empty_backup() {
        let source = TempDir::new().expect("Failed to create source dir");
        let backups = TempDir::new().expect("Failed to create backup dir");

        let report = TreeCopier::new(source.path(), backups.path())
            .copy(stamp())
            .await
            .expect("Backup should succeed");

        assert_eq!(report.copied, 0);
        assert!(report.destination.is_dir());
    }

    #[compio::test]
    async fn test_copy_creates_missing_backup_root() {
        let source = TempDir::new().expect("Failed to create source dir");
        let backups = TempDir::new().expect("Failed to create backup dir");
        let backup_root = backups.path().join("not").join("yet").join("there");
        write(source.path().join("level.dat"), "level");

        let report = TreeCopier::new(source.path(), &backup_root)
            .copy(stamp())
            .await
            .expect("Backup should succeed");

        assert!(report.destination.join("level.dat").is_file());
    }

    #[compio::test]
    async fn test_copy_fails_when_destination_cannot_be_created() {
        let source = TempDir::new().expect("Failed to create source dir");
        let backups = TempDir::new().expect("Failed to create backup dir");
        let blocker = backups.path().join("blocker");
        std_fs::write(&blocker, "a file where a directory should be").unwrap();

        let result = TreeCopier::new(source.path(), &blocker).copy(stamp()).await;

        assert!(matches!(
            result,
            Err(BackupError::CreateDestinationError { .. })
        ));
    }
}
