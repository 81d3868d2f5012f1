use std::path::{Path, PathBuf};

use compio::fs;
use snafu::Snafu;
use snafu::prelude::*;
use tracing::{debug, info};

use crate::application::RuntimeConfig;
use crate::config::{BackupConfig, ConfigError};
use crate::driver::{BackupLoop, LoopError};
use crate::ext::BestEffortPathExt;
use crate::scanner::{latest_backup_instant, latest_change_instant_excluding};
use crate::scheduler::{BackupScheduler, SharedScheduler};
use crate::watcher::{ChangeNotifier, NotifierError};

pub struct Application;

impl Application {
    pub async fn run(app_config: impl Into<RuntimeConfig>) -> Result<(), ApplicationError> {
        let app_config: RuntimeConfig = app_config.into();
        let config = BackupConfig::from_path(&app_config.config_path)
            .await
            .context(ConfigSnafu)?;
        debug!("Loaded config: {:?}", config);

        let (source, backup_root) = Self::prepare_directories(&config).await?;
        let excluded = backup_root.starts_with(&source).then(|| backup_root.clone());

        let scheduler = SharedScheduler::new(BackupScheduler::seeded(
            config.backup_interval,
            latest_backup_instant(&backup_root),
            latest_change_instant_excluding(&source, excluded.as_deref()),
        ));
        debug!("Seeded scheduler: {:?}", scheduler.snapshot());

        let backup_loop = BackupLoop::new(
            scheduler.clone(),
            source.clone(),
            backup_root,
            config.rescan_on_interval,
        );

        if app_config.once {
            backup_loop.catch_up().await;
            return Ok(());
        }

        let (notifier, signals) =
            ChangeNotifier::watch(&source, excluded, scheduler).context(NotifierSnafu)?;

        info!(
            "Backup loop started for {}, checking every {:?}",
            notifier.root().display(),
            config.backup_interval
        );
        backup_loop.run(signals).await.context(LoopSnafu)?;
        drop(notifier);

        Ok(())
    }

    /// Resolves both directories to canonical paths so the backup root can be
    /// recognised when it is nested inside the source tree.
    async fn prepare_directories(
        config: &BackupConfig,
    ) -> Result<(PathBuf, PathBuf), ApplicationError> {
        let source = canonical_dir(&config.source_directory).context(SourceMissingSnafu {
            path: config.source_directory.best_effort_path_display(),
        })?;

        fs::create_dir_all(&config.backup_directory)
            .await
            .context(BackupRootSnafu {
                path: config.backup_directory.best_effort_path_display(),
            })?;
        let backup_root = canonical_dir(&config.backup_directory).context(BackupRootSnafu {
            path: config.backup_directory.best_effort_path_display(),
        })?;

        ensure!(
            source != backup_root && !source.starts_with(&backup_root),
            OverlappingDirectoriesSnafu {
                source_path: source.display().to_string(),
                backup_path: backup_root.display().to_string(),
            }
        );

        Ok((source, backup_root))
    }
}

fn canonical_dir(path: &Path) -> std::io::Result<PathBuf> {
    let canonical = path.canonicalize()?;
    if canonical.is_dir() {
        Ok(canonical)
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::NotADirectory,
            "not a directory",
        ))
    }
}

#[derive(Debug, Snafu)]
pub enum ApplicationError {
    #[snafu(display("Critical failure encountered during configuration stage"))]
    ConfigError { source: ConfigError },
    #[snafu(display("Source directory {} is not accessible", path))]
    SourceMissingError {
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("Backup directory {} cannot be used", path))]
    BackupRootError {
        path: String,
        source: std::io::Error,
    },
    #[snafu(display(
        "Source directory {} lies inside backup directory {}",
        source_path,
        backup_path
    ))]
    OverlappingDirectoriesError {
        source_path: String,
        backup_path: String,
    },
    #[snafu(display("Critical failure encountered while starting the change notifier"))]
    NotifierError { source: NotifierError },
    #[snafu(display("Critical failure encountered in the backup loop"))]
    LoopError { source: LoopError },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as std_fs;
    use tempfile::TempDir;

    struct Workspace {
        root: TempDir,
    }

    impl Workspace {
        fn new() -> Self {
            let root = TempDir::new().expect("Failed to create temp directory");
            std_fs::create_dir(root.path().join("world")).unwrap();
            Self { root }
        }

        fn write_config(&self, source: &Path, backups: &Path) -> PathBuf {
            let config_path = self.root.path().join("dirsnap.yaml");
            let contents = format!(
                "source_directory: {}\nbackup_directory: {}\nbackup_interval: 300\n",
                source.display(),
                backups.display()
            );
            std_fs::write(&config_path, contents).unwrap();
            config_path
        }

        fn runtime_config(&self, config_path: PathBuf) -> RuntimeConfig {
            RuntimeConfig {
                config_path,
                once: true,
            }
        }

        fn backups_in(dir: &Path) -> Vec<String> {
            std_fs::read_dir(dir)
                .map(|entries| {
                    entries
                        .filter_map(Result::ok)
                        .map(|entry| entry.file_name().to_string_lossy().to_string())
                        .collect()
                })
                .unwrap_or_default()
        }
    }

    #[compio::test]
    async fn test_once_backs_up_fresh_tree_and_creates_backup_root() {
        let workspace = Workspace::new();
        let source = workspace.root.path().join("world");
        let backups = workspace.root.path().join("backups");
        std_fs::write(source.join("level.dat"), "level").unwrap();
        let config_path = workspace.write_config(&source, &backups);

        Application::run(workspace.runtime_config(config_path))
            .await
            .expect("Run should succeed");

        let names = Workspace::backups_in(&backups);
        assert_eq!(names.len(), 1);
        assert!(crate::scanner::BackupStamp::parse(&names[0]).is_some());
        assert!(backups.join(&names[0]).join("level.dat").is_file());
    }

    #[compio::test]
    async fn test_once_skips_when_backup_is_newer_than_changes() {
        let workspace = Workspace::new();
        let source = workspace.root.path().join("world");
        let backups = workspace.root.path().join("backups");
        std_fs::write(source.join("level.dat"), "level").unwrap();
        filetime::set_file_mtime(
            source.join("level.dat"),
            filetime::FileTime::from_unix_time(1_600_000_000, 0),
        )
        .unwrap();
        std_fs::create_dir_all(backups.join("20240101_000000")).unwrap();
        let config_path = workspace.write_config(&source, &backups);

        Application::run(workspace.runtime_config(config_path))
            .await
            .expect("Run should succeed");

        assert_eq!(Workspace::backups_in(&backups), vec!["20240101_000000"]);
    }

    #[compio::test]
    async fn test_once_with_empty_source_does_nothing() {
        let workspace = Workspace::new();
        let source = workspace.root.path().join("world");
        let backups = workspace.root.path().join("backups");
        let config_path = workspace.write_config(&source, &backups);

        Application::run(workspace.runtime_config(config_path))
            .await
            .expect("Run should succeed");

        assert!(Workspace::backups_in(&backups).is_empty());
    }

    #[compio::test]
    async fn test_nested_backup_root_is_not_copied_into_itself() {
        let workspace = Workspace::new();
        let source = workspace.root.path().join("world");
        let backups = source.join("backups");
        std_fs::write(source.join("level.dat"), "level").unwrap();
        let config_path = workspace.write_config(&source, &backups);

        Application::run(workspace.runtime_config(config_path))
            .await
            .expect("Run should succeed");

        let names = Workspace::backups_in(&backups);
        assert_eq!(names.len(), 1);
        assert!(!backups.join(&names[0]).join("backups").exists());
    }

    #[compio::test]
    async fn test_missing_source_is_fatal() {
        let workspace = Workspace::new();
        let source = workspace.root.path().join("no_such_world");
        let backups = workspace.root.path().join("backups");
        let config_path = workspace.write_config(&source, &backups);

        let result = Application::run(workspace.runtime_config(config_path)).await;

        assert!(matches!(
            result,
            Err(ApplicationError::SourceMissingError { .. })
        ));
    }

    #[compio::test]
    async fn test_source_inside_backup_root_is_fatal() {
        let workspace = Workspace::new();
        let backups = workspace.root.path().to_path_buf();
        let source = workspace.root.path().join("world");
        let config_path = workspace.write_config(&source, &backups);

        let result = Application::run(workspace.runtime_config(config_path)).await;

        assert!(matches!(
            result,
            Err(ApplicationError::OverlappingDirectoriesError { .. })
        ));
    }

    #[compio::test]
    async fn test_missing_config_is_fatal() {
        let workspace = Workspace::new();

        let result = Application::run(
            workspace.runtime_config(workspace.root.path().join("missing.yaml")),
        )
        .await;

        assert!(matches!(result, Err(ApplicationError::ConfigError { .. })));
    }
}
