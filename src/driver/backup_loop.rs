use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local};
use futures::{FutureExt, StreamExt, pin_mut, select};
use futures_channel::mpsc::UnboundedReceiver;
use snafu::{Report, ResultExt, Snafu};
use tracing::{debug, error, info};

use crate::backup::{BackupReport, TreeCopier};
use crate::scanner::{BackupStamp, epoch_sentinel, latest_change_instant_excluding};
use crate::scheduler::SharedScheduler;
use crate::watcher::NotifierSignal;

/// Why the loop woke up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Timer,
    Notification,
}

/// The single thread of control that asks the scheduler whether a backup is
/// due, runs the copy, and sleeps until the next check.
pub struct BackupLoop {
    scheduler: SharedScheduler,
    copier: TreeCopier,
    source: PathBuf,
    excluded: Option<PathBuf>,
    rescan_on_interval: bool,
}

impl BackupLoop {
    pub fn new(
        scheduler: SharedScheduler,
        source: PathBuf,
        backup_root: PathBuf,
        rescan_on_interval: bool,
    ) -> Self {
        let excluded = backup_root
            .starts_with(&source)
            .then(|| backup_root.clone());

        Self {
            copier: TreeCopier::new(source.clone(), backup_root),
            scheduler,
            source,
            excluded,
            rescan_on_interval,
        }
    }

    /// Runs until Ctrl-C. A failing or vanished change notifier ends the loop
    /// with an error, since backups would silently stop otherwise.
    pub async fn run(
        &self,
        mut signals: UnboundedReceiver<NotifierSignal>,
    ) -> Result<(), LoopError> {
        let shutdown = compio::signal::ctrl_c().fuse();
        pin_mut!(shutdown);

        loop {
            let delay = self.tick(Local::now()).await;
            debug!(
                "Scheduler {:?}, next backup check in {:?}",
                self.scheduler.phase(Local::now()),
                delay
            );

            let sleep = compio::time::sleep(delay).fuse();
            pin_mut!(sleep);

            let wake = select! {
                () = sleep => Wake::Timer,
                signal = signals.next() => match signal {
                    Some(NotifierSignal::Modified) => Wake::Notification,
                    Some(NotifierSignal::Failed(source)) => {
                        return Err(LoopError::NotifierFailed { source });
                    }
                    None => return NotifierDisconnectedSnafu.fail(),
                },
                res = shutdown => {
                    res.context(ShutdownSignalSnafu)?;
                    info!("Received Ctrl-C, stopping");
                    return Ok(());
                }
            };

            if wake == Wake::Timer && self.rescan_on_interval {
                self.reconcile();
            }
        }
    }

    /// One scheduling step: back up if due, then report how long to sleep.
    /// The delay is measured from `now` unless a copy ran, in which case it is
    /// measured from when the copy finished.
    pub async fn tick(&self, now: DateTime<Local>) -> Duration {
        if !self.scheduler.needs_backup(now) {
            return self.scheduler.next_check_delay(now);
        }
        self.backup().await;
        self.scheduler.next_check_delay(Local::now())
    }

    /// Backs up once if anything changed after the newest backup, ignoring
    /// the settle window. Returns `None` when the tree was already saved.
    pub async fn catch_up(&self) -> Option<BackupReport> {
        if !self.scheduler.has_unsaved_changes() {
            info!("Backups are up to date, nothing to do");
            return None;
        }
        self.backup().await
    }

    async fn backup(&self) -> Option<BackupReport> {
        // Recorded at full precision: edits made during the copy stay unsaved,
        // while the change that triggered it is never newer than the record.
        let started_at = Local::now();
        let stamp = BackupStamp::from_instant(started_at);

        match self.copier.copy(stamp).await {
            Ok(report) => {
                self.scheduler.record_backup_execution(started_at);
                Some(report)
            }
            Err(err) => {
                error!("Backup {} failed: {}", stamp, Report::from_error(err));
                None
            }
        }
    }

    /// Picks up changes a lost notification would have reported.
    fn reconcile(&self) {
        let latest = latest_change_instant_excluding(&self.source, self.excluded.as_deref());
        if latest == epoch_sentinel() {
            return;
        }

        let known = self.scheduler.snapshot();
        let newest_known = known.last_modification().max(known.last_backup());
        if newest_known.is_none_or(|newest| latest > newest) {
            info!("Rescan found unrecorded changes at {}", latest);
            self.scheduler.record_modification(latest);
        }
    }
}

#[derive(Debug, Snafu)]
pub enum LoopError {
    #[snafu(display("The filesystem watcher failed"))]
    NotifierFailed { source: notify::Error },
    #[snafu(display("The filesystem watcher stopped unexpectedly"))]
    NotifierDisconnected,
    #[snafu(display("Failed to listen for Ctrl-C"))]
    ShutdownSignalError { source: std::io::Error },
}
