use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta};

use crate::scanner::epoch_sentinel;

/// Quiet period after the most recent change before a backup may start.
pub const SETTLE_WINDOW_SECS: i64 = 5;

/// Logical state derived from the two recorded instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    /// Nothing changed since the last backup.
    Idle,
    /// A change is waiting for the settle window to close.
    Pending,
    /// A change has settled and should be backed up now.
    Due,
}

/// Decides from timestamps alone whether a backup is due and how long the
/// driving loop may sleep before asking again.
///
/// Callers must feed instants from a non-decreasing clock; a clock that jumps
/// backwards is not corrected for.
#[derive(Debug, Clone)]
pub struct BackupScheduler {
    last_modification: Option<DateTime<Local>>,
    last_backup: Option<DateTime<Local>>,
    backup_interval: Duration,
    settle_window: TimeDelta,
}

impl BackupScheduler {
    pub fn new(backup_interval: Duration) -> Self {
        Self {
            last_modification: None,
            last_backup: None,
            backup_interval,
            settle_window: TimeDelta::seconds(SETTLE_WINDOW_SECS),
        }
    }

    /// Builds a scheduler from the scanner results found at startup. The
    /// scanners' sentinel instant stands for "never" and is stored as absent.
    pub fn seeded(
        backup_interval: Duration,
        last_backup: DateTime<Local>,
        last_modification: DateTime<Local>,
    ) -> Self {
        let known = |instant: DateTime<Local>| (instant != epoch_sentinel()).then_some(instant);

        Self {
            last_modification: known(last_modification),
            last_backup: known(last_backup),
            ..Self::new(backup_interval)
        }
    }

    pub fn record_modification(&mut self, instant: DateTime<Local>) {
        self.last_modification = Some(instant);
    }

    pub fn record_backup_execution(&mut self, instant: DateTime<Local>) {
        self.last_backup = Some(instant);
    }

    pub fn last_modification(&self) -> Option<DateTime<Local>> {
        self.last_modification
    }

    pub fn last_backup(&self) -> Option<DateTime<Local>> {
        self.last_backup
    }

    pub fn backup_interval(&self) -> Duration {
        self.backup_interval
    }

    /// `true` when the newest known change has not been captured by a backup,
    /// regardless of the settle window.
    pub fn has_unsaved_changes(&self) -> bool {
        match (self.last_modification, self.last_backup) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(modified), Some(backed_up)) => backed_up < modified,
        }
    }

    pub fn needs_backup(&self, now: DateTime<Local>) -> bool {
        match (self.last_modification, self.last_backup) {
            (None, _) => false,
            // Nothing has ever been backed up, so there is no burst to wait out.
            (Some(_), None) => true,
            (Some(modified), Some(backed_up)) if backed_up >= modified => false,
            (Some(modified), Some(_)) => modified + self.settle_window < now,
        }
    }

    /// Time until the next `needs_backup` check: the rest of the settle window
    /// while a change is settling, the full backup interval otherwise.
    pub fn next_check_delay(&self, last_checked: DateTime<Local>) -> Duration {
        if let Some(settled_at) = self.settle_deadline() {
            if last_checked <= settled_at {
                return (settled_at - last_checked)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
            }
        }
        self.backup_interval
    }

    pub fn phase(&self, now: DateTime<Local>) -> SchedulerPhase {
        if self.needs_backup(now) {
            SchedulerPhase::Due
        } else if self.has_unsaved_changes() {
            SchedulerPhase::Pending
        } else {
            SchedulerPhase::Idle
        }
    }

    /// End of the settle window for an unsaved change, if there is one.
    fn settle_deadline(&self) -> Option<DateTime<Local>> {
        if !self.has_unsaved_changes() {
            return None;
        }
        self.last_modification
            .map(|modified| modified + self.settle_window)
    }
}
