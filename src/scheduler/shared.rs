use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local};

use super::{BackupScheduler, SchedulerPhase};

/// Handle to a scheduler shared between the change notifier thread and the
/// driving loop. One lock guards both instants, since they are always
/// compared together.
#[derive(Debug, Clone)]
pub struct SharedScheduler {
    inner: Arc<Mutex<BackupScheduler>>,
}

impl SharedScheduler {
    pub fn new(scheduler: BackupScheduler) -> Self {
        Self {
            inner: Arc::new(Mutex::new(scheduler)),
        }
    }

    // A poisoned guard still holds two whole instants.
    fn lock(&self) -> MutexGuard<'_, BackupScheduler> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_modification(&self, instant: DateTime<Local>) {
        self.lock().record_modification(instant);
    }

    pub fn record_backup_execution(&self, instant: DateTime<Local>) {
        self.lock().record_backup_execution(instant);
    }

    pub fn needs_backup(&self, now: DateTime<Local>) -> bool {
        self.lock().needs_backup(now)
    }

    pub fn next_check_delay(&self, last_checked: DateTime<Local>) -> Duration {
        self.lock().next_check_delay(last_checked)
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.lock().has_unsaved_changes()
    }

    pub fn phase(&self, now: DateTime<Local>) -> SchedulerPhase {
        self.lock().phase(now)
    }

    pub fn snapshot(&self) -> BackupScheduler {
        self.lock().clone()
    }
}
