mod backup_scheduler;
mod shared;

pub use backup_scheduler::{BackupScheduler, SETTLE_WINDOW_SECS, SchedulerPhase};
pub use shared::SharedScheduler;
