//! Read-only inspection of the two directory trees the scheduler is seeded
//! from: the newest backup found by directory name, and the newest file
//! modification found by walking the source tree.

mod backup_stamp;
mod change_scan;

pub use backup_stamp::{BackupStamp, epoch_sentinel, latest_backup_instant};
pub use change_scan::{latest_change_instant, latest_change_instant_excluding};
