mod backup_loop;

pub use backup_loop::{BackupLoop, LoopError};
