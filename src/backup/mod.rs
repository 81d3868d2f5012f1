mod copier;

pub use copier::{BackupError, BackupReport, TreeCopier};
