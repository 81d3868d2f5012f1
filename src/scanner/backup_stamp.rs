use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, Local, NaiveDateTime, SubsecRound, TimeZone, Utc};
use derive_more::Display;
use regex::Regex;
use tracing::{debug, warn};

use crate::ext::BestEffortPathExt;

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

static STAMP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{8}_\d{6}$").expect("backup stamp pattern is a valid regex")
});

/// Name of one backup directory, `YYYYMMDD_HHMMSS` in local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[display("{}", _0.format(STAMP_FORMAT))]
pub struct BackupStamp(DateTime<Local>);

impl BackupStamp {
    pub fn from_instant(instant: DateTime<Local>) -> Self {
        Self(instant.trunc_subsecs(0))
    }

    /// Parses a directory name. Names outside the pattern, impossible dates,
    /// and local times skipped by a DST transition all yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        if !STAMP_PATTERN.is_match(name) {
            return None;
        }
        let naive = NaiveDateTime::parse_from_str(name, STAMP_FORMAT).ok()?;
        Local.from_local_datetime(&naive).earliest().map(Self)
    }

    pub fn instant(&self) -> DateTime<Local> {
        self.0
    }
}

/// Stand-in for "never" returned by both scanners when they find nothing.
pub fn epoch_sentinel() -> DateTime<Local> {
    DateTime::<Utc>::UNIX_EPOCH.with_timezone(&Local)
}

/// Newest backup among the immediate children of `backup_root`, judged by
/// name alone.
pub fn latest_backup_instant(backup_root: &Path) -> DateTime<Local> {
    let entries = match std::fs::read_dir(backup_root) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(
                "Cannot list backup directory {}: {}",
                backup_root.best_effort_path_display(),
                err
            );
            return epoch_sentinel();
        }
    };

    let latest = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("Skipping unreadable backup directory entry: {}", err);
                None
            }
        })
        .filter_map(|entry| {
            let name = entry.file_name();
            let stamp = name.to_str().and_then(BackupStamp::parse);
            if stamp.is_none() {
                debug!("Ignoring non-backup entry {:?}", name);
            }
            stamp
        })
        .max();

    match latest {
        Some(stamp) => {
            debug!("Latest backup found: {}", stamp);
            stamp.instant()
        }
        None => epoch_sentinel(),
    }
}
