use std::path::Path;

use chrono::{DateTime, Local};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::ext::{BestEffortPathExt, SystemTimeExt};
use crate::scanner::epoch_sentinel;

/// Newest modification time among all regular files under `source_root`.
///
/// Walks the whole tree, so it is meant for startup seeding rather than for
/// every scheduling tick.
pub fn latest_change_instant(source_root: &Path) -> DateTime<Local> {
    latest_change_instant_excluding(source_root, None)
}

/// Same as [`latest_change_instant`], but never descends into `excluded`.
/// Used when the backup root sits inside the source tree.
pub fn latest_change_instant_excluding(
    source_root: &Path,
    excluded: Option<&Path>,
) -> DateTime<Local> {
    let mut file_count = 0usize;

    let latest = WalkDir::new(source_root)
        .into_iter()
        .filter_entry(|entry| excluded.is_none_or(|excluded| entry.path() != excluded))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("Skipping unreadable entry during change scan: {}", err);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            file_count += 1;
            let modified = entry
                .metadata()
                .map_err(std::io::Error::from)
                .and_then(|meta| meta.modified());
            match modified {
                Ok(modified) => Some(modified.to_local_seconds()),
                Err(err) => {
                    warn!(
                        "Cannot read modification time of {}: {}",
                        entry.path().best_effort_path_display(),
                        err
                    );
                    None
                }
            }
        })
        .max();

    debug!(
        "Scanned {} files under {}",
        file_count,
        source_root.best_effort_path_display()
    );

    latest.unwrap_or_else(epoch_sentinel)
}
