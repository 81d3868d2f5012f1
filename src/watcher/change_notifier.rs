use std::path::{Path, PathBuf};

use chrono::Local;
use futures_channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, info, trace};

use crate::ext::BestEffortPathExt;
use crate::scheduler::SharedScheduler;

/// What the notifier tells the driving loop.
#[derive(Debug)]
pub enum NotifierSignal {
    /// A change was recorded in the scheduler; re-evaluate now.
    Modified,
    /// The OS watcher reported an error and can no longer be trusted.
    Failed(notify::Error),
}

/// Recursive watch over the source tree. Every relevant event is written
/// straight into the shared scheduler, then the driving loop is woken.
///
/// Dropping the notifier stops the watch and closes the signal channel.
pub struct ChangeNotifier {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl ChangeNotifier {
    pub fn watch(
        root: &Path,
        excluded: Option<PathBuf>,
        scheduler: SharedScheduler,
    ) -> Result<(Self, UnboundedReceiver<NotifierSignal>), NotifierError> {
        ensure!(
            root.is_dir(),
            MissingRootSnafu {
                path: root.best_effort_path_display(),
            }
        );

        let (signal_tx, signal_rx) = mpsc::unbounded::<NotifierSignal>();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            handle_event(res, excluded.as_deref(), &scheduler, &signal_tx);
        })
        .context(CreateSnafu)?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .context(WatchSnafu {
                path: root.best_effort_path_display(),
            })?;

        info!("Watching {} for changes", root.best_effort_path_display());

        Ok((
            Self {
                _watcher: watcher,
                root: root.to_path_buf(),
            },
            signal_rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn handle_event(
    res: notify::Result<Event>,
    excluded: Option<&Path>,
    scheduler: &SharedScheduler,
    signal_tx: &UnboundedSender<NotifierSignal>,
) {
    let signal = match res {
        Ok(event) => {
            if !is_relevant(&event, excluded) {
                trace!("Ignoring filesystem event {:?}", event);
                return;
            }
            debug!("Filesystem change: {:?} {:?}", event.kind, event.paths);
            scheduler.record_modification(Local::now());
            NotifierSignal::Modified
        }
        Err(err) => NotifierSignal::Failed(err),
    };

    if let Err(send_err) = signal_tx.unbounded_send(signal) {
        debug!("Driving loop is gone, dropping signal: {}", send_err);
    }
}

/// Reads and opens never change content, and the backup root may live inside
/// the watched tree; neither may trigger a backup.
pub(crate) fn is_relevant(event: &Event, excluded: Option<&Path>) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }

    match excluded {
        Some(excluded) if !event.paths.is_empty() => event
            .paths
            .iter()
            .any(|path| !path.starts_with(excluded)),
        _ => true,
    }
}

#[derive(Debug, Snafu)]
pub enum NotifierError {
    #[snafu(display("Cannot watch {}: not an existing directory", path))]
    MissingRootError { path: String },
    #[snafu(display("Failed to create the filesystem watcher"))]
    CreateError { source: notify::Error },
    #[snafu(display("Failed to start watching {}", path))]
    WatchError { path: String, source: notify::Error },
}
