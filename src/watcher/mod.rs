//! Filesystem change notification for the source tree.

mod change_notifier;


pub use change_notifier::{ChangeNotifier, NotifierError, NotifierSignal};
