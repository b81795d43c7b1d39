//! Debounced file system watcher.

use notify_debouncer_full::notify::event::{ModifyKind, RenameMode};
use notify_debouncer_full::notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, DebouncedEvent, Debouncer, RecommendedCache};
use ragwatch_core::FileEvent;
use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{debug, error, warn};

use crate::filter::is_hidden;

/// Recursive watcher that forwards [`FileEvent`]s into a bounded queue.
///
/// Dropping the watcher stops event delivery; the forwarding thread exits
/// once the debouncer's channel closes.
pub struct FileWatcher {
    debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl FileWatcher {
    /// Create a new file watcher.
    ///
    /// A full queue blocks the forwarding thread, which applies backpressure
    /// to the debouncer instead of dropping events.
    pub fn new(
        event_tx: tokio_mpsc::Sender<FileEvent>,
        debounce: Duration,
    ) -> Result<Self, notify::Error> {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            while let Ok(result) = rx.recv() {
                if !forward_events(result, &event_tx) {
                    debug!("Event queue closed, watcher thread exiting");
                    break;
                }
            }
        });

        let debouncer = new_debouncer(debounce, None, move |result| {
            let _ = tx.send(result);
        })?;

        Ok(Self { debouncer })
    }

    /// Start watching a directory recursively.
    pub fn watch(&mut self, path: &Path) -> Result<(), notify::Error> {
        debug!("Starting to watch: {:?}", path);
        self.debouncer.watch(path, RecursiveMode::Recursive)
    }

    /// Stop watching a directory.
    pub fn unwatch(&mut self, path: &Path) -> Result<(), notify::Error> {
        debug!("Stopping watch: {:?}", path);
        self.debouncer.unwatch(path)
    }
}

/// Returns `false` once the receiving side is gone.
fn forward_events(result: DebounceEventResult, event_tx: &tokio_mpsc::Sender<FileEvent>) -> bool {
    match result {
        Ok(events) => {
            for event in events {
                if let Some(file_event) = convert_event(&event) {
                    // std thread, so block rather than await
                    if event_tx.blocking_send(file_event).is_err() {
                        warn!("Event channel closed");
                        return false;
                    }
                }
            }
        }
        Err(errors) => {
            for error in errors {
                error!("Watch error: {error}");
            }
        }
    }
    true
}

fn convert_event(event: &DebouncedEvent) -> Option<FileEvent> {
    let path = event.paths.first()?.clone();

    match &event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() >= 2 => {
            let to = event.paths[1].clone();
            match (is_hidden(&path), is_hidden(&to)) {
                (true, true) => None,
                (true, false) => Some(FileEvent::Created(to)),
                (false, true) => Some(FileEvent::Deleted(path)),
                (false, false) => Some(FileEvent::Renamed { from: path, to }),
            }
        }
        _ if is_hidden(&path) => None,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(FileEvent::Deleted(path)),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(FileEvent::Created(path)),
        EventKind::Create(_) => Some(FileEvent::Created(path)),
        EventKind::Modify(_) => Some(FileEvent::Modified(path)),
        EventKind::Remove(_) => Some(FileEvent::Deleted(path)),
        _ => None,
    }
}
