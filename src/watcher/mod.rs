//! Bridge between file system notifications and the tracker. Only the parts of a storage root
//! the tracker owns are reported, everything else under the root is ignored.

use std::{
    any::Any,
    path::{Path, PathBuf},
};

use anyhow::Result;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, trace};

use crate::storage::layout::{StorageTarget, TrackerLayout};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub target: StorageTarget,
    pub path: PathBuf,
}

/// Keeps a subscription alive. Dropping or cancelling it stops the notifications.
pub struct WatchHandle {
    _guard: Box<dyn Any + Send>,
}

impl WatchHandle {
    pub fn new(guard: impl Any + Send) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }

    pub fn cancel(self) {}
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle").finish_non_exhaustive()
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait StorageWatcher: Send {
    /// Starts reporting changes of the daily file, the yearly file and the archive directory of
    /// `layout` into `changes`.
    fn subscribe(
        &self,
        layout: &TrackerLayout,
        changes: UnboundedSender<StorageChange>,
    ) -> Result<WatchHandle>;
}

/// [StorageWatcher] backed by the platform's native notifications.
#[derive(Debug, Default)]
pub struct NotifyStorageWatcher;

impl StorageWatcher for NotifyStorageWatcher {
    fn subscribe(
        &self,
        layout: &TrackerLayout,
        changes: UnboundedSender<StorageChange>,
    ) -> Result<WatchHandle> {
        let classifier = layout.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| handle_notify_event(res, &classifier, &changes),
            Config::default(),
        )?;

        watcher.watch(layout.root(), RecursiveMode::NonRecursive)?;
        watcher.watch(&layout.years_dir(), RecursiveMode::NonRecursive)?;
        debug!("Watching {:?}", layout.root());

        Ok(WatchHandle::new(watcher))
    }
}

fn handle_notify_event(
    res: notify::Result<Event>,
    layout: &TrackerLayout,
    changes: &UnboundedSender<StorageChange>,
) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            error!("File watcher error {e:?}");
            return;
        }
    };
    trace!("Received notify event {:?} for {:?}", event.kind, event.paths);

    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return;
    }

    for path in &event.paths {
        if let Some(change) = classify_change(layout, path) {
            // The receiver is gone once the tracker shuts down.
            let _ = changes.send(change);
        }
    }
}

fn classify_change(layout: &TrackerLayout, path: &Path) -> Option<StorageChange> {
    layout.classify(path).map(|target| StorageChange {
        target,
        path: path.to_path_buf(),
    })
}
