use std::path::PathBuf;

use tokio::sync::watch;
use tracing::info;

/// Settings the tracker reacts to at runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerSettings {
    /// Directory holding the logs. Tracking is refused while this is unset.
    pub root: Option<PathBuf>,
}

/// Owner of the current settings. The tracker subscribes to it and re-initializes whenever the
/// root changes.
#[derive(Debug)]
pub struct SettingsStore {
    sender: watch::Sender<TrackerSettings>,
}

impl SettingsStore {
    pub fn new(settings: TrackerSettings) -> Self {
        let (sender, _) = watch::channel(settings);
        Self { sender }
    }

    pub fn current(&self) -> TrackerSettings {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TrackerSettings> {
        self.sender.subscribe()
    }

    /// Changes the root. Subscribers are only notified when the value actually changed.
    pub fn set_root(&self, root: Option<PathBuf>) -> bool {
        let changed = self.sender.send_if_modified(|settings| {
            if settings.root == root {
                return false;
            }
            settings.root = root;
            true
        });
        if changed {
            info!("Storage root changed to {:?}", self.sender.borrow().root);
        }
        changed
    }
}
