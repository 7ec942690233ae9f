use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrackerEvent {
    TrackingStarted { key: Arc<str> },
    TrackingStopped { key: Arc<str> },
    /// Emitted when the amount of tracked tasks moves between zero and non-zero.
    ActivityChanged { tracking: bool },
    /// A tracking operation was requested while no storage root is configured.
    StorageMissing,
    /// State was re-derived from disk. Whatever was tracking before has been stopped.
    StorageReloaded,
    DayArchived { date: NaiveDate },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Fan-out of [TrackerEvent]s. Subscribers leave either by unsubscribing or by dropping their
/// receiver.
#[derive(Debug, Default)]
pub struct EventHub {
    subscribers: Vec<(SubscriptionId, mpsc::UnboundedSender<TrackerEvent>)>,
    next_id: u64,
}

impl EventHub {
    pub fn subscribe(&mut self) -> (SubscriptionId, mpsc::UnboundedReceiver<TrackerEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, sender));
        (id, receiver)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(v, _)| *v != id);
        before != self.subscribers.len()
    }

    pub fn emit(&mut self, event: TrackerEvent) {
        trace!("Emitting {event:?}");
        self.subscribers
            .retain(|(_, sender)| sender.send(event.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
