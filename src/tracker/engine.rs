use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::{
    config::TrackerSettings,
    stats::{StatsAggregator, StatsSnapshot},
    storage::{
        archive::ArchiveWriter,
        codec::{decode, leading_date},
        layout::TrackerLayout,
    },
    utils::{clock::Clock, time::format_date},
    watcher::{StorageChange, StorageWatcher, WatchHandle},
};

use super::{
    events::{EventHub, SubscriptionId, TrackerEvent},
    ledger::{DailyLedger, EntrySummary},
    session::{SessionManager, TrackOutcome},
    task::{Task, TaskRegistry},
};

/// The time tracker itself. Every operation runs to completion before the next one starts, the
/// service loop guarantees that by owning the tracker.
///
/// No error leaves the tracker: failures are logged and answered by re-deriving the whole state
/// from disk.
pub struct TimeTracker {
    settings: TrackerSettings,
    session: SessionManager,
    storage: Option<ArchiveWriter>,
    stats: StatsAggregator,
    registry: Arc<dyn TaskRegistry>,
    watcher: Box<dyn StorageWatcher>,
    watch: Option<WatchHandle>,
    changes: mpsc::UnboundedSender<StorageChange>,
    events: EventHub,
    clock: Box<dyn Clock>,
}

impl TimeTracker {
    /// Creates an uninitialized tracker. The returned receiver delivers the watcher's
    /// notifications, which are to be fed back through [TimeTracker::on_storage_changed].
    pub fn new(
        settings: TrackerSettings,
        registry: Arc<dyn TaskRegistry>,
        watcher: Box<dyn StorageWatcher>,
        clock: Box<dyn Clock>,
    ) -> (Self, mpsc::UnboundedReceiver<StorageChange>) {
        let (changes, receiver) = mpsc::unbounded_channel();
        let tracker = Self {
            settings,
            session: SessionManager::new(clock.today()),
            storage: None,
            stats: StatsAggregator::default(),
            registry,
            watcher,
            watch: None,
            changes,
            events: EventHub::default(),
            clock,
        };
        (tracker, receiver)
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    pub fn ledger(&self) -> &DailyLedger {
        self.session.ledger()
    }

    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }

    /// Whether the per-second tick has to run.
    pub fn is_ticking(&self) -> bool {
        self.session.tracked_tasks() > 0
    }

    pub fn subscribe(&mut self) -> (SubscriptionId, mpsc::UnboundedReceiver<TrackerEvent>) {
        self.events.subscribe()
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Drops all derived state and rebuilds it from the storage root.
    #[instrument(skip(self))]
    pub async fn init(&mut self) {
        self.stop_all_tracking();
        if let Some(watch) = self.watch.take() {
            watch.cancel();
        }
        self.storage = None;
        self.stats.clear();
        let today = self.clock.today();
        self.session.reset(today);

        let Some(root) = self.settings.root.clone() else {
            info!("No storage root configured, tracking is disabled");
            return;
        };

        match self.load(root.clone(), today).await {
            Ok(()) => {
                info!("Tracker initialized in {root:?}");
                self.events.emit(TrackerEvent::StorageReloaded);
            }
            Err(e) => error!("Failed to initialize the tracker in {root:?}: {e:?}"),
        }
    }

    async fn load(&mut self, root: PathBuf, today: NaiveDate) -> Result<()> {
        let layout = TrackerLayout::new(root, today.year());
        layout.ensure().await?;

        let mut storage = ArchiveWriter::new(layout);
        storage.archive_previous_year().await?;

        let content = storage.read_daily().await?;
        let today_str = format_date(today);
        let lines = content.lines().filter(|v| !v.trim().is_empty());
        let stale = lines.clone().any(|v| leading_date(v) != Some(today_str.as_str()));

        if stale {
            info!("Daily file is not from {today_str}, archiving it");
            storage.archive_daily().await?;
        } else {
            let records = lines.filter_map(|line| {
                decode(line)
                    .inspect_err(|e| warn!("Skipping illegal line {line:?}: {e}"))
                    .ok()
            });
            self.session.load(DailyLedger::from_records(today, records));
            let daily = storage.layout().daily_file();
            storage.acknowledge(&daily, content.as_bytes());
        }

        self.watch = self.watch_layout(storage.layout());
        self.storage = Some(storage);
        Ok(())
    }

    fn watch_layout(&self, layout: &TrackerLayout) -> Option<WatchHandle> {
        match self.watcher.subscribe(layout, self.changes.clone()) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Failed to watch {:?}, external edits go unnoticed: {e:?}", layout.root());
                None
            }
        }
    }

    fn missing_storage(&mut self) -> bool {
        if self.storage.is_some() {
            return false;
        }
        debug!("Tracking requested without a storage root");
        self.events.emit(TrackerEvent::StorageMissing);
        true
    }

    fn emit_activity_change(&mut self, was_ticking: bool) {
        if self.is_ticking() != was_ticking {
            self.events.emit(TrackerEvent::ActivityChanged {
                tracking: self.is_ticking(),
            });
        }
    }

    pub fn start_tracking(&mut self, task: &Task) -> TrackOutcome {
        if self.missing_storage() {
            return TrackOutcome::NoStorageRoot;
        }
        let was_ticking = self.is_ticking();
        let outcome = self.session.start(task);
        if outcome == TrackOutcome::Started {
            self.registry.on_tracker_started(&task.key);
            self.events.emit(TrackerEvent::TrackingStarted {
                key: task.key.clone(),
            });
            self.emit_activity_change(was_ticking);
        }
        outcome
    }

    pub fn stop_tracking(&mut self, key: &str) -> TrackOutcome {
        if self.missing_storage() {
            return TrackOutcome::NoStorageRoot;
        }
        let was_ticking = self.is_ticking();
        let outcome = self.session.stop(key);
        if outcome == TrackOutcome::Stopped {
            self.registry.on_tracker_stopped(key);
            self.events
                .emit(TrackerEvent::TrackingStopped { key: key.into() });
            self.emit_activity_change(was_ticking);
        }
        outcome
    }

    pub fn toggle_tracking(&mut self, task: &Task) -> TrackOutcome {
        if self.session.is_tracking(&task.key) {
            self.stop_tracking(&task.key)
        } else {
            self.start_tracking(task)
        }
    }

    /// Starts every live task carrying the tracker id `id`.
    pub fn start_tracking_by_id(&mut self, id: &str) -> Vec<TrackOutcome> {
        self.registry
            .find_by_id(id)
            .iter()
            .map(|task| self.start_tracking(task))
            .collect()
    }

    pub fn stop_tracking_by_id(&mut self, id: &str) -> Vec<TrackOutcome> {
        self.registry
            .find_by_id(id)
            .iter()
            .map(|task| self.stop_tracking(&task.key))
            .collect()
    }

    /// Returns the amount of tasks that were stopped.
    pub fn stop_all_tracking(&mut self) -> usize {
        let was_ticking = self.is_ticking();
        let stopped = self.session.stop_all();
        for key in &stopped {
            self.registry.on_tracker_stopped(key);
            self.events
                .emit(TrackerEvent::TrackingStopped { key: key.clone() });
        }
        self.emit_activity_change(was_ticking);
        stopped.len()
    }

    /// Moves the time logged today under `old` to `new`. Returns false when `old` has no entry or
    /// `new` is of the other kind.
    #[instrument(skip(self))]
    pub async fn rename_entry(&mut self, old: &str, new: &str) -> bool {
        let was_ticking = self.is_ticking();
        let Some(outcome) = self.session.rename(old, new.into()) else {
            return false;
        };
        if let Some(stopped) = outcome.stopped {
            self.registry.on_tracker_stopped(&stopped);
            self.events.emit(TrackerEvent::TrackingStopped { key: stopped });
            self.emit_activity_change(was_ticking);
        }
        self.stats.forget_key(old);
        self.persist().await;
        true
    }

    /// Writes the ledger into the daily file.
    pub async fn flush(&mut self) -> Result<()> {
        let Some(storage) = self.storage.as_mut() else {
            return Ok(());
        };
        storage.write_daily(self.session.ledger().records()).await
    }

    async fn persist(&mut self) {
        if let Err(e) = self.flush().await {
            error!("Failed to persist the ledger, reinitializing: {e:?}");
            self.init().await;
        }
    }

    /// Advances every tracking entry by a second. A changed date rolls the ledger over first.
    pub async fn tick(&mut self) {
        let today = self.clock.today();
        if today != self.session.ledger().date() {
            self.roll_over(today).await;
        }
        if self.session.tick() {
            trace!("Persisting after a minute of tracking");
            self.persist().await;
        }
    }

    /// Signal that the day changed.
    pub async fn new_day(&mut self, date: NaiveDate) {
        if date != self.session.ledger().date() {
            self.roll_over(date).await;
        }
    }

    async fn roll_over(&mut self, date: NaiveDate) {
        let previous = self.session.ledger().date();
        if self.storage.is_none() {
            self.session.roll_over(date);
            return;
        }
        match self.try_roll_over(date).await {
            Ok(()) => {
                info!("Archived {previous}, now tracking {date}");
                self.events
                    .emit(TrackerEvent::DayArchived { date: previous });
            }
            Err(e) => {
                error!("Failed to roll {previous} over to {date}, reinitializing: {e:?}");
                self.init().await;
            }
        }
    }

    async fn try_roll_over(&mut self, date: NaiveDate) -> Result<()> {
        let previous = self.session.ledger().date();
        self.flush().await?;
        if let Some(storage) = self.storage.as_mut() {
            storage.archive_daily().await?;
        }
        self.session.roll_over(date);
        self.stats.clear();

        if date.year() != previous.year() {
            self.switch_year(date.year()).await?;
        }
        Ok(())
    }

    async fn switch_year(&mut self, year: i32) -> Result<()> {
        let Some(root) = self
            .storage
            .as_ref()
            .map(|v| v.layout().root().to_path_buf())
        else {
            return Ok(());
        };
        if let Some(watch) = self.watch.take() {
            watch.cancel();
        }

        let layout = TrackerLayout::new(root, year);
        layout.ensure().await?;
        self.watch = self.watch_layout(&layout);
        if let Some(storage) = self.storage.as_mut() {
            storage.move_to(layout);
            storage.archive_previous_year().await?;
        }
        info!("Switched to the logs of {year}");
        Ok(())
    }

    /// Reacts to a watcher notification. Anything that isn't the echo of our own writes makes
    /// the tracker reload.
    pub async fn on_storage_changed(&mut self, change: StorageChange) {
        let Some(storage) = self.storage.as_ref() else {
            return;
        };
        if storage.layout().classify(&change.path) != Some(change.target) {
            trace!("Ignoring change of {:?} outside the current layout", change.path);
            return;
        }
        if storage.is_own_write(&change.path).await {
            trace!("Ignoring our own write to {:?}", change.path);
            return;
        }

        info!("{:?} changed externally, reloading", change.path);
        self.init().await;
    }

    /// Current stats. `None` while there is no storage root or after a failed read.
    pub async fn get_stats(&mut self) -> Option<Arc<StatsSnapshot>> {
        let layout = self.storage.as_ref()?.layout().clone();
        match self.stats.snapshot(self.session.ledger(), &layout).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                error!("Failed to read stats, reinitializing: {e:?}");
                self.init().await;
                None
            }
        }
    }

    /// Today's entries for display.
    pub fn entries(&self) -> Vec<EntrySummary> {
        let mut entries = self.session.ledger().summaries();
        for entry in &mut entries {
            entry.loaded = self.registry.find_by_key(&entry.key).is_some();
        }
        entries
    }

    /// Switches to new settings. A changed root releases the old one and loads the new one.
    pub async fn apply_settings(&mut self, settings: TrackerSettings) {
        if settings == self.settings {
            return;
        }
        self.release().await;
        self.settings = settings;
        self.init().await;
    }

    async fn release(&mut self) {
        self.stop_all_tracking();
        if let Some(watch) = self.watch.take() {
            watch.cancel();
        }
        if let Err(e) = self.flush().await {
            warn!("Failed to flush the ledger on release: {e:?}");
        }
    }

    /// Stops tracking, flushes the ledger and lets go of the storage.
    pub async fn teardown(&mut self) {
        self.release().await;
        self.storage = None;
        self.stats.clear();
        info!("Tracker stopped");
    }
}
