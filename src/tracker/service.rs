use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use tokio::{
    select,
    sync::{mpsc, oneshot, watch},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    config::TrackerSettings, stats::StatsSnapshot, watcher::StorageChange,
};

use super::{
    engine::TimeTracker,
    events::{SubscriptionId, TrackerEvent},
    ledger::EntrySummary,
    session::TrackOutcome,
    task::Task,
    ticker::{Ticker, TICK_PERIOD},
};

const COMMAND_BUFFER: usize = 32;

type Reply<T> = oneshot::Sender<T>;

pub enum TrackerCommand {
    Start(Task, Reply<TrackOutcome>),
    Stop(Arc<str>, Reply<TrackOutcome>),
    Toggle(Task, Reply<TrackOutcome>),
    StartById(Arc<str>, Reply<Vec<TrackOutcome>>),
    StopById(Arc<str>, Reply<Vec<TrackOutcome>>),
    StopAll(Reply<usize>),
    Rename {
        old: Arc<str>,
        new: Arc<str>,
        reply: Reply<bool>,
    },
    NewDay(NaiveDate, Reply<()>),
    Stats(Reply<Option<Arc<StatsSnapshot>>>),
    Entries(Reply<Vec<EntrySummary>>),
    Subscribe(Reply<(SubscriptionId, mpsc::UnboundedReceiver<TrackerEvent>)>),
    Unsubscribe(SubscriptionId, Reply<bool>),
}

/// Cloneable access to a running [TrackerService].
#[derive(Clone)]
pub struct TrackerHandle {
    commands: mpsc::Sender<TrackerCommand>,
}

impl TrackerHandle {
    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> TrackerCommand) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| anyhow!("Tracker service is not running"))?;
        response
            .await
            .map_err(|_| anyhow!("Tracker service stopped before answering"))
    }

    pub async fn start(&self, task: Task) -> Result<TrackOutcome> {
        self.request(|reply| TrackerCommand::Start(task, reply)).await
    }

    pub async fn stop(&self, key: impl Into<Arc<str>>) -> Result<TrackOutcome> {
        let key = key.into();
        self.request(|reply| TrackerCommand::Stop(key, reply)).await
    }

    pub async fn toggle(&self, task: Task) -> Result<TrackOutcome> {
        self.request(|reply| TrackerCommand::Toggle(task, reply)).await
    }

    pub async fn start_by_id(&self, id: impl Into<Arc<str>>) -> Result<Vec<TrackOutcome>> {
        let id = id.into();
        self.request(|reply| TrackerCommand::StartById(id, reply)).await
    }

    pub async fn stop_by_id(&self, id: impl Into<Arc<str>>) -> Result<Vec<TrackOutcome>> {
        let id = id.into();
        self.request(|reply| TrackerCommand::StopById(id, reply)).await
    }

    pub async fn stop_all(&self) -> Result<usize> {
        self.request(TrackerCommand::StopAll).await
    }

    pub async fn rename(&self, old: impl Into<Arc<str>>, new: impl Into<Arc<str>>) -> Result<bool> {
        let (old, new) = (old.into(), new.into());
        self.request(|reply| TrackerCommand::Rename { old, new, reply })
            .await
    }

    pub async fn new_day(&self, date: NaiveDate) -> Result<()> {
        self.request(|reply| TrackerCommand::NewDay(date, reply)).await
    }

    pub async fn stats(&self) -> Result<Option<Arc<StatsSnapshot>>> {
        self.request(TrackerCommand::Stats).await
    }

    pub async fn entries(&self) -> Result<Vec<EntrySummary>> {
        self.request(TrackerCommand::Entries).await
    }

    pub async fn subscribe(
        &self,
    ) -> Result<(SubscriptionId, mpsc::UnboundedReceiver<TrackerEvent>)> {
        self.request(TrackerCommand::Subscribe).await
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<bool> {
        self.request(|reply| TrackerCommand::Unsubscribe(id, reply))
            .await
    }
}

/// Event loop owning the [TimeTracker]. Commands, watcher notifications, settings changes and
/// the tick are handled one at a time.
pub struct TrackerService {
    tracker: TimeTracker,
    commands: mpsc::Receiver<TrackerCommand>,
    changes: mpsc::UnboundedReceiver<StorageChange>,
    settings: watch::Receiver<TrackerSettings>,
    shutdown: CancellationToken,
    ticker: Ticker,
}

impl TrackerService {
    pub fn new(
        tracker: TimeTracker,
        changes: mpsc::UnboundedReceiver<StorageChange>,
        settings: watch::Receiver<TrackerSettings>,
        shutdown: CancellationToken,
    ) -> (Self, TrackerHandle) {
        let (sender, commands) = mpsc::channel(COMMAND_BUFFER);
        let service = Self {
            tracker,
            commands,
            changes,
            settings,
            shutdown,
            ticker: Ticker::new(TICK_PERIOD),
        };
        (service, TrackerHandle { commands: sender })
    }

    /// Runs until shutdown is requested or every handle is dropped. The ledger is flushed before
    /// returning.
    pub async fn run(mut self) -> Result<()> {
        self.settings.mark_unchanged();
        let current = self.settings.borrow().clone();
        if current != *self.tracker.settings() {
            self.tracker.apply_settings(current).await;
        } else {
            self.tracker.init().await;
        }
        let mut settings_open = true;

        loop {
            self.supervise_ticker();

            select! {
                _ = self.shutdown.cancelled() => {
                    info!("Shutting down the tracker");
                    break;
                }
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        debug!("Every handle was dropped");
                        break;
                    };
                    self.handle(command).await;
                }
                Some(change) = self.changes.recv() => {
                    self.tracker.on_storage_changed(change).await;
                }
                changed = self.settings.changed(), if settings_open => {
                    match changed {
                        Ok(()) => {
                            let settings = self.settings.borrow_and_update().clone();
                            self.tracker.apply_settings(settings).await;
                        }
                        Err(_) => settings_open = false,
                    }
                }
                _ = self.ticker.wait(self.tracker.clock()) => {
                    self.tracker.tick().await;
                }
            }
        }

        self.tracker.teardown().await;
        Ok(())
    }

    /// Arms the ticker while something is tracked and disarms it once nothing is.
    fn supervise_ticker(&mut self) {
        match (self.tracker.is_ticking(), self.ticker.is_armed()) {
            (true, false) => {
                debug!("Arming the tick");
                self.ticker.arm(self.tracker.clock().instant());
            }
            (false, true) => {
                debug!("Disarming the tick");
                self.ticker.disarm();
            }
            _ => {}
        }
    }

    async fn handle(&mut self, command: TrackerCommand) {
        // A caller that went away doesn't need an answer.
        match command {
            TrackerCommand::Start(task, reply) => {
                let _ = reply.send(self.tracker.start_tracking(&task));
            }
            TrackerCommand::Stop(key, reply) => {
                let _ = reply.send(self.tracker.stop_tracking(&key));
            }
            TrackerCommand::Toggle(task, reply) => {
                let _ = reply.send(self.tracker.toggle_tracking(&task));
            }
            TrackerCommand::StartById(id, reply) => {
                let _ = reply.send(self.tracker.start_tracking_by_id(&id));
            }
            TrackerCommand::StopById(id, reply) => {
                let _ = reply.send(self.tracker.stop_tracking_by_id(&id));
            }
            TrackerCommand::StopAll(reply) => {
                let _ = reply.send(self.tracker.stop_all_tracking());
            }
            TrackerCommand::Rename { old, new, reply } => {
                let _ = reply.send(self.tracker.rename_entry(&old, &new).await);
            }
            TrackerCommand::NewDay(date, reply) => {
                self.tracker.new_day(date).await;
                let _ = reply.send(());
            }
            TrackerCommand::Stats(reply) => {
                let _ = reply.send(self.tracker.get_stats().await);
            }
            TrackerCommand::Entries(reply) => {
                let _ = reply.send(self.tracker.entries());
            }
            TrackerCommand::Subscribe(reply) => {
                let _ = reply.send(self.tracker.subscribe());
            }
            TrackerCommand::Unsubscribe(id, reply) => {
                let _ = reply.send(self.tracker.unsubscribe(id));
            }
        }
    }
}
