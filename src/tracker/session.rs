use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use crate::storage::entities::EntryKind;

use super::{
    ledger::{DailyLedger, Entry, EntryState},
    task::Task,
};

/// Amount of ticks between two persists of the ledger.
pub const PERSIST_EVERY_TICKS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackOutcome {
    Started,
    AlreadyTracking,
    Stopped,
    NotTracking,
    /// Nothing is configured to store the time, so nothing was done.
    NoStorageRoot,
    /// The key belongs to a project entry, and projects are only tracked through their tasks.
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameOutcome {
    /// Tracking entry that lived under the new key and had to be stopped to make room.
    pub stopped: Option<Arc<str>>,
}

/// Owns every mutation of the ledger: starting and stopping entries, the project reference
/// counts and the per-second accumulation.
#[derive(Debug)]
pub struct SessionManager {
    ledger: DailyLedger,
    tracked_tasks: usize,
    ticks: u64,
}

impl SessionManager {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            ledger: DailyLedger::new(date),
            tracked_tasks: 0,
            ticks: 0,
        }
    }

    pub fn ledger(&self) -> &DailyLedger {
        &self.ledger
    }

    pub fn tracked_tasks(&self) -> usize {
        self.tracked_tasks
    }

    /// Replaces the ledger with one read from disk. Nothing in it is tracking.
    pub fn load(&mut self, ledger: DailyLedger) {
        self.ledger = ledger;
        self.tracked_tasks = 0;
        self.ticks = 0;
    }

    pub fn is_tracking(&self, key: &str) -> bool {
        self.ledger.get(key).is_some_and(Entry::tracking)
    }

    pub fn start(&mut self, task: &Task) -> TrackOutcome {
        if EntryKind::of_key(&task.key) == EntryKind::Project {
            return TrackOutcome::Conflict;
        }
        let entry = self
            .ledger
            .entries
            .entry(task.key.clone())
            .or_insert_with(Entry::task);
        match entry.state {
            EntryState::Project { .. } => return TrackOutcome::Conflict,
            EntryState::Task { tracking: true, .. } => return TrackOutcome::AlreadyTracking,
            EntryState::Task { .. } => {}
        }

        let mut counted = vec![];
        for project in &task.projects {
            let entry = self
                .ledger
                .entries
                .entry(project.clone())
                .or_insert_with(Entry::project);
            match &mut entry.state {
                EntryState::Project { tracked_children } => {
                    *tracked_children += 1;
                    counted.push(project.clone());
                }
                EntryState::Task { .. } => {
                    warn!("{project:?} is tracked as a task, not counting it as a project")
                }
            }
        }

        if let Some(entry) = self.ledger.entries.get_mut(&task.key) {
            entry.state = EntryState::Task {
                projects: counted,
                tracking: true,
            };
        }

        if self.tracked_tasks == 0 {
            self.ticks = 0;
        }
        self.tracked_tasks += 1;
        debug!("Started {:?}, {} tasks tracked", task.key, self.tracked_tasks);
        TrackOutcome::Started
    }

    pub fn stop(&mut self, key: &str) -> TrackOutcome {
        let projects = match self.ledger.entries.get_mut(key).map(|v| &mut v.state) {
            Some(EntryState::Task {
                projects,
                tracking: tracking @ true,
            }) => {
                *tracking = false;
                std::mem::take(projects)
            }
            _ => return TrackOutcome::NotTracking,
        };

        self.release_projects(&projects);
        self.tracked_tasks = self.tracked_tasks.saturating_sub(1);
        debug!("Stopped {key:?}, {} tasks tracked", self.tracked_tasks);
        TrackOutcome::Stopped
    }

    fn release_projects(&mut self, projects: &[Arc<str>]) {
        for project in projects {
            if let Some(Entry {
                state: EntryState::Project { tracked_children },
                ..
            }) = self.ledger.entries.get_mut(project)
            {
                *tracked_children = tracked_children.saturating_sub(1);
            }
        }
    }

    /// Stops every tracking task and zeroes every project count. Returns the stopped task keys.
    pub fn stop_all(&mut self) -> Vec<Arc<str>> {
        let mut stopped = vec![];
        for (key, entry) in self.ledger.entries.iter_mut() {
            match &mut entry.state {
                EntryState::Task { projects, tracking } => {
                    if *tracking {
                        stopped.push(key.clone());
                    }
                    *tracking = false;
                    projects.clear();
                }
                EntryState::Project { tracked_children } => *tracked_children = 0,
            }
        }
        self.tracked_tasks = 0;
        stopped
    }

    /// Moves the entry under `old` to `new`, keeping its seconds and tracking state. An entry
    /// already living under `new` is stopped and its seconds are merged in. Returns `None` when
    /// there is nothing to move or when `new` names the other kind of entry.
    pub fn rename(&mut self, old: &str, new: Arc<str>) -> Option<RenameOutcome> {
        if old == &*new {
            return None;
        }
        let kind = self.ledger.get(old)?.kind();
        let existing_kind = self.ledger.get(&new).map(Entry::kind);
        if EntryKind::of_key(&new) != kind || existing_kind.map_or(false, |v| v != kind) {
            debug!("Refusing to rename {old:?} into {new:?} of another kind");
            return None;
        }
        let mut moved = self.ledger.entries.remove(old)?;

        let stopped = (self.stop(&new) == TrackOutcome::Stopped).then(|| new.clone());
        if let Some(existing) = self.ledger.entries.remove(&new) {
            moved.seconds = moved.seconds.saturating_add(existing.seconds);
            if let (
                EntryState::Project { tracked_children },
                EntryState::Project {
                    tracked_children: existing_children,
                },
            ) = (&mut moved.state, existing.state)
            {
                *tracked_children += existing_children;
            }
        }

        // Tasks keep the keys of the projects they count towards.
        for entry in self.ledger.entries.values_mut() {
            if let EntryState::Task { projects, .. } = &mut entry.state {
                for project in projects.iter_mut().filter(|v| &***v == old) {
                    *project = new.clone();
                }
            }
        }

        self.ledger.entries.insert(new, moved);
        Some(RenameOutcome { stopped })
    }

    /// Adds a second to every tracking entry. Returns true when the ledger is due to be
    /// persisted.
    pub fn tick(&mut self) -> bool {
        if self.tracked_tasks == 0 {
            return false;
        }
        for entry in self.ledger.entries.values_mut().filter(|v| v.tracking()) {
            entry.seconds = entry.seconds.saturating_add(1);
        }
        self.ticks += 1;
        self.ticks % PERSIST_EVERY_TICKS == 0
    }

    /// Moves the ledger to a new day. Entries and their tracking state stay, the time doesn't.
    pub fn roll_over(&mut self, date: NaiveDate) {
        self.ledger.reset_seconds();
        self.ledger.set_date(date);
    }

    /// Drops every entry and moves to `date`. Callers stop tracking first.
    pub fn reset(&mut self, date: NaiveDate) {
        self.ledger.clear();
        self.ledger.set_date(date);
        self.tracked_tasks = 0;
        self.ticks = 0;
    }
}
