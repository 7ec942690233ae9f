use std::{collections::BTreeMap, sync::Arc};

use chrono::NaiveDate;
use serde::Serialize;

use crate::storage::entities::{EntryKind, LogRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryState {
    /// `projects` are the project keys this task bumped when it was started, so stopping it
    /// releases exactly those.
    Task {
        projects: Vec<Arc<str>>,
        tracking: bool,
    },
    /// A project tracks while at least one of its tasks does.
    Project { tracked_children: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub(super) seconds: u64,
    pub(super) state: EntryState,
}

impl Entry {
    pub fn task() -> Self {
        Self {
            seconds: 0,
            state: EntryState::Task {
                projects: vec![],
                tracking: false,
            },
        }
    }

    pub fn project() -> Self {
        Self {
            seconds: 0,
            state: EntryState::Project {
                tracked_children: 0,
            },
        }
    }

    fn with_seconds(kind: EntryKind, seconds: u64) -> Self {
        let mut entry = match kind {
            EntryKind::Task => Self::task(),
            EntryKind::Project => Self::project(),
        };
        entry.seconds = seconds;
        entry
    }

    pub fn kind(&self) -> EntryKind {
        match self.state {
            EntryState::Task { .. } => EntryKind::Task,
            EntryState::Project { .. } => EntryKind::Project,
        }
    }

    pub fn seconds(&self) -> u64 {
        self.seconds
    }

    pub fn tracking(&self) -> bool {
        match self.state {
            EntryState::Task { tracking, .. } => tracking,
            EntryState::Project { tracked_children } => tracked_children > 0,
        }
    }

    pub fn tracked_children(&self) -> u32 {
        match self.state {
            EntryState::Task { .. } => 0,
            EntryState::Project { tracked_children } => tracked_children,
        }
    }
}

/// Row of [DailyLedger::summaries], for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrySummary {
    pub key: Arc<str>,
    pub kind: EntryKind,
    pub seconds: u64,
    pub tracking: bool,
    /// Whether the task behind a task entry is currently known to the application.
    pub loaded: bool,
}

/// Today's entries keyed by task line or project keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyLedger {
    date: NaiveDate,
    pub(super) entries: BTreeMap<Arc<str>, Entry>,
}

impl DailyLedger {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            entries: BTreeMap::new(),
        }
    }

    /// Rebuilds a ledger from persisted records. Records of other dates are ignored and repeated
    /// keys are summed up.
    pub fn from_records(date: NaiveDate, records: impl IntoIterator<Item = LogRecord>) -> Self {
        let mut ledger = Self::new(date);
        ledger.load(records);
        ledger
    }

    pub fn load(&mut self, records: impl IntoIterator<Item = LogRecord>) {
        let date = self.date;
        for record in records.into_iter().filter(|v| v.date == date) {
            self.entries
                .entry(record.key.clone())
                .and_modify(|v| v.seconds = v.seconds.saturating_add(record.seconds()))
                .or_insert_with(|| Entry::with_seconds(record.kind, record.seconds()));
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub(super) fn set_date(&mut self, date: NaiveDate) {
        self.date = date;
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arc<str>, &Entry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records to persist for the ledger's date. Sub-minute filtering is left to the writer.
    pub fn records(&self) -> Vec<LogRecord> {
        self.entries
            .iter()
            .map(|(key, entry)| {
                LogRecord::from_seconds(self.date, entry.kind(), key.clone(), entry.seconds)
            })
            .collect()
    }

    pub fn summaries(&self) -> Vec<EntrySummary> {
        self.entries
            .iter()
            .map(|(key, entry)| EntrySummary {
                key: key.clone(),
                kind: entry.kind(),
                seconds: entry.seconds,
                tracking: entry.tracking(),
                loaded: false,
            })
            .collect()
    }

    pub(super) fn reset_seconds(&mut self) {
        for entry in self.entries.values_mut() {
            entry.seconds = 0;
        }
    }

    pub(super) fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::storage::entities::{EntryKind, LogRecord};

    use super::DailyLedger;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_from_records_keeps_only_its_date() {
        let ledger = DailyLedger::from_records(
            date(2),
            [
                LogRecord::from_seconds(date(2), EntryKind::Task, "a".into(), 120),
                LogRecord::from_seconds(date(2), EntryKind::Task, "a".into(), 60),
                LogRecord::from_seconds(date(1), EntryKind::Task, "b".into(), 60),
                LogRecord::from_seconds(date(2), EntryKind::Project, "+p".into(), 300),
            ],
        );

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.get("a").unwrap().seconds(), 180);
        assert_eq!(ledger.get("+p").unwrap().kind(), EntryKind::Project);
        assert!(!ledger.get("+p").unwrap().tracking());
        assert!(ledger.get("b").is_none());
    }

    #[test]
    fn test_records_carry_the_ledger_date() {
        let mut ledger = DailyLedger::from_records(
            date(2),
            [LogRecord::from_seconds(date(2), EntryKind::Task, "a".into(), 125)],
        );
        ledger.set_date(date(3));

        let records = ledger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].date, date(3));
        assert_eq!(records[0].minutes, 2);
    }
}
