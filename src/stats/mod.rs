//! Aggregates the live ledger and the yearly logs into per-day minutes.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
    sync::Arc,
};

use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use futures::{stream, StreamExt};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::{
    storage::{
        archive::read_records_reversed,
        entities::{EntryKind, LogRecord},
        layout::TrackerLayout,
    },
    tracker::ledger::DailyLedger,
};

pub mod bounds;
pub mod query;

/// Amount of yearly files parsed at the same time.
const PARALLEL_READS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatRecord {
    pub key: Arc<str>,
    pub kind: EntryKind,
    pub minutes: u64,
}

/// Minutes logged on a single day, in the order they were first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayStats {
    records: Vec<StatRecord>,
}

impl DayStats {
    pub fn get(&self, key: &str) -> Option<&StatRecord> {
        self.records.iter().find(|v| &*v.key == key)
    }

    pub fn minutes(&self, key: &str) -> u64 {
        self.get(key).map_or(0, |v| v.minutes)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StatRecord> {
        self.records.iter()
    }

    /// Returns false when the key was already present.
    pub fn insert_if_absent(&mut self, record: StatRecord) -> bool {
        if self.get(&record.key).is_some() {
            return false;
        }
        self.records.push(record);
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    days: BTreeMap<NaiveDate, DayStats>,
    keys: BTreeSet<Arc<str>>,
}

impl StatsSnapshot {
    pub fn day(&self, date: NaiveDate) -> Option<&DayStats> {
        self.days.get(&date)
    }

    pub fn days_newest_first(&self) -> impl Iterator<Item = (&NaiveDate, &DayStats)> {
        self.days.iter().rev()
    }

    pub fn minutes(&self, date: NaiveDate, key: &str) -> u64 {
        self.days.get(&date).map_or(0, |v| v.minutes(key))
    }

    /// Every key seen in any log.
    pub fn keys(&self) -> &BTreeSet<Arc<str>> {
        &self.keys
    }

    pub fn date_count(&self) -> usize {
        self.days.len()
    }

    /// The first record seen for a `(date, key)` pair wins.
    pub fn insert_if_absent(&mut self, record: LogRecord) {
        self.keys.insert(record.key.clone());
        self.days
            .entry(record.date)
            .or_default()
            .insert_if_absent(StatRecord {
                key: record.key,
                kind: record.kind,
                minutes: record.minutes,
            });
    }
}

/// Caches the parsed history between queries. Today's bucket is the only part rebuilt each time.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    cache: Arc<StatsSnapshot>,
}

impl StatsAggregator {
    pub fn clear(&mut self) {
        self.cache = Arc::default();
    }

    pub fn forget_key(&mut self, key: &str) {
        Arc::make_mut(&mut self.cache).keys.remove(key);
    }

    #[instrument(skip_all, fields(date = %ledger.date()))]
    pub async fn snapshot(
        &mut self,
        ledger: &DailyLedger,
        layout: &TrackerLayout,
    ) -> Result<Arc<StatsSnapshot>> {
        let cache = Arc::make_mut(&mut self.cache);

        let mut today = DayStats::default();
        for kind in [EntryKind::Task, EntryKind::Project] {
            for (key, entry) in ledger.iter().filter(|(_, v)| v.kind() == kind) {
                today.insert_if_absent(StatRecord {
                    key: key.clone(),
                    kind,
                    minutes: entry.seconds() / 60,
                });
                cache.keys.insert(key.clone());
            }
        }
        cache.days.insert(ledger.date(), today);

        if cache.days.len() < 2 {
            for record in read_history(layout).await? {
                cache.insert_if_absent(record);
            }
            debug!("Loaded history, {} dates known", cache.days.len());
        }

        Ok(self.cache.clone())
    }
}

/// Every record of the yearly logs, newest file first and each file last line first.
async fn read_history(layout: &TrackerLayout) -> Result<Vec<LogRecord>> {
    let files = layout.history_files().await?;
    let mut reads = stream::iter(files)
        .map(|path| async move { read_records_reversed(&path).await })
        .buffered(PARALLEL_READS);

    let mut records = vec![];
    while let Some(file_records) = reads.next().await {
        records.extend(file_records?);
    }
    Ok(records)
}

/// Builds a snapshot straight from the files under `root`, for processes that don't run the
/// tracker themselves. A daily file from another day is read as history.
pub async fn read_snapshot(root: &Path, today: NaiveDate) -> Result<Arc<StatsSnapshot>> {
    let layout = TrackerLayout::new(root.to_path_buf(), today.year());
    let daily = read_records_reversed(&layout.daily_file()).await?;

    let (current, stale): (Vec<_>, Vec<_>) = daily.into_iter().partition(|v| v.date == today);
    let ledger = DailyLedger::from_records(today, current.into_iter().rev());

    let mut aggregator = StatsAggregator::default();
    aggregator.snapshot(&ledger, &layout).await?;
    let cache = Arc::make_mut(&mut aggregator.cache);
    for record in stale {
        cache.insert_if_absent(record);
    }
    Ok(aggregator.cache)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use anyhow::Result;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    use crate::{
        storage::{
            codec::encode,
            entities::{EntryKind, LogRecord},
            layout::TrackerLayout,
        },
        tracker::{ledger::DailyLedger, session::SessionManager, task::Task},
    };

    use super::{read_snapshot, StatsAggregator};

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn line(date: NaiveDate, kind: EntryKind, key: &str, minutes: u64) -> String {
        encode(&LogRecord {
            date,
            kind,
            key: key.into(),
            minutes,
        })
    }

    #[tokio::test]
    async fn test_first_seen_record_wins() -> Result<()> {
        let dir = tempdir()?;
        let layout = TrackerLayout::new(dir.path().to_path_buf(), 2024);
        layout.ensure().await?;
        fs::write(
            layout.yearly_file(),
            line(date(1, 1), EntryKind::Task, "a", 10) + &line(date(1, 1), EntryKind::Task, "a", 20),
        )?;
        fs::write(
            layout.years_dir().join("2023__time_tracker.csv"),
            line(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(), EntryKind::Task, "old", 5),
        )?;

        let snapshot = StatsAggregator::default()
            .snapshot(&DailyLedger::new(date(1, 2)), &layout)
            .await?;

        // Files are walked from the end, so the later line is seen first.
        assert_eq!(snapshot.minutes(date(1, 1), "a"), 20);
        assert_eq!(
            snapshot.minutes(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(), "old"),
            5
        );
        assert!(snapshot.keys().contains("old"));
        assert_eq!(snapshot.date_count(), 3);
        assert!(snapshot.day(date(1, 2)).is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_idle_day_keeps_history_cached() -> Result<()> {
        let dir = tempdir()?;
        let layout = TrackerLayout::new(dir.path().to_path_buf(), 2024);
        layout.ensure().await?;
        fs::write(layout.yearly_file(), line(date(1, 1), EntryKind::Task, "a", 10))?;
        let mut aggregator = StatsAggregator::default();
        let ledger = DailyLedger::new(date(1, 2));

        aggregator.snapshot(&ledger, &layout).await?;
        fs::write(layout.yearly_file(), line(date(1, 1), EntryKind::Task, "a", 99))?;
        let snapshot = aggregator.snapshot(&ledger, &layout).await?;

        assert_eq!(snapshot.minutes(date(1, 1), "a"), 10);
        assert_eq!(snapshot.date_count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_today_bucket_follows_the_ledger() -> Result<()> {
        let dir = tempdir()?;
        let layout = TrackerLayout::new(dir.path().to_path_buf(), 2024);
        layout.ensure().await?;
        let mut session = SessionManager::new(date(1, 2));
        session.start(&Task::parse("write +docs"));
        let mut aggregator = StatsAggregator::default();

        for _ in 0..120 {
            session.tick();
        }
        let first = aggregator.snapshot(session.ledger(), &layout).await?;
        for _ in 0..60 {
            session.tick();
        }
        let second = aggregator.snapshot(session.ledger(), &layout).await?;

        assert_eq!(first.minutes(date(1, 2), "write +docs"), 2);
        assert_eq!(second.minutes(date(1, 2), "write +docs"), 3);
        let kinds = second
            .day(date(1, 2))
            .unwrap()
            .iter()
            .map(|v| v.kind)
            .collect::<Vec<_>>();
        assert_eq!(kinds, vec![EntryKind::Task, EntryKind::Project]);
        Ok(())
    }

    #[tokio::test]
    async fn test_forgotten_key_leaves_the_key_set() -> Result<()> {
        let dir = tempdir()?;
        let layout = TrackerLayout::new(dir.path().to_path_buf(), 2024);
        layout.ensure().await?;
        fs::write(
            layout.yearly_file(),
            line(date(1, 1), EntryKind::Task, "old", 10)
                + &line(date(1, 2), EntryKind::Task, "other", 10),
        )?;
        let mut aggregator = StatsAggregator::default();
        aggregator
            .snapshot(&DailyLedger::new(date(1, 3)), &layout)
            .await?;

        aggregator.forget_key("old");
        let snapshot = aggregator
            .snapshot(&DailyLedger::new(date(1, 3)), &layout)
            .await?;

        assert!(!snapshot.keys().contains("old"));
        assert!(snapshot.keys().contains("other"));
        Ok(())
    }

    #[tokio::test]
    async fn test_read_snapshot_from_files() -> Result<()> {
        let dir = tempdir()?;
        let layout = TrackerLayout::new(dir.path().to_path_buf(), 2024);
        layout.ensure().await?;
        fs::write(
            layout.daily_file(),
            line(date(1, 2), EntryKind::Task, "today", 30)
                + &line(date(1, 1), EntryKind::Task, "stale", 15),
        )?;

        let snapshot = read_snapshot(dir.path(), date(1, 2)).await?;

        assert_eq!(snapshot.minutes(date(1, 2), "today"), 30);
        assert_eq!(snapshot.minutes(date(1, 1), "stale"), 15);
        Ok(())
    }
}
