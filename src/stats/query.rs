use std::{
    cmp::Reverse,
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::{
    storage::entities::EntryKind,
    utils::{
        percentage::{minutes_percentage, Percentage},
        time::{days_in_month, quarter_of},
    },
};

use super::{bounds::DateBounds, StatRecord, StatsSnapshot};

pub const DEFAULT_SEARCH_LIMIT: usize = 50;

/// Minutes of one keyword inside every named range, plus quarterly totals per year.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeywordSums {
    pub today: u64,
    pub week: u64,
    pub month: u64,
    pub three_months: u64,
    pub six_months: u64,
    pub all: u64,
    pub quarters: BTreeMap<i32, [u64; 4]>,
}

pub fn sum_keyword(snapshot: &StatsSnapshot, keyword: &str, bounds: &DateBounds) -> KeywordSums {
    let mut sums = KeywordSums::default();

    for (date, day) in snapshot.days_newest_first() {
        let minutes = day.minutes(keyword);
        let date = *date;

        // Each bound is checked on its own; the walking order doesn't matter.
        for (lower, sum) in [
            (bounds.today, &mut sums.today),
            (bounds.week, &mut sums.week),
            (bounds.month, &mut sums.month),
            (bounds.three_months, &mut sums.three_months),
            (bounds.six_months, &mut sums.six_months),
        ] {
            if date >= lower {
                *sum = sum.saturating_add(minutes);
            }
        }
        sums.all = sums.all.saturating_add(minutes);

        if minutes > 0 {
            let quarter = &mut sums.quarters.entry(date.year()).or_default()[quarter_of(date)];
            *quarter = quarter.saturating_add(minutes);
        }
    }
    sums
}

/// Inclusive range of dates. A missing end is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    lower: Option<NaiveDate>,
    upper: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(lower: Option<NaiveDate>, upper: Option<NaiveDate>) -> Self {
        match (lower, upper) {
            (Some(l), Some(u)) if l > u => Self {
                lower: Some(u),
                upper: Some(l),
            },
            _ => Self { lower, upper },
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.lower.map_or(true, |v| v <= date) && self.upper.map_or(true, |v| date <= v)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HotEntry {
    pub key: Arc<str>,
    pub minutes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotRanking {
    /// Minutes of every entry of the requested kind inside the range, including hidden ones.
    pub total: u64,
    pub entries: Vec<HotEntry>,
}

/// Top `top` entries of `kind` by minutes inside `range`. Entries whose share of the total is
/// below `min_share` are left out.
pub fn hot_ranking(
    snapshot: &StatsSnapshot,
    range: DateRange,
    kind: EntryKind,
    top: usize,
    min_share: Option<Percentage>,
) -> HotRanking {
    let mut totals = HashMap::<Arc<str>, u64>::new();
    for (date, day) in snapshot.days_newest_first() {
        if !range.contains(*date) {
            continue;
        }
        for record in day.iter().filter(|v| v.kind == kind) {
            let total = totals.entry(record.key.clone()).or_default();
            *total = total.saturating_add(record.minutes);
        }
    }
    let total = totals
        .values()
        .fold(0u64, |total, minutes| total.saturating_add(*minutes));

    let mut entries = totals
        .into_iter()
        .map(|(key, minutes)| HotEntry { key, minutes })
        .filter(|v| min_share.map_or(true, |min| *minutes_percentage(v.minutes, total) >= *min))
        .collect::<Vec<_>>();
    entries.sort_by(|a, b| b.minutes.cmp(&a.minutes).then_with(|| a.key.cmp(&b.key)));
    entries.truncate(top);

    HotRanking { total, entries }
}

/// Everything logged on `date`, projects first and longest first inside each group.
pub fn day_breakdown(snapshot: &StatsSnapshot, date: NaiveDate) -> Vec<StatRecord> {
    let mut records = snapshot
        .day(date)
        .map(|v| v.iter().cloned().collect::<Vec<_>>())
        .unwrap_or_default();
    records.sort_by_key(|v| (v.kind != EntryKind::Project, Reverse(v.minutes)));
    records
}

/// Minutes of `keyword` on every day of a month. `None` for an invalid month.
pub fn month_days(
    snapshot: &StatsSnapshot,
    keyword: &str,
    year: i32,
    month: u32,
) -> Option<Vec<(NaiveDate, u64)>> {
    let days = days_in_month(year, month)?;
    (1..=days)
        .map(|day| {
            let date = NaiveDate::from_ymd_opt(year, month, day)?;
            Some((date, snapshot.minutes(date, keyword)))
        })
        .collect()
}

/// Scores `candidate` against `needle`: prefixes beat substrings, substrings beat scattered
/// subsequences, shorter candidates win ties. `None` when it doesn't match at all.
fn fuzzy_score(candidate: &str, needle: &str) -> Option<i64> {
    let candidate = candidate.to_lowercase();
    let needle = needle.to_lowercase();
    let length = candidate.chars().count() as i64;

    if candidate.starts_with(&needle) {
        return Some(1_000 - length);
    }
    if let Some(index) = candidate.find(&needle) {
        return Some(700 - index as i64);
    }

    let mut score = 500;
    let mut from = 0;
    for c in needle.chars() {
        let position = from + candidate[from..].find(c)?;
        score -= (position - from) as i64;
        from = position + c.len_utf8();
    }
    Some(score - length / 10)
}

/// Keys matching `needle` as a fuzzy subsequence, best first.
pub fn search(snapshot: &StatsSnapshot, needle: &str, limit: usize) -> Vec<Arc<str>> {
    let needle = needle.trim();
    if needle.is_empty() {
        return vec![];
    }

    let mut matches = snapshot
        .keys()
        .iter()
        .filter_map(|key| fuzzy_score(key, needle).map(|score| (score, key)))
        .collect::<Vec<_>>();
    matches.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    matches
        .into_iter()
        .take(limit)
        .map(|(_, key)| key.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, Weekday};

    use crate::{
        stats::{bounds::DateBounds, StatsSnapshot},
        storage::entities::{EntryKind, LogRecord},
        utils::percentage::Percentage,
    };

    use super::{day_breakdown, hot_ranking, month_days, search, sum_keyword, DateRange, HotEntry};

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn snapshot(records: &[(NaiveDate, EntryKind, &str, u64)]) -> StatsSnapshot {
        let mut snapshot = StatsSnapshot::default();
        for (date, kind, key, minutes) in records {
            snapshot.insert_if_absent(LogRecord {
                date: *date,
                kind: *kind,
                key: (*key).into(),
                minutes: *minutes,
            });
        }
        snapshot
    }

    fn entry(key: &str, minutes: u64) -> HotEntry {
        HotEntry {
            key: key.into(),
            minutes,
        }
    }

    #[test]
    fn test_sum_over_named_bounds() {
        let snapshot = snapshot(&[
            (date(1, 1), EntryKind::Project, "+proj", 30),
            (date(1, 2), EntryKind::Project, "+proj", 45),
            (date(1, 3), EntryKind::Project, "+proj", 90),
        ]);

        let sums = sum_keyword(&snapshot, "+proj", &DateBounds::new(date(1, 3), Weekday::Mon));

        assert_eq!(sums.today, 90);
        assert_eq!(sums.all, 165);
        // 2024-01-01 is a Monday
        assert_eq!(sums.week, 165);
        assert_eq!(sums.quarters.get(&2024), Some(&[165, 0, 0, 0]));
    }

    #[test]
    fn test_sum_bounds_are_independent_of_order() {
        let snapshot = snapshot(&[
            (date(3, 20), EntryKind::Task, "a", 1),
            (NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(), EntryKind::Task, "a", 10),
            (date(1, 15), EntryKind::Task, "a", 100),
            (date(3, 1), EntryKind::Task, "a", 1000),
        ]);

        let sums = sum_keyword(&snapshot, "a", &DateBounds::new(date(3, 20), Weekday::Mon));

        assert_eq!(sums.today, 1);
        assert_eq!(sums.month, 1001);
        assert_eq!(sums.three_months, 1101);
        assert_eq!(sums.six_months, 1111);
        assert_eq!(sums.quarters.get(&2023), Some(&[0, 0, 0, 10]));
    }

    #[test]
    fn test_hot_ranking_of_tasks() {
        let snapshot = snapshot(&[
            (date(1, 1), EntryKind::Task, "A", 120),
            (date(1, 1), EntryKind::Task, "B", 200),
            (date(1, 2), EntryKind::Task, "B", 100),
            (date(1, 2), EntryKind::Task, "C", 10),
            (date(1, 2), EntryKind::Project, "+P", 1000),
        ]);

        let ranking = hot_ranking(&snapshot, DateRange::default(), EntryKind::Task, 2, None);

        assert_eq!(ranking.entries, vec![entry("B", 300), entry("A", 120)]);
        assert_eq!(ranking.total, 430);
    }

    #[test]
    fn test_hot_ranking_range_and_share() {
        let snapshot = snapshot(&[
            (date(1, 1), EntryKind::Task, "A", 120),
            (date(1, 2), EntryKind::Task, "B", 90),
            (date(1, 3), EntryKind::Task, "C", 10),
            (date(1, 4), EntryKind::Task, "D", 500),
        ]);

        let range = DateRange::new(Some(date(1, 3)), Some(date(1, 2)));
        let ranking = hot_ranking(&snapshot, range, EntryKind::Task, 10, None);
        assert_eq!(ranking.entries, vec![entry("B", 90), entry("C", 10)]);

        let ranking = hot_ranking(
            &snapshot,
            DateRange::new(Some(date(1, 2)), None),
            EntryKind::Task,
            10,
            Percentage::new_opt(5.),
        );
        assert_eq!(ranking.entries, vec![entry("D", 500), entry("B", 90)]);
    }

    #[test]
    fn test_huge_minutes_saturate() {
        let snapshot = snapshot(&[
            (date(1, 1), EntryKind::Task, "a", u64::MAX),
            (date(1, 2), EntryKind::Task, "a", 10),
            (date(1, 2), EntryKind::Task, "b", 10),
        ]);

        let sums = sum_keyword(&snapshot, "a", &DateBounds::new(date(1, 2), Weekday::Mon));
        assert_eq!(sums.all, u64::MAX);
        assert_eq!(sums.quarters.get(&2024), Some(&[u64::MAX, 0, 0, 0]));

        let ranking = hot_ranking(&snapshot, DateRange::default(), EntryKind::Task, 10, None);
        assert_eq!(ranking.total, u64::MAX);
        assert_eq!(ranking.entries[0], entry("a", u64::MAX));
    }

    #[test]
    fn test_day_breakdown_orders_projects_first() {
        let snapshot = snapshot(&[
            (date(1, 1), EntryKind::Task, "short", 5),
            (date(1, 1), EntryKind::Project, "+small", 10),
            (date(1, 1), EntryKind::Task, "long", 50),
            (date(1, 1), EntryKind::Project, "+big", 60),
        ]);

        let keys = day_breakdown(&snapshot, date(1, 1))
            .into_iter()
            .map(|v| v.key)
            .collect::<Vec<_>>();

        assert_eq!(
            keys,
            ["+big", "+small", "long", "short"].map(Arc::<str>::from).to_vec()
        );
        assert!(day_breakdown(&snapshot, date(1, 2)).is_empty());
    }

    #[test]
    fn test_month_days() {
        let snapshot = snapshot(&[(date(2, 10), EntryKind::Task, "a", 42)]);

        let days = month_days(&snapshot, "a", 2024, 2).unwrap();

        assert_eq!(days.len(), 29);
        assert_eq!(days[9], (date(2, 10), 42));
        assert_eq!(days.iter().map(|v| v.1).sum::<u64>(), 42);
        assert!(month_days(&snapshot, "a", 2024, 13).is_none());
    }

    #[test]
    fn test_search_prefers_prefixes() {
        let snapshot = snapshot(&[
            (date(1, 1), EntryKind::Task, "write the report", 1),
            (date(1, 1), EntryKind::Task, "rewrite docs", 1),
            (date(1, 1), EntryKind::Task, "wash the car", 1),
            (date(1, 1), EntryKind::Project, "+work", 1),
        ]);

        let found = search(&snapshot, "wr", 50);

        assert_eq!(
            found,
            ["write the report", "rewrite docs", "+work", "wash the car"]
                .map(Arc::<str>::from)
                .to_vec()
        );
        assert_eq!(search(&snapshot, "wr", 1).len(), 1);
        assert!(search(&snapshot, "xyz", 50).is_empty());
    }
}
