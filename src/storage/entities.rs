use std::{fmt::Display, sync::Arc};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Whether a tracked key is a task line or a project keyword. Projects are recognized by a
/// leading `+`, the same way todo.txt marks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Task,
    Project,
}

pub const PROJECT_MARKER: char = '+';

const TASK_TAG: &str = "()";
const PROJECT_TAG: &str = "++";

impl EntryKind {
    pub fn of_key(key: &str) -> Self {
        let mut chars = key.chars();
        match chars.next() {
            Some(PROJECT_MARKER) if chars.next().is_some() && !key.contains(char::is_whitespace) => {
                EntryKind::Project
            }
            _ => EntryKind::Task,
        }
    }

    /// Two character tag used in the log files.
    pub fn tag(self) -> &'static str {
        match self {
            EntryKind::Task => TASK_TAG,
            EntryKind::Project => PROJECT_TAG,
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            TASK_TAG => Some(EntryKind::Task),
            PROJECT_TAG => Some(EntryKind::Project),
            _ => None,
        }
    }
}

impl Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::Task => write!(f, "task"),
            EntryKind::Project => write!(f, "project"),
        }
    }
}

/// One line of a daily or yearly log: the minutes logged against `key` on `date`.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct LogRecord {
    pub date: NaiveDate,
    pub kind: EntryKind,
    pub key: Arc<str>,
    pub minutes: u64,
}

impl LogRecord {
    /// Builds a record from accumulated seconds. Partial minutes are truncated.
    pub fn from_seconds(date: NaiveDate, kind: EntryKind, key: Arc<str>, seconds: u64) -> Self {
        Self {
            date,
            kind,
            key,
            minutes: seconds / 60,
        }
    }

    pub fn seconds(&self) -> u64 {
        self.minutes.saturating_mul(60)
    }
}

#[cfg(test)]
mod tests {
    use super::EntryKind;

    #[test]
    fn test_project_keys() {
        assert_eq!(EntryKind::of_key("+work"), EntryKind::Project);
        assert_eq!(EntryKind::of_key("+"), EntryKind::Task);
        assert_eq!(EntryKind::of_key("write +work report"), EntryKind::Task);
        assert_eq!(EntryKind::of_key("+two words"), EntryKind::Task);
    }

    #[test]
    fn test_tags() {
        assert_eq!(EntryKind::from_tag(EntryKind::Project.tag()), Some(EntryKind::Project));
        assert_eq!(EntryKind::from_tag(EntryKind::Task.tag()), Some(EntryKind::Task));
        assert_eq!(EntryKind::from_tag("xx"), None);
    }
}
