use std::{
    collections::HashSet,
    sync::{Arc, PoisonError, RwLock},
};

use crate::storage::entities::EntryKind;

const TRACKER_ID_PREFIX: &str = "tracker_id:";

/// A live task as the surrounding application knows it. The tracker identifies it by `key`, the
/// full task line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub key: Arc<str>,
    pub projects: Vec<Arc<str>>,
    /// Stable identifier that survives edits of the task line.
    pub tracker_id: Option<Arc<str>>,
}

impl Task {
    pub fn new(key: impl Into<Arc<str>>, projects: Vec<Arc<str>>) -> Self {
        Self {
            key: key.into(),
            projects,
            tracker_id: None,
        }
    }

    /// Reads a todo.txt style line. Words starting with `+` are projects and a
    /// `tracker_id:<id>` word is the stable identifier.
    pub fn parse(line: &str) -> Self {
        let key = line.trim();
        let mut projects: Vec<Arc<str>> = vec![];
        let mut tracker_id = None;

        for word in key.split_whitespace() {
            if EntryKind::of_key(word) == EntryKind::Project {
                if !projects.iter().any(|v| &**v == word) {
                    projects.push(word.into());
                }
            } else if let Some(id) = word.strip_prefix(TRACKER_ID_PREFIX) {
                if !id.is_empty() {
                    tracker_id = Some(id.into());
                }
            }
        }

        Self {
            key: key.into(),
            projects,
            tracker_id,
        }
    }
}

/// The tracker's view of the application's tasks. Ledger entries refer to tasks only by key, so
/// a task that isn't loaded right now is simply absent here.
#[cfg_attr(test, mockall::automock)]
pub trait TaskRegistry: Send + Sync {
    fn find_by_key(&self, key: &str) -> Option<Task>;

    fn find_by_id(&self, id: &str) -> Vec<Task>;

    fn on_tracker_started(&self, key: &str);

    fn on_tracker_stopped(&self, key: &str);
}

/// Registry for processes that own their tasks directly, like the command line.
#[derive(Default)]
pub struct InMemoryTaskRegistry {
    tasks: RwLock<Vec<Task>>,
    tracked: RwLock<HashSet<Arc<str>>>,
}

impl InMemoryTaskRegistry {
    pub fn insert(&self, task: Task) {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|v| v.key != task.key);
        tasks.push(task);
    }

    pub fn remove(&self, key: &str) -> Option<Task> {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        let index = tasks.iter().position(|v| &*v.key == key)?;
        Some(tasks.remove(index))
    }

    /// Whether the tracker last reported `key` as tracked.
    pub fn is_tracked(&self, key: &str) -> bool {
        self.tracked
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}

impl TaskRegistry for InMemoryTaskRegistry {
    fn find_by_key(&self, key: &str) -> Option<Task> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|v| &*v.key == key)
            .cloned()
    }

    fn find_by_id(&self, id: &str) -> Vec<Task> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|v| v.tracker_id.as_deref() == Some(id))
            .cloned()
            .collect()
    }

    fn on_tracker_started(&self, key: &str) {
        self.tracked
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into());
    }

    fn on_tracker_stopped(&self, key: &str) {
        self.tracked
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryTaskRegistry, Task, TaskRegistry};

    #[test]
    fn test_parse_projects_and_id() {
        let task = Task::parse("  call mom +family +phone +family tracker_id:42 ");

        assert_eq!(&*task.key, "call mom +family +phone +family tracker_id:42");
        assert_eq!(
            task.projects.iter().map(|v| &**v).collect::<Vec<_>>(),
            vec!["+family", "+phone"]
        );
        assert_eq!(task.tracker_id.as_deref(), Some("42"));
    }

    #[test]
    fn test_parse_ignores_lone_marker() {
        let task = Task::parse("a + b tracker_id:");
        assert!(task.projects.is_empty());
        assert_eq!(task.tracker_id, None);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = InMemoryTaskRegistry::default();
        registry.insert(Task::parse("one +p tracker_id:x"));
        registry.insert(Task::parse("two tracker_id:x"));
        registry.insert(Task::parse("three"));

        assert_eq!(registry.find_by_id("x").len(), 2);
        assert!(registry.find_by_key("three").is_some());
        assert!(registry.remove("three").is_some());
        assert!(registry.find_by_key("three").is_none());

        registry.on_tracker_started("one +p tracker_id:x");
        assert!(registry.is_tracked("one +p tracker_id:x"));
        registry.on_tracker_stopped("one +p tracker_id:x");
        assert!(!registry.is_tracked("one +p tracker_id:x"));
    }
}
