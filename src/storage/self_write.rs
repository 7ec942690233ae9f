use std::{
    collections::HashMap,
    hash::{DefaultHasher, Hash, Hasher},
    path::{Path, PathBuf},
};

use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    len: u64,
    hash: u64,
}

impl Fingerprint {
    fn of(content: &[u8]) -> Self {
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        Self {
            len: content.len() as u64,
            hash: hasher.finish(),
        }
    }
}

/// Remembers what the tracker itself last wrote into each log file. A change notification is
/// only our own echo when the file on disk still holds exactly that content, so an external edit
/// arriving right after one of our writes is never mistaken for the echo.
#[derive(Debug, Default)]
pub struct SelfWrites {
    expected: HashMap<PathBuf, (u64, Fingerprint)>,
    next_write_id: u64,
}

impl SelfWrites {
    /// Registers content that is about to be written to `path`. Returns the id of the write.
    pub fn expect(&mut self, path: &Path, content: &[u8]) -> u64 {
        self.next_write_id += 1;
        self.expected
            .insert(path.to_path_buf(), (self.next_write_id, Fingerprint::of(content)));
        self.next_write_id
    }

    /// Whether `path` currently holds what we last wrote into it.
    pub async fn is_own(&self, path: &Path) -> bool {
        let Some((write_id, expected)) = self.expected.get(path) else {
            return false;
        };
        match tokio::fs::read(path).await {
            Ok(content) => {
                let own = Fingerprint::of(&content) == *expected;
                trace!("Change of {path:?} compared against write {write_id}: own = {own}");
                own
            }
            Err(_) => false,
        }
    }
}
