use std::{io::ErrorKind, path::Path};

use anyhow::{Context, Result};
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, info, warn};

use crate::fs::operations::ReverseLines;

use super::{
    codec::{decode, encode},
    entities::{EntryKind, LogRecord},
    layout::TrackerLayout,
    self_write::SelfWrites,
};

/// Minimal amount of tracked time worth a line in the logs.
pub const MIN_PERSISTED_SECONDS: u64 = 60;

/// The only writer of the log files. Every write is registered with [SelfWrites] before it lands
/// so the watcher can tell our own writes apart from external edits.
pub struct ArchiveWriter {
    layout: TrackerLayout,
    self_writes: SelfWrites,
}

impl ArchiveWriter {
    pub fn new(layout: TrackerLayout) -> Self {
        Self {
            layout,
            self_writes: SelfWrites::default(),
        }
    }

    pub fn layout(&self) -> &TrackerLayout {
        &self.layout
    }

    /// Points the writer at another layout, keeping track of what it already wrote.
    pub fn move_to(&mut self, layout: TrackerLayout) {
        self.layout = layout;
    }

    /// Marks `content` as already known for `path`, so a notification about it is not treated
    /// as an external change.
    pub fn acknowledge(&mut self, path: &Path, content: &[u8]) {
        self.self_writes.expect(path, content);
    }

    /// Replaces the daily file with `records`. Projects are written before tasks and records
    /// shorter than a minute are dropped.
    pub async fn write_daily(&mut self, records: impl IntoIterator<Item = LogRecord>) -> Result<()> {
        let mut records = records
            .into_iter()
            .filter(|v| v.seconds() >= MIN_PERSISTED_SECONDS)
            .collect::<Vec<_>>();
        records.sort_by_key(|v| v.kind != EntryKind::Project);

        let content = records.iter().map(encode).collect::<String>();
        let path = self.layout.daily_file();
        self.replace_file(&path, content.as_bytes()).await
    }

    pub async fn read_daily(&self) -> Result<String> {
        let path = self.layout.daily_file();
        fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {path:?}"))
    }

    /// Appends the daily file verbatim to the current yearly file and truncates it. Returns the
    /// amount of bytes moved.
    pub async fn archive_daily(&mut self) -> Result<usize> {
        let daily = self.layout.daily_file();
        let yearly = self.layout.yearly_file();
        let content = fs::read(&daily)
            .await
            .with_context(|| format!("Failed to read {daily:?}"))?;

        if !content.is_empty() {
            let mut file = File::options()
                .create(true)
                .append(true)
                .open(&yearly)
                .await?;
            // Semi-safe acquire-release for a file
            file.lock_exclusive()?;
            let result = Self::append_with_file(&mut file, &content).await;
            file.unlock_async().await?;
            result?;

            let archived = fs::read(&yearly).await?;
            self.self_writes.expect(&yearly, &archived);
        }

        self.replace_file(&daily, b"").await?;
        info!("Archived {} bytes of {daily:?} into {yearly:?}", content.len());
        Ok(content.len())
    }

    /// Moves last year's file into the archive directory, see
    /// [TrackerLayout::archive_previous_year].
    pub async fn archive_previous_year(&mut self) -> Result<()> {
        if let Some(destination) = self.layout.archive_previous_year().await? {
            let content = fs::read(&destination).await?;
            self.self_writes.expect(&destination, &content);
        }
        Ok(())
    }

    async fn append_with_file(file: &mut File, content: &[u8]) -> Result<()> {
        file.write_all(content).await?;
        file.flush().await?;
        Ok(())
    }

    async fn replace_file(&mut self, path: &Path, content: &[u8]) -> Result<()> {
        let tmp = path.with_extension("csv.tmp");
        let write_id = self.self_writes.expect(path, content);
        debug!("Write {write_id}: replacing {path:?} with {} bytes", content.len());

        fs::write(&tmp, content)
            .await
            .with_context(|| format!("Failed to write {tmp:?}"))?;
        fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to replace {path:?}"))?;
        Ok(())
    }

    /// Whether the current content of `path` is the echo of our own last write.
    pub async fn is_own_write(&self, path: &Path) -> bool {
        self.self_writes.is_own(path).await
    }
}

/// Reads every record of a log file, last line first. Lines that can't be decoded are skipped.
pub async fn read_records_reversed(path: &Path) -> Result<Vec<LogRecord>> {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => Err(e).with_context(|| format!("Failed to open {path:?}"))?,
    };
    file.lock_shared()?;

    let mut lines = ReverseLines::new(file).await?;
    let mut records = vec![];
    let result = loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match decode(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping illegal line {line:?} in {path:?}: {e}"),
            },
            Ok(None) => break Ok(records),
            Err(e) => break Err(e),
        }
    };

    lines.into_inner().unlock_async().await?;
    result
}

#[cfg(test)]
mod tests {
    use std::fs;

    use anyhow::Result;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    use crate::storage::{
        codec::encode,
        entities::{EntryKind, LogRecord},
        layout::TrackerLayout,
    };

    use super::{read_records_reversed, ArchiveWriter};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn record(d: u32, kind: EntryKind, key: &str, seconds: u64) -> LogRecord {
        LogRecord::from_seconds(date(d), kind, key.into(), seconds)
    }

    async fn writer() -> Result<(tempfile::TempDir, ArchiveWriter)> {
        let dir = tempdir()?;
        let layout = TrackerLayout::new(dir.path().to_path_buf(), 2024);
        layout.ensure().await?;
        Ok((dir, ArchiveWriter::new(layout)))
    }

    #[tokio::test]
    async fn test_daily_write_orders_projects_first_and_drops_short_entries() -> Result<()> {
        let (_dir, mut writer) = writer().await?;

        writer
            .write_daily([
                record(2, EntryKind::Task, "write docs", 120),
                record(2, EntryKind::Task, "glance at mail", 59),
                record(2, EntryKind::Project, "+docs", 180),
            ])
            .await?;

        assert_eq!(
            writer.read_daily().await?,
            "2024-01-02, 00:03, ++, \"+docs\"\n2024-01-02, 00:02, (), \"write docs\"\n"
        );
        assert!(!writer.layout().daily_file().with_extension("csv.tmp").exists());
        assert!(writer.is_own_write(&writer.layout().daily_file()).await);
        Ok(())
    }

    #[tokio::test]
    async fn test_archive_appends_to_yearly_and_truncates_daily() -> Result<()> {
        let (_dir, mut writer) = writer().await?;
        fs::write(
            writer.layout().yearly_file(),
            encode(&record(1, EntryKind::Project, "+proj", 1800)),
        )?;
        writer
            .write_daily([record(2, EntryKind::Project, "+proj", 3661)])
            .await?;

        let moved = writer.archive_daily().await?;

        assert_eq!(moved, "2024-01-02, 01:01, ++, \"+proj\"\n".len());
        assert_eq!(writer.read_daily().await?, "");
        assert_eq!(
            fs::read_to_string(writer.layout().yearly_file())?,
            "2024-01-01, 00:30, ++, \"+proj\"\n2024-01-02, 01:01, ++, \"+proj\"\n"
        );
        assert!(writer.is_own_write(&writer.layout().yearly_file()).await);
        assert!(writer.is_own_write(&writer.layout().daily_file()).await);
        Ok(())
    }

    #[tokio::test]
    async fn test_archive_of_empty_daily_leaves_yearly_alone() -> Result<()> {
        let (_dir, mut writer) = writer().await?;

        assert_eq!(writer.archive_daily().await?, 0);
        assert_eq!(fs::read_to_string(writer.layout().yearly_file())?, "");
        Ok(())
    }

    #[tokio::test]
    async fn test_write_into_removed_root_fails() -> Result<()> {
        let (dir, mut writer) = writer().await?;
        fs::remove_dir_all(dir.path())?;

        let result = writer
            .write_daily([record(2, EntryKind::Task, "write docs", 120)])
            .await;

        assert!(result.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_read_records_reversed_skips_garbage() -> Result<()> {
        let (_dir, writer) = writer().await?;
        let path = writer.layout().yearly_file();
        fs::write(
            &path,
            format!(
                "{}garbage\n\n{}",
                encode(&record(1, EntryKind::Task, "a", 60)),
                encode(&record(2, EntryKind::Task, "b", 120)),
            ),
        )?;

        let records = read_records_reversed(&path).await?;

        assert_eq!(
            records,
            vec![
                record(2, EntryKind::Task, "b", 120),
                record(1, EntryKind::Task, "a", 60)
            ]
        );
        assert!(read_records_reversed(&path.with_file_name("missing.csv"))
            .await?
            .is_empty());
        Ok(())
    }
}
