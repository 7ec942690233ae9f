use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Result;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, info};

pub const DAILY_FILE_NAME: &str = "TODAY__time_tracker.csv";
pub const YEARS_DIR_NAME: &str = "YEARS__time_tracker";
const YEARLY_FILE_SUFFIX: &str = "__time_tracker.csv";

pub fn yearly_file_name(year: i32) -> String {
    format!("{year:04}{YEARLY_FILE_SUFFIX}")
}

/// Returns the year a file name belongs to if it looks like `NNNN__time_tracker.csv`.
pub fn parse_yearly_file_name(name: &str) -> Option<i32> {
    let year = name.strip_suffix(YEARLY_FILE_SUFFIX)?;
    if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    year.parse().ok()
}

/// The parts of a storage root the tracker cares about changing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageTarget {
    DailyFile,
    YearlyFile,
    YearsDir,
}

/// Paths of every log file under a storage root for a given year.
///
/// ```text
/// <root>/TODAY__time_tracker.csv
/// <root>/<year>__time_tracker.csv
/// <root>/YEARS__time_tracker/<year>__time_tracker.csv
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerLayout {
    root: PathBuf,
    year: i32,
}

impl TrackerLayout {
    pub fn new(root: PathBuf, year: i32) -> Self {
        Self { root, year }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn daily_file(&self) -> PathBuf {
        self.root.join(DAILY_FILE_NAME)
    }

    pub fn yearly_file(&self) -> PathBuf {
        self.root.join(yearly_file_name(self.year))
    }

    pub fn years_dir(&self) -> PathBuf {
        self.root.join(YEARS_DIR_NAME)
    }

    fn previous_yearly_file(&self) -> PathBuf {
        self.root.join(yearly_file_name(self.year - 1))
    }

    /// Creates whatever is missing from the layout. Existing files and directories are left
    /// untouched, so calling this on a complete layout changes nothing.
    pub async fn ensure(&self) -> Result<()> {
        let years_dir = self.years_dir();
        if !fs::try_exists(&years_dir).await? {
            debug!("Creating {years_dir:?}");
            fs::create_dir_all(&years_dir).await?;
        }

        for file in [self.yearly_file(), self.daily_file()] {
            if !fs::try_exists(&file).await? {
                debug!("Creating {file:?}");
                fs::File::options()
                    .create_new(true)
                    .write(true)
                    .open(&file)
                    .await?;
            }
        }
        Ok(())
    }

    /// Moves the yearly file of the previous year into the archive directory. If the archive
    /// already holds a file for that year, the leftover is appended to it instead of replacing it.
    /// Returns the archived file when something was moved.
    pub async fn archive_previous_year(&self) -> Result<Option<PathBuf>> {
        let previous = self.previous_yearly_file();
        if !fs::try_exists(&previous).await? {
            return Ok(None);
        }

        let destination = self.years_dir().join(yearly_file_name(self.year - 1));
        if fs::try_exists(&destination).await? {
            let content = fs::read(&previous).await?;
            let mut file = fs::File::options()
                .append(true)
                .open(&destination)
                .await?;
            file.write_all(&content).await?;
            file.flush().await?;
            fs::remove_file(&previous).await?;
        } else {
            fs::rename(&previous, &destination).await?;
        }

        info!("Moved {previous:?} into {destination:?}");
        Ok(Some(destination))
    }

    /// Yearly files that hold history, newest name first: everything archived plus the current
    /// year's file.
    pub async fn history_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = vec![];

        match fs::read_dir(self.years_dir()).await {
            Ok(mut entries) => {
                while let Some(entry) = entries.next_entry().await? {
                    let name = entry.file_name();
                    let is_yearly = name
                        .to_str()
                        .and_then(parse_yearly_file_name)
                        .is_some();
                    if is_yearly && entry.file_type().await?.is_file() {
                        files.push(entry.path());
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => Err(e)?,
        }

        files.push(self.yearly_file());
        files.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
        Ok(files)
    }

    /// Maps a changed path onto the part of the layout it belongs to.
    pub fn classify(&self, path: &Path) -> Option<StorageTarget> {
        if path == self.daily_file() {
            Some(StorageTarget::DailyFile)
        } else if path == self.yearly_file() {
            Some(StorageTarget::YearlyFile)
        } else if path == self.years_dir() || path.parent() == Some(self.years_dir().as_path()) {
            Some(StorageTarget::YearsDir)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, time::SystemTime};

    use anyhow::Result;
    use tempfile::tempdir;

    use super::{parse_yearly_file_name, StorageTarget, TrackerLayout};

    fn snapshot(root: &std::path::Path) -> Result<Vec<(String, u64, SystemTime)>> {
        let mut result = vec![];
        for entry in walk(root)? {
            let metadata = fs::metadata(&entry)?;
            result.push((
                entry.to_string_lossy().into_owned(),
                metadata.len(),
                metadata.modified()?,
            ));
        }
        result.sort();
        Ok(result)
    }

    fn walk(root: &std::path::Path) -> Result<Vec<std::path::PathBuf>> {
        let mut paths = vec![root.to_path_buf()];
        for entry in fs::read_dir(root)? {
            let path = entry?.path();
            if path.is_dir() {
                paths.extend(walk(&path)?);
            } else {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    #[tokio::test]
    async fn test_ensure_creates_layout() -> Result<()> {
        let dir = tempdir()?;
        let layout = TrackerLayout::new(dir.path().join("logs"), 2024);

        layout.ensure().await?;

        assert!(layout.years_dir().is_dir());
        assert!(layout.yearly_file().is_file());
        assert!(layout.daily_file().is_file());
        assert!(layout.yearly_file().ends_with("2024__time_tracker.csv"));
        Ok(())
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() -> Result<()> {
        let dir = tempdir()?;
        let layout = TrackerLayout::new(dir.path().to_path_buf(), 2024);
        layout.ensure().await?;
        fs::write(layout.daily_file(), "2024-01-01, 00:01, (), \"x\"\n")?;

        let before = snapshot(dir.path())?;
        layout.ensure().await?;
        let after = snapshot(dir.path())?;

        assert_eq!(before, after);
        Ok(())
    }

    #[tokio::test]
    async fn test_previous_year_is_archived() -> Result<()> {
        let dir = tempdir()?;
        let layout = TrackerLayout::new(dir.path().to_path_buf(), 2024);
        layout.ensure().await?;
        fs::write(dir.path().join("2023__time_tracker.csv"), "old\n")?;

        assert_eq!(
            layout.archive_previous_year().await?,
            Some(layout.years_dir().join("2023__time_tracker.csv"))
        );
        assert!(!dir.path().join("2023__time_tracker.csv").exists());
        assert_eq!(
            fs::read_to_string(layout.years_dir().join("2023__time_tracker.csv"))?,
            "old\n"
        );
        assert_eq!(layout.archive_previous_year().await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_previous_year_is_merged_into_existing_archive() -> Result<()> {
        let dir = tempdir()?;
        let layout = TrackerLayout::new(dir.path().to_path_buf(), 2024);
        layout.ensure().await?;
        fs::write(layout.years_dir().join("2023__time_tracker.csv"), "first\n")?;
        fs::write(dir.path().join("2023__time_tracker.csv"), "second\n")?;

        layout.archive_previous_year().await?;

        assert_eq!(
            fs::read_to_string(layout.years_dir().join("2023__time_tracker.csv"))?,
            "first\nsecond\n"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_history_files_newest_first() -> Result<()> {
        let dir = tempdir()?;
        let layout = TrackerLayout::new(dir.path().to_path_buf(), 2024);
        layout.ensure().await?;
        fs::write(layout.years_dir().join("2021__time_tracker.csv"), "")?;
        fs::write(layout.years_dir().join("2022__time_tracker.csv"), "")?;
        fs::write(layout.years_dir().join("notes.txt"), "")?;

        let names = layout
            .history_files()
            .await?
            .into_iter()
            .map(|v| v.file_name().unwrap().to_string_lossy().into_owned())
            .collect::<Vec<_>>();

        assert_eq!(
            names,
            vec![
                "2024__time_tracker.csv",
                "2022__time_tracker.csv",
                "2021__time_tracker.csv"
            ]
        );
        Ok(())
    }

    #[test]
    fn test_classify() {
        let layout = TrackerLayout::new("/logs".into(), 2024);
        assert_eq!(
            layout.classify(&layout.daily_file()),
            Some(StorageTarget::DailyFile)
        );
        assert_eq!(
            layout.classify(&layout.yearly_file()),
            Some(StorageTarget::YearlyFile)
        );
        assert_eq!(
            layout.classify(&layout.years_dir().join("2020__time_tracker.csv")),
            Some(StorageTarget::YearsDir)
        );
        assert_eq!(
            layout.classify(&layout.root().join("TODAY__time_tracker.csv.tmp")),
            None
        );
    }

    #[test]
    fn test_yearly_file_names() {
        assert_eq!(parse_yearly_file_name("2024__time_tracker.csv"), Some(2024));
        assert_eq!(parse_yearly_file_name("24__time_tracker.csv"), None);
        assert_eq!(parse_yearly_file_name("TODAY__time_tracker.csv"), None);
    }
}
