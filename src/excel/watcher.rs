use chrono::{DateTime, Local};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::{debug, info, warn};

use super::types::*;

/// Settle time after a filesystem event before the folder is rescanned
const DEBOUNCE: Duration = Duration::from_millis(500);

/// A workbook picked up from the drop folder, already moved into its own
/// batch folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedFile {
    pub file_path: PathBuf,
    pub folder_path: PathBuf,
}

/// Polls a drop folder for new `.xlsx` files. A notify watcher wakes the
/// loop early; polling stays authoritative.
pub struct FolderWatcher {
    watch_dir: PathBuf,
    interval: Duration,
    batch_stamp: String,
    processed: HashSet<PathBuf>,
    /// Size and mtime of each candidate at the previous scan
    last_seen: HashMap<PathBuf, FileSignature>,
    events: Option<EventSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileSignature {
    len: u64,
    modified: SystemTime,
}

impl FileSignature {
    fn of(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        Some(FileSignature {
            len: meta.len(),
            modified: meta.modified().ok()?,
        })
    }
}

struct EventSource {
    #[allow(dead_code)]
    watcher: RecommendedWatcher,
    rx: UnboundedReceiver<notify::Result<Event>>,
}

impl FolderWatcher {
    /// Batch folders are stamped with `started` (`%Y%m%d-%H%M`)
    pub fn new(watch_dir: &Path, interval: Duration, started: DateTime<Local>) -> Result<Self, ExcelError> {
        std::fs::create_dir_all(watch_dir).map_err(|e| {
            ExcelError::watch_error(format!("Failed to create {}: {}", watch_dir.display(), e))
        })?;

        let events = match start_event_source(watch_dir) {
            Ok(source) => Some(source),
            Err(e) => {
                warn!("filesystem events unavailable, polling only: {}", e.message);
                None
            }
        };

        Ok(FolderWatcher {
            watch_dir: watch_dir.to_path_buf(),
            interval,
            batch_stamp: started.format("%Y%m%d-%H%M").to_string(),
            processed: HashSet::new(),
            last_seen: HashMap::new(),
            events,
        })
    }

    pub fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }

    /// Unprocessed workbooks in the drop folder, oldest first
    pub fn scan(&self) -> Result<Vec<PathBuf>, ExcelError> {
        let escaped = PathBuf::from(glob::Pattern::escape(&self.watch_dir.to_string_lossy()));
        let pattern = escaped.join("*.xlsx").to_string_lossy().into_owned();

        let paths = glob::glob(&pattern)
            .map_err(|e| ExcelError::watch_error(format!("Invalid watch pattern: {}", e)))?;

        let mut found: Vec<(SystemTime, String, PathBuf)> = Vec::new();
        for entry in paths.flatten() {
            if !entry.is_file() || self.processed.contains(&entry) {
                continue;
            }
            let name = match entry.file_name() {
                Some(name) => name.to_string_lossy().into_owned(),
                None => continue,
            };
            // Excel lock files
            if name.starts_with("~$") {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((modified, name, entry));
        }

        found.sort();
        Ok(found.into_iter().map(|(_, _, path)| path).collect())
    }

    /// Move the oldest new workbook into `<stamp> <file name>/` and return it.
    ///
    /// A file is only taken once its size and mtime match the previous scan,
    /// so a workbook still being copied in is left alone. A failed move is
    /// retried on the next scan.
    pub fn take_next(&mut self) -> Result<Option<DetectedFile>, ExcelError> {
        let candidates = self.scan()?;
        let previous = std::mem::take(&mut self.last_seen);

        let mut taken = None;
        for candidate in candidates {
            let signature = match FileSignature::of(&candidate) {
                Some(signature) => signature,
                None => continue,
            };
            let stable = previous.get(&candidate) == Some(&signature);
            if taken.is_some() || !stable {
                if !stable {
                    debug!(file = %candidate.display(), "waiting for workbook to settle");
                }
                self.last_seen.insert(candidate, signature);
                continue;
            }

            let name = match candidate.file_name() {
                Some(name) => name.to_string_lossy().into_owned(),
                None => continue,
            };
            let folder_path = self.watch_dir.join(format!("{} {}", self.batch_stamp, name));

            match move_into_folder(&candidate, &folder_path) {
                Ok(file_path) => {
                    info!(file = %file_path.display(), "picked up new workbook");
                    self.processed.insert(file_path.clone());
                    taken = Some(DetectedFile { file_path, folder_path });
                }
                Err(e) => {
                    warn!(file = %candidate.display(), "could not move workbook, will retry: {}", e);
                    self.last_seen.insert(candidate, signature);
                }
            }
        }

        Ok(taken)
    }

    /// Block until a new workbook arrives. Never gives up.
    pub async fn wait_for_new_file(&mut self) -> DetectedFile {
        loop {
            match self.take_next() {
                Ok(Some(detected)) => return detected,
                Ok(None) => {}
                Err(e) => warn!("scan of {} failed: {}", self.watch_dir.display(), e.message),
            }
            self.idle().await;
        }
    }

    async fn idle(&mut self) {
        let closed = match self.events.as_mut() {
            None => {
                tokio::time::sleep(self.interval).await;
                false
            }
            Some(source) => {
                tokio::select! {
                    _ = tokio::time::sleep(self.interval) => false,
                    event = source.rx.recv() => match event {
                        Some(event) => {
                            if let Err(e) = event {
                                debug!("watch error: {}", e);
                            }
                            tokio::time::sleep(DEBOUNCE).await;
                            while source.rx.try_recv().is_ok() {}
                            false
                        }
                        None => true,
                    },
                }
            }
        };

        if closed {
            warn!("filesystem event channel closed, polling only");
            self.events = None;
        }
    }
}

fn start_event_source(dir: &Path) -> Result<EventSource, ExcelError> {
    let (tx, rx) = unbounded_channel();

    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        Config::default(),
    )
    .map_err(|e| ExcelError::watch_error(format!("Failed to create watcher: {}", e)))?;

    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(|e| ExcelError::watch_error(format!("Failed to watch {}: {}", dir.display(), e)))?;

    Ok(EventSource { watcher, rx })
}

/// Move `file` into `folder` (created if missing), falling back to
/// copy-and-delete across filesystems. Returns the new path.
pub fn move_into_folder(file: &Path, folder: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(folder)?;
    let name = file.file_name().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{} has no file name", file.display()))
    })?;
    let target = folder.join(name);

    if std::fs::rename(file, &target).is_err() {
        std::fs::copy(file, &target)?;
        std::fs::remove_file(file)?;
    }

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs::File;

    fn started() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 1, 9, 5, 0).unwrap()
    }

    fn touch(path: &Path, age_secs: u64) {
        let file = File::create(path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs)).unwrap();
    }

    #[tokio::test]
    async fn test_scan_orders_oldest_first_and_skips_lock_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.xlsx"), 300);
        touch(&dir.path().join("a.xlsx"), 100);
        touch(&dir.path().join("~$b.xlsx"), 500);
        touch(&dir.path().join("notes.csv"), 600);

        let watcher = FolderWatcher::new(dir.path(), Duration::from_secs(60), started()).unwrap();
        let names: Vec<String> = watcher
            .scan()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["b.xlsx", "a.xlsx"]);
    }

    #[tokio::test]
    async fn test_take_next_moves_into_stamped_folder() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("order.xlsx"), 10);

        let mut watcher = FolderWatcher::new(dir.path(), Duration::from_secs(60), started()).unwrap();
        assert!(watcher.take_next().unwrap().is_none(), "first sighting only records the file");
        let detected = watcher.take_next().unwrap().unwrap();

        let folder = dir.path().join("20240301-0905 order.xlsx");
        assert_eq!(detected.folder_path, folder);
        assert_eq!(detected.file_path, folder.join("order.xlsx"));
        assert!(detected.file_path.is_file());
        assert!(!dir.path().join("order.xlsx").exists());

        // the batch folder matches *.xlsx but is not a file
        assert!(watcher.take_next().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_growing_file_is_not_taken_until_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("order.xlsx");
        std::fs::write(&path, b"PK partial").unwrap();

        let mut watcher = FolderWatcher::new(dir.path(), Duration::from_secs(60), started()).unwrap();
        assert!(watcher.take_next().unwrap().is_none());

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        std::io::Write::write_all(&mut file, b" more bytes").unwrap();
        drop(file);
        assert!(watcher.take_next().unwrap().is_none(), "size changed since last scan");
        assert!(path.exists());

        let detected = watcher.take_next().unwrap().unwrap();
        assert_eq!(std::fs::read(&detected.file_path).unwrap(), b"PK partial more bytes");
    }

    #[tokio::test]
    async fn test_failed_move_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("order.xlsx"), 10);
        // a directory where the moved file should land blocks the move
        let blocker = dir.path().join("20240301-0905 order.xlsx").join("order.xlsx");
        std::fs::create_dir_all(&blocker).unwrap();

        let mut watcher = FolderWatcher::new(dir.path(), Duration::from_secs(60), started()).unwrap();
        assert!(watcher.take_next().unwrap().is_none());
        assert!(watcher.take_next().unwrap().is_none());
        assert!(dir.path().join("order.xlsx").is_file());

        std::fs::remove_dir(&blocker).unwrap();
        let detected = watcher.take_next().unwrap().unwrap();
        assert_eq!(detected.file_path, blocker);
        assert!(detected.file_path.is_file());
    }

    #[tokio::test]
    async fn test_wait_picks_up_late_arrival() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = FolderWatcher::new(dir.path(), Duration::from_millis(50), started()).unwrap();

        let late = dir.path().join("late.xlsx");
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            touch(&late, 0);
        });

        let detected = tokio::time::timeout(Duration::from_secs(10), watcher.wait_for_new_file())
            .await
            .unwrap();
        assert!(detected.file_path.ends_with("late.xlsx"));
    }

    #[test]
    fn test_move_into_folder_creates_target() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("export.csv");
        std::fs::write(&file, "a,b").unwrap();

        let moved = move_into_folder(&file, &dir.path().join("batch")).unwrap();
        assert_eq!(std::fs::read_to_string(&moved).unwrap(), "a,b");
        assert!(!file.exists());
    }
}
