//! File-based checkpoint storage

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};

use super::traits::CheckpointStore;
use crate::models::CheckpointRecord;

const PREFIX: &str = ".progress_";
const SUFFIX: &str = ".json";

/// Checkpoints stored as hidden JSON files next to the session folders
///
/// Layout:
/// ```text
/// export/
///   .progress_20240131_093000.json
///   20240131_093000/
/// ```
pub struct FileCheckpointStore {
    root: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn record_path(&self, session_id: &str) -> PathBuf {
        self.root.join(format!("{}{}{}", PREFIX, session_id, SUFFIX))
    }

    /// Session id encoded in a checkpoint file name
    fn session_id_of(file_name: &str) -> Option<&str> {
        file_name
            .strip_prefix(PREFIX)?
            .strip_suffix(SUFFIX)
            .filter(|id| !id.is_empty())
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn save(&self, session_id: &str, record: &CheckpointRecord) -> Result<()> {
        fs::create_dir_all(&self.root).with_context(|| {
            format!("Failed to create export directory: {}", self.root.display())
        })?;

        let path = self.record_path(session_id);
        let content = serde_json::to_vec_pretty(record)?;

        // Write atomically (write to temp, then rename)
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)
            .with_context(|| format!("Failed to write checkpoint: {}", temp_path.display()))?;
        fs::rename(&temp_path, &path)
            .with_context(|| format!("Failed to replace checkpoint: {}", path.display()))?;

        log::debug!("Saved checkpoint {}: {:?}", session_id, record.stage);
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<CheckpointRecord> {
        let path = self.record_path(session_id);
        if !path.exists() {
            return Ok(CheckpointRecord::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read checkpoint: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Corrupt checkpoint: {}", path.display()))
    }

    fn discover_latest(&self) -> Result<Option<String>> {
        if !self.root.exists() {
            return Ok(None);
        }

        let mut latest: Option<(SystemTime, String)> = None;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(session_id) = file_name.to_str().and_then(Self::session_id_of) else {
                continue;
            };

            let modified = entry.metadata()?.modified()?;
            if latest.as_ref().is_none_or(|(newest, _)| modified > *newest) {
                latest = Some((modified, session_id.to_string()));
            }
        }

        Ok(latest.map(|(_, id)| id))
    }

    fn clear(&self, session_id: &str) -> Result<()> {
        let path = self.record_path(session_id);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove checkpoint: {}", path.display()))?;
            log::info!("Progress file cleaned up");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChannelId, SyncStage};
    use filetime::{FileTime, set_file_mtime};
    use tempfile::tempdir;

    fn processing_record() -> CheckpointRecord {
        let mut record = CheckpointRecord::default();
        record.advance(SyncStage::Processing);
        record.mark_channel_complete(ChannelId::new("C1"));
        record
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());

        store.save("20240101_000000", &processing_record()).unwrap();
        let loaded = store.load("20240101_000000").unwrap();

        assert_eq!(loaded, processing_record());
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());

        store.save("s1", &CheckpointRecord::default()).unwrap();
        store.save("s1", &processing_record()).unwrap();

        assert_eq!(store.load("s1").unwrap(), processing_record());
        assert!(!dir.path().join(".progress_s1.tmp").exists());
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("not-created-yet"));

        assert!(store.load("nope").unwrap().is_empty());
    }

    #[test]
    fn test_load_corrupt_is_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".progress_s1.json"), "{ not json").unwrap();
        let store = FileCheckpointStore::new(dir.path());

        assert!(store.load("s1").is_err());
    }

    #[test]
    fn test_clear_then_load_is_empty() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());

        store.save("s1", &processing_record()).unwrap();
        store.clear("s1").unwrap();

        assert!(store.load("s1").unwrap().is_empty());
        // Clearing twice is fine
        store.clear("s1").unwrap();
    }

    #[test]
    fn test_discover_latest_by_mtime() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());

        store.save("20240101_000000", &CheckpointRecord::default()).unwrap();
        store.save("20240301_000000", &CheckpointRecord::default()).unwrap();
        store.save("20240201_000000", &CheckpointRecord::default()).unwrap();

        // The lexically smallest id is the most recently touched
        set_file_mtime(dir.path().join(".progress_20240101_000000.json"), FileTime::from_unix_time(3_000, 0)).unwrap();
        set_file_mtime(dir.path().join(".progress_20240201_000000.json"), FileTime::from_unix_time(2_000, 0)).unwrap();
        set_file_mtime(dir.path().join(".progress_20240301_000000.json"), FileTime::from_unix_time(1_000, 0)).unwrap();

        assert_eq!(
            store.discover_latest().unwrap().as_deref(),
            Some("20240101_000000")
        );
    }

    #[test]
    fn test_discover_latest_ignores_other_files() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("20240101_000000")).unwrap();
        fs::write(dir.path().join("20231231_000000.zip"), b"zip").unwrap();
        fs::write(dir.path().join(".progress_s1.tmp"), b"{}").unwrap();
        let store = FileCheckpointStore::new(dir.path());

        assert_eq!(store.discover_latest().unwrap(), None);
    }

    #[test]
    fn test_discover_latest_without_root() {
        let store = FileCheckpointStore::new("/nonexistent/slack-export-root");
        assert_eq!(store.discover_latest().unwrap(), None);
    }
}
