//! JSON files on disk, one tree per session

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::traits::ExportWriter;
use crate::models::{Attachment, Channel, Message, User};

const USERS_FILE: &str = "users.json";
const CHANNELS_FILE: &str = "channels.json";
const MESSAGES_FILE: &str = "messages.json";
const FILES_DIR: &str = "files";

/// Writes exported collections as pretty-printed JSON
///
/// Directory structure:
/// ```text
/// export/
///   20240131_093000/
///     users.json
///     channels.json
///     general/
///       2024-01-30.json        # one file per UTC day when splitting
///       2024-01-31.json
///       files/
///         F0123_report.pdf
///     @Jane/
///       messages.json          # single file when not splitting
/// ```
pub struct JsonExportWriter {
    root: PathBuf,
    split_by_day: bool,
}

impl JsonExportWriter {
    pub fn new(root: impl AsRef<Path>, split_by_day: bool) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            split_by_day,
        }
    }

    /// Directory holding everything written for a session
    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.root.join(session_id)
    }

    fn channel_dir(&self, session_id: &str, channel_name: &str) -> PathBuf {
        self.session_dir(session_id)
            .join(path_component(channel_name))
    }

    fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let content = serde_json::to_vec_pretty(value)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let content =
            fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_slice(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }
}

impl ExportWriter for JsonExportWriter {
    fn write_users(&self, session_id: &str, users: &[User]) -> Result<()> {
        let path = self.session_dir(session_id).join(USERS_FILE);
        self.write_json(&path, users)?;
        log::info!("Saved {} users to {}", users.len(), path.display());
        Ok(())
    }

    fn read_users(&self, session_id: &str) -> Result<Vec<User>> {
        self.read_json(&self.session_dir(session_id).join(USERS_FILE))
    }

    fn write_channels(&self, session_id: &str, channels: &[Channel]) -> Result<()> {
        let path = self.session_dir(session_id).join(CHANNELS_FILE);
        self.write_json(&path, channels)?;
        log::info!("Saved {} channels to {}", channels.len(), path.display());
        Ok(())
    }

    fn read_channels(&self, session_id: &str) -> Result<Vec<Channel>> {
        self.read_json(&self.session_dir(session_id).join(CHANNELS_FILE))
    }

    fn write_messages(
        &self,
        session_id: &str,
        channel_name: &str,
        messages: &[Message],
    ) -> Result<()> {
        let dir = self.channel_dir(session_id, channel_name);

        if !self.split_by_day {
            return self.write_json(&dir.join(MESSAGES_FILE), messages);
        }

        let mut days: BTreeMap<String, Vec<&Message>> = BTreeMap::new();
        for message in messages {
            let day = message.day().unwrap_or_else(|| "unknown".to_string());
            days.entry(day).or_default().push(message);
        }

        for (day, day_messages) in &days {
            self.write_json(&dir.join(format!("{}.json", day)), day_messages)?;
        }
        log::debug!(
            "Wrote {} messages of {} across {} day files",
            messages.len(),
            channel_name,
            days.len()
        );
        Ok(())
    }

    fn write_file(
        &self,
        session_id: &str,
        channel_name: &str,
        attachment: &Attachment,
        data: &[u8],
    ) -> Result<()> {
        let dir = self.channel_dir(session_id, channel_name).join(FILES_DIR);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

        let path = dir.join(path_component(&attachment.file_name()));
        fs::write(&path, data).with_context(|| format!("Failed to write {}", path.display()))
    }
}

/// Make a remote name safe to use as a single path component
fn path_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => format!("_{}", cleaned),
        _ => cleaned,
    }
}
