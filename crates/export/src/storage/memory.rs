//! In-memory storage implementations
//!
//! Used by tests to drive the sync engine without touching the disk.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::RwLock;

use anyhow::{Result, anyhow};

use super::traits::{Archiver, CheckpointStore, ExportWriter};
use crate::models::{Attachment, Channel, CheckpointRecord, Message, User};

/// Checkpoints kept in a map; "latest" is the most recently saved
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    records: RwLock<HashMap<String, (u64, CheckpointRecord)>>,
    corrupt: RwLock<HashSet<String>>,
    sequence: RwLock<u64>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `load` fail for a session, as an unreadable file would
    pub fn corrupt(&self, session_id: &str) {
        self.corrupt.write().unwrap().insert(session_id.to_string());
    }

    /// Current record for a session, without going through `load`
    pub fn get(&self, session_id: &str) -> Option<CheckpointRecord> {
        self.records
            .read()
            .unwrap()
            .get(session_id)
            .map(|(_, record)| record.clone())
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn save(&self, session_id: &str, record: &CheckpointRecord) -> Result<()> {
        let mut sequence = self.sequence.write().unwrap();
        *sequence += 1;
        self.records
            .write()
            .unwrap()
            .insert(session_id.to_string(), (*sequence, record.clone()));
        self.corrupt.write().unwrap().remove(session_id);
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<CheckpointRecord> {
        if self.corrupt.read().unwrap().contains(session_id) {
            return Err(anyhow!("Corrupt checkpoint: {}", session_id));
        }
        Ok(self.get(session_id).unwrap_or_default())
    }

    fn discover_latest(&self) -> Result<Option<String>> {
        Ok(self
            .records
            .read()
            .unwrap()
            .iter()
            .max_by_key(|(_, (seq, _))| *seq)
            .map(|(id, _)| id.clone()))
    }

    fn clear(&self, session_id: &str) -> Result<()> {
        self.records.write().unwrap().remove(session_id);
        Ok(())
    }
}

/// Exported collections kept per session in maps
#[derive(Default)]
pub struct InMemoryExportWriter {
    users: RwLock<HashMap<String, Vec<User>>>,
    channels: RwLock<HashMap<String, Vec<Channel>>>,
    messages: RwLock<HashMap<(String, String), Vec<Message>>>,
    files: RwLock<HashMap<(String, String), Vec<u8>>>,
    failing_files: RwLock<HashSet<String>>,
}

impl InMemoryExportWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages last written for a channel
    pub fn messages(&self, session_id: &str, channel_name: &str) -> Option<Vec<Message>> {
        self.messages
            .read()
            .unwrap()
            .get(&(session_id.to_string(), channel_name.to_string()))
            .cloned()
    }

    /// Contents of a written attachment, keyed by its local file name
    pub fn file(&self, session_id: &str, file_name: &str) -> Option<Vec<u8>> {
        self.files
            .read()
            .unwrap()
            .get(&(session_id.to_string(), file_name.to_string()))
            .cloned()
    }

    pub fn file_count(&self) -> usize {
        self.files.read().unwrap().len()
    }

    /// Channel names that have messages written, sorted
    pub fn channel_names(&self, session_id: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .messages
            .read()
            .unwrap()
            .keys()
            .filter(|(session, _)| session == session_id)
            .map(|(_, channel)| channel.clone())
            .collect();
        names.sort();
        names
    }

    /// Forget the users written for a session, as if the file were lost
    pub fn drop_users(&self, session_id: &str) {
        self.users.write().unwrap().remove(session_id);
    }

    /// Make `write_file` fail for an attachment, as a full disk would
    pub fn fail_file(&self, file_name: &str) {
        self.failing_files
            .write()
            .unwrap()
            .insert(file_name.to_string());
    }
}

impl ExportWriter for InMemoryExportWriter {
    fn write_users(&self, session_id: &str, users: &[User]) -> Result<()> {
        self.users
            .write()
            .unwrap()
            .insert(session_id.to_string(), users.to_vec());
        Ok(())
    }

    fn read_users(&self, session_id: &str) -> Result<Vec<User>> {
        self.users
            .read()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| anyhow!("No users written for {}", session_id))
    }

    fn write_channels(&self, session_id: &str, channels: &[Channel]) -> Result<()> {
        self.channels
            .write()
            .unwrap()
            .insert(session_id.to_string(), channels.to_vec());
        Ok(())
    }

    fn read_channels(&self, session_id: &str) -> Result<Vec<Channel>> {
        self.channels
            .read()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| anyhow!("No channels written for {}", session_id))
    }

    fn write_messages(
        &self,
        session_id: &str,
        channel_name: &str,
        messages: &[Message],
    ) -> Result<()> {
        self.messages.write().unwrap().insert(
            (session_id.to_string(), channel_name.to_string()),
            messages.to_vec(),
        );
        Ok(())
    }

    fn write_file(
        &self,
        session_id: &str,
        _channel_name: &str,
        attachment: &Attachment,
        data: &[u8],
    ) -> Result<()> {
        let file_name = attachment.file_name();
        if self.failing_files.read().unwrap().contains(&file_name) {
            return Err(anyhow!("No space left to write {}", file_name));
        }
        self.files.write().unwrap().insert(
            (session_id.to_string(), file_name),
            data.to_vec(),
        );
        Ok(())
    }
}

/// Records which sessions were archived
#[derive(Default)]
pub struct InMemoryArchiver {
    archived: RwLock<HashSet<String>>,
    runs: RwLock<HashMap<String, usize>>,
}

impl InMemoryArchiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times a session was archived
    pub fn archive_count(&self, session_id: &str) -> usize {
        self.runs
            .read()
            .unwrap()
            .get(session_id)
            .copied()
            .unwrap_or(0)
    }
}

impl Archiver for InMemoryArchiver {
    fn archive(&self, session_id: &str) -> Result<PathBuf> {
        self.archived.write().unwrap().insert(session_id.to_string());
        *self
            .runs
            .write()
            .unwrap()
            .entry(session_id.to_string())
            .or_insert(0) += 1;
        Ok(PathBuf::from(format!("{}.zip", session_id)))
    }

    fn is_archived(&self, session_id: &str) -> bool {
        self.archived.read().unwrap().contains(session_id)
    }
}
