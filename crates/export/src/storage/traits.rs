//! Storage trait definitions

use std::path::PathBuf;

use anyhow::Result;

use crate::models::{Attachment, Channel, CheckpointRecord, Message, User};

/// Durable record of session progress
///
/// Written after every state-advancing event, read once at startup.
pub trait CheckpointStore: Send + Sync {
    /// Overwrite the record for `session_id` as a whole
    fn save(&self, session_id: &str, record: &CheckpointRecord) -> Result<()>;

    /// Load the record for `session_id`
    ///
    /// A missing record is an empty one. An unreadable record is an error;
    /// callers decide whether that is fatal.
    fn load(&self, session_id: &str) -> Result<CheckpointRecord>;

    /// Id of the most recently modified record, if any exist
    fn discover_latest(&self) -> Result<Option<String>>;

    /// Remove the record for `session_id`; a missing record is not an error
    fn clear(&self, session_id: &str) -> Result<()>;
}

/// Persists exported collections under a session-scoped tree
pub trait ExportWriter: Send + Sync {
    fn write_users(&self, session_id: &str, users: &[User]) -> Result<()>;

    fn read_users(&self, session_id: &str) -> Result<Vec<User>>;

    fn write_channels(&self, session_id: &str, channels: &[Channel]) -> Result<()>;

    fn read_channels(&self, session_id: &str) -> Result<Vec<Channel>>;

    /// Write a channel's full, sorted message list
    fn write_messages(&self, session_id: &str, channel_name: &str, messages: &[Message])
    -> Result<()>;

    fn write_file(
        &self,
        session_id: &str,
        channel_name: &str,
        attachment: &Attachment,
        data: &[u8],
    ) -> Result<()>;
}

/// Packages a finished session
pub trait Archiver: Send + Sync {
    /// Archive the session tree and remove it; returns the archive location
    fn archive(&self, session_id: &str) -> Result<PathBuf>;

    /// Whether the session has already been archived
    fn is_archived(&self, session_id: &str) -> bool;
}
