//! Sync progress tracking for resumable exports

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::ChannelId;

/// Stages of an export session, in the order they are reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    /// Nothing has been fetched yet
    #[default]
    Init,
    UsersFetched,
    ChannelsFetched,
    /// Per-channel message and file export is underway
    Processing,
    /// Every channel is exported; only archival remains
    Complete,
}

/// Durable progress of one export session
///
/// This is the only state that must survive a crash. It is written after
/// every stage transition and after each completed channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    #[serde(default)]
    pub stage: SyncStage,
    /// Channels whose messages and files are fully exported, in completion order
    #[serde(default)]
    pub completed_channel_ids: Vec<ChannelId>,
}

impl CheckpointRecord {
    /// A record with no progress at all
    pub fn is_empty(&self) -> bool {
        self.stage == SyncStage::Init && self.completed_channel_ids.is_empty()
    }

    pub fn has_reached(&self, stage: SyncStage) -> bool {
        self.stage >= stage
    }

    /// Move forward to `stage`; never moves backwards
    pub fn advance(&mut self, stage: SyncStage) {
        if stage > self.stage {
            self.stage = stage;
        }
    }

    pub fn is_channel_complete(&self, id: &ChannelId) -> bool {
        self.completed_channel_ids.contains(id)
    }

    /// Record a channel as done. Returns false if it was already recorded.
    pub fn mark_channel_complete(&mut self, id: ChannelId) -> bool {
        if self.is_channel_complete(&id) {
            return false;
        }
        self.completed_channel_ids.push(id);
        true
    }
}

/// One end-to-end export run
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSession {
    /// Timestamp-derived id, e.g. `20240131_093000`
    pub id: String,
    pub record: CheckpointRecord,
}

impl SyncSession {
    /// Start a fresh session with an id derived from `now`
    pub fn start(now: DateTime<Local>) -> Self {
        Self {
            id: now.format("%Y%m%d_%H%M%S").to_string(),
            record: CheckpointRecord::default(),
        }
    }

    /// Continue a session from its recovered checkpoint
    pub fn resume(id: impl Into<String>, record: CheckpointRecord) -> Self {
        Self {
            id: id.into(),
            record,
        }
    }
}
