//! Export crate - resumable workspace export from Slack
//!
//! This crate provides:
//! - Domain models (User, Channel, Message, checkpoint records)
//! - A Slack Web API client and the seams it implements
//! - A rate-limit aware, checkpointed sync engine
//! - Storage for checkpoints, exported JSON and the final archive
//!
//! Everything is synchronous; waits block the calling thread.

pub mod config;
pub mod models;
pub mod slack;
pub mod storage;
pub mod sync;

pub use config::ExportConfig;
pub use models::{Attachment, Channel, ChannelId, CheckpointRecord, Message, SyncSession, SyncStage, User, UserId};
pub use slack::{ApiError, FileTransport, RetryHint, SlackApi, SlackClient};
pub use storage::{
    Archiver, CheckpointStore, ExportWriter, FileCheckpointStore, JsonExportWriter, ZipArchiver,
};
pub use sync::{ExportStats, Exporter, SessionMode, ThreadSleeper};
