//! Domain models for exported workspace entities

mod channel;
mod message;
mod sync_state;
mod user;

pub use channel::{Channel, ChannelId};
pub use message::{Attachment, Message, TOMBSTONE_MODE, sort_messages};
pub use sync_state::{CheckpointRecord, SyncSession, SyncStage};
pub use user::{User, UserId};
