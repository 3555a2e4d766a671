//! Message and attachment models

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `mode` value of an attachment that was deleted on the remote side
pub const TOMBSTONE_MODE: &str = "tombstone";

/// A channel message or thread reply
///
/// `ts` is a decimal string (`"1700000000.000100"`). All timestamps share
/// the same fractional precision, so ordering by the string is ordering by
/// time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub ts: String,
    /// Timestamp of the thread root this message belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<Attachment>>,
    #[serde(flatten)]
    pub raw: Map<String, Value>,
}

impl Message {
    pub fn new(ts: impl Into<String>) -> Self {
        Self {
            ts: ts.into(),
            thread_ts: None,
            files: None,
            raw: Map::new(),
        }
    }

    /// Create a message that belongs to the thread rooted at `thread_ts`
    pub fn in_thread(ts: impl Into<String>, thread_ts: impl Into<String>) -> Self {
        Self {
            thread_ts: Some(thread_ts.into()),
            ..Self::new(ts)
        }
    }

    pub fn with_files(mut self, files: Vec<Attachment>) -> Self {
        self.files = Some(files);
        self
    }

    /// A message anchors a thread when its thread reference points at itself
    pub fn is_thread_root(&self) -> bool {
        self.thread_ts.as_deref() == Some(self.ts.as_str())
    }

    pub fn attachments(&self) -> &[Attachment] {
        self.files.as_deref().unwrap_or_default()
    }

    /// Calendar day (UTC, `YYYY-MM-DD`) the message was posted on
    ///
    /// Returns `None` when `ts` is not a decimal timestamp.
    pub fn day(&self) -> Option<String> {
        let secs: i64 = self.ts.split('.').next()?.parse().ok()?;
        DateTime::from_timestamp(secs, 0).map(|dt| dt.format("%Y-%m-%d").to_string())
    }
}

/// Sort messages by timestamp, oldest first
pub fn sort_messages(mut messages: Vec<Message>) -> Vec<Message> {
    messages.sort_by(|a, b| a.ts.cmp(&b.ts));
    messages
}

/// A file shared in a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_private: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(flatten)]
    pub raw: Map<String, Value>,
}

impl Attachment {
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
            url_private: Some(url.into()),
            mode: Some("hosted".to_string()),
            raw: Map::new(),
        }
    }

    pub fn tombstone(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            url_private: None,
            mode: Some(TOMBSTONE_MODE.to_string()),
            raw: Map::new(),
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.mode.as_deref() == Some(TOMBSTONE_MODE)
    }

    /// Local file name: `<id>_<name>`, or just the id for unnamed files
    pub fn file_name(&self) -> String {
        match &self.name {
            Some(name) => format!("{}_{}", self.id, name),
            None => self.id.clone(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}
