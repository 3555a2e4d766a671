//! Slack Web API integration
//!
//! This module provides:
//! - The [`SlackApi`] and [`FileTransport`] seams the sync engine calls through
//! - An HTTPS client implementing both over `ureq`
//! - A scripted implementation for tests and dry runs

mod client;
mod error;
mod scripted;

pub use client::SlackClient;
pub use error::{ApiError, DEFAULT_RETRY_AFTER_SECS, RetryHint, TransportError};
pub use scripted::{ApiCall, ScriptedApi, ScriptedTransport};

use crate::models::{Channel, Message, User};

/// One page of a cursor-paginated listing
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Continuation token; `None` or empty means this was the last page
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }

    pub fn with_cursor(items: Vec<T>, cursor: impl Into<String>) -> Self {
        Self {
            items,
            next_cursor: Some(cursor.into()),
        }
    }
}

/// Listing endpoints consumed by the exporter
///
/// Every method fetches a single page. `cursor` is `None` for the first page.
pub trait SlackApi {
    fn list_users(&self, cursor: Option<&str>) -> Result<Page<User>, ApiError>;

    /// All conversation types: public, private, group DMs and DMs
    fn list_conversations(&self, cursor: Option<&str>) -> Result<Page<Channel>, ApiError>;

    fn conversation_history(
        &self,
        channel_id: &str,
        cursor: Option<&str>,
    ) -> Result<Page<Message>, ApiError>;

    /// Replies of the thread rooted at `thread_ts`, including the root itself
    fn conversation_replies(
        &self,
        channel_id: &str,
        thread_ts: &str,
        cursor: Option<&str>,
    ) -> Result<Page<Message>, ApiError>;
}

/// Raw result of an authenticated file GET
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Body bytes; only read for successful responses
    pub body: Vec<u8>,
    /// URLs visited through redirects, in order
    pub redirects: Vec<String>,
    pub final_url: Option<String>,
}

impl FileResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Downloads private files with a bearer credential
pub trait FileTransport {
    fn get(&self, url: &str, token: &str) -> Result<FileResponse, TransportError>;
}

/// Slack Web API response types
pub mod api {
    use serde::Deserialize;

    /// Envelope shared by every listing method
    ///
    /// The item array is named differently per method (`members`, `channels`,
    /// `messages`); all of them land in `items`.
    #[derive(Debug, Deserialize)]
    pub struct ListResponse<T> {
        pub ok: bool,
        pub error: Option<String>,
        /// Present on some `ratelimited` payloads
        pub retry_after: Option<f64>,
        #[serde(default = "Vec::new", alias = "members", alias = "channels", alias = "messages")]
        pub items: Vec<T>,
        pub response_metadata: Option<ResponseMetadata>,
    }

    #[derive(Debug, Deserialize)]
    pub struct ResponseMetadata {
        pub next_cursor: Option<String>,
    }

    impl<T> ListResponse<T> {
        pub fn next_cursor(&self) -> Option<String> {
            self.response_metadata
                .as_ref()
                .and_then(|m| m.next_cursor.clone())
        }
    }
}
