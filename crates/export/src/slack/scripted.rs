//! Scripted API implementation
//!
//! Replays queued responses per endpoint and records every call. Used by the
//! test suites to drive the sync engine without a network.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::{ApiError, FileResponse, FileTransport, Page, SlackApi, TransportError};
use crate::models::{Channel, Message, User};

type Script<T> = VecDeque<Result<Page<T>, ApiError>>;

/// A remote call as observed by [`ScriptedApi`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    ListUsers {
        cursor: Option<String>,
    },
    ListConversations {
        cursor: Option<String>,
    },
    History {
        channel: String,
        cursor: Option<String>,
    },
    Replies {
        channel: String,
        thread_ts: String,
        cursor: Option<String>,
    },
}

/// In-memory [`SlackApi`] answering from per-endpoint queues
///
/// An endpoint with an empty queue answers with a remote error, so an
/// unexpected call fails the run instead of hanging.
#[derive(Default)]
pub struct ScriptedApi {
    users: Mutex<Script<User>>,
    conversations: Mutex<Script<Channel>>,
    history: Mutex<HashMap<String, Script<Message>>>,
    replies: Mutex<HashMap<(String, String), Script<Message>>>,
    calls: Mutex<Vec<ApiCall>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_users(&self, response: Result<Page<User>, ApiError>) -> &Self {
        self.users.lock().unwrap().push_back(response);
        self
    }

    pub fn push_conversations(&self, response: Result<Page<Channel>, ApiError>) -> &Self {
        self.conversations.lock().unwrap().push_back(response);
        self
    }

    pub fn push_history(&self, channel: &str, response: Result<Page<Message>, ApiError>) -> &Self {
        self.history
            .lock()
            .unwrap()
            .entry(channel.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn push_replies(
        &self,
        channel: &str,
        thread_ts: &str,
        response: Result<Page<Message>, ApiError>,
    ) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .entry((channel.to_string(), thread_ts.to_string()))
            .or_default()
            .push_back(response);
        self
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Calls that touched the given channel's history or replies
    pub fn calls_for_channel(&self, channel_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| match call {
                ApiCall::History { channel, .. } | ApiCall::Replies { channel, .. } => {
                    channel == channel_id
                }
                _ => false,
            })
            .count()
    }

    fn record(&self, call: ApiCall) {
        self.calls.lock().unwrap().push(call);
    }
}

fn next<T>(queue: Option<&mut Script<T>>, what: &str) -> Result<Page<T>, ApiError> {
    queue
        .and_then(|q| q.pop_front())
        .unwrap_or_else(|| Err(ApiError::remote(format!("no scripted response for {}", what))))
}

fn owned(cursor: Option<&str>) -> Option<String> {
    cursor.map(str::to_string)
}

impl SlackApi for ScriptedApi {
    fn list_users(&self, cursor: Option<&str>) -> Result<Page<User>, ApiError> {
        self.record(ApiCall::ListUsers {
            cursor: owned(cursor),
        });
        let mut users = self.users.lock().unwrap();
        next(Some(&mut *users), "users.list")
    }

    fn list_conversations(&self, cursor: Option<&str>) -> Result<Page<Channel>, ApiError> {
        self.record(ApiCall::ListConversations {
            cursor: owned(cursor),
        });
        let mut conversations = self.conversations.lock().unwrap();
        next(Some(&mut *conversations), "conversations.list")
    }

    fn conversation_history(
        &self,
        channel_id: &str,
        cursor: Option<&str>,
    ) -> Result<Page<Message>, ApiError> {
        self.record(ApiCall::History {
            channel: channel_id.to_string(),
            cursor: owned(cursor),
        });
        let mut history = self.history.lock().unwrap();
        next(history.get_mut(channel_id), "conversations.history")
    }

    fn conversation_replies(
        &self,
        channel_id: &str,
        thread_ts: &str,
        cursor: Option<&str>,
    ) -> Result<Page<Message>, ApiError> {
        self.record(ApiCall::Replies {
            channel: channel_id.to_string(),
            thread_ts: thread_ts.to_string(),
            cursor: owned(cursor),
        });
        let mut replies = self.replies.lock().unwrap();
        next(
            replies.get_mut(&(channel_id.to_string(), thread_ts.to_string())),
            "conversations.replies",
        )
    }
}

/// In-memory [`FileTransport`] answering from per-URL queues
///
/// A URL with an empty queue answers with HTTP 404.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<HashMap<String, VecDeque<Result<FileResponse, TransportError>>>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, url: &str, response: Result<FileResponse, TransportError>) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
        self
    }

    /// URLs requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl FileTransport for ScriptedTransport {
    fn get(&self, url: &str, _token: &str) -> Result<FileResponse, TransportError> {
        self.requests.lock().unwrap().push(url.to_string());
        self.responses
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| Ok(FileResponse::status(404)))
    }
}
