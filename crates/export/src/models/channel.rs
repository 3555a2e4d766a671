//! Channel (conversation) model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::User;

/// Unique identifier for a channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A conversation returned by `conversations.list`
///
/// Covers public and private channels, group DMs and direct messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    /// Channel name; absent from the API for direct messages until resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Whether this is a one-to-one direct message
    #[serde(default)]
    pub is_im: bool,
    /// Counterpart user of a direct message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(flatten)]
    pub raw: Map<String, Value>,
}

impl Channel {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ChannelId::new(id),
            name: Some(name.into()),
            is_im: false,
            user: None,
            raw: Map::new(),
        }
    }

    /// Create an unnamed direct-message channel with the given counterpart
    pub fn direct_message(id: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            id: ChannelId::new(id),
            name: None,
            is_im: true,
            user: Some(user.into()),
            raw: Map::new(),
        }
    }

    pub fn is_direct_message(&self) -> bool {
        self.is_im
    }

    /// Name used for logging and export directories
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }

    /// Give a direct message a name from its counterpart user
    ///
    /// The result is `@<display name>`. An unknown counterpart falls back to
    /// `@<user id>`. Non-DM channels are returned unchanged.
    pub fn with_resolved_name(mut self, users: &[User]) -> Self {
        if !self.is_direct_message() {
            return self;
        }

        let counterpart = self.user.clone().unwrap_or_default();
        let name = match users.iter().find(|u| u.id.as_str() == counterpart) {
            Some(user) => user.display_name().to_string(),
            None => {
                log::warn!(
                    "Direct message {} refers to unknown user {:?}",
                    self.id,
                    counterpart
                );
                if counterpart.is_empty() {
                    self.id.0.clone()
                } else {
                    counterpart
                }
            }
        };

        self.name = Some(format!("@{}", name));
        self
    }
}
