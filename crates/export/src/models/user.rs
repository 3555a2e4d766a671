//! User model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Unique identifier for a workspace user
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A workspace member as returned by `users.list`
///
/// Only the naming fields are inspected; everything else is carried
/// through to the export untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_name: Option<String>,
    #[serde(flatten)]
    pub raw: Map<String, Value>,
}

impl User {
    pub fn new(id: impl Into<String>, real_name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            name: None,
            real_name: Some(real_name.into()),
            raw: Map::new(),
        }
    }

    /// Human name used for direct-message channel titles
    ///
    /// Falls back from `real_name` to the handle and finally the id.
    pub fn display_name(&self) -> &str {
        self.real_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.name.as_deref().filter(|n| !n.is_empty()))
            .unwrap_or(self.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_prefers_real_name() {
        let user: User =
            serde_json::from_str(r#"{"id": "U1", "name": "jane", "real_name": "Jane"}"#).unwrap();
        assert_eq!(user.display_name(), "Jane");
    }

    #[test]
    fn test_display_name_fallbacks() {
        let user: User = serde_json::from_str(r#"{"id": "U1", "name": "jane", "real_name": ""}"#).unwrap();
        assert_eq!(user.display_name(), "jane");

        let user: User = serde_json::from_str(r#"{"id": "U2"}"#).unwrap();
        assert_eq!(user.display_name(), "U2");
    }

    #[test]
    fn test_raw_attributes_survive_serialization() {
        let json = r#"{"id": "U1", "real_name": "Jane", "tz": "Asia/Tokyo", "profile": {"title": "Ops"}}"#;
        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(user.raw["tz"], "Asia/Tokyo");

        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(value["profile"]["title"], "Ops");
        assert_eq!(value["id"], "U1");
    }
}
