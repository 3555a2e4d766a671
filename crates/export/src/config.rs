//! Export configuration
//!
//! Settings are resolved in this order, later sources overriding earlier ones:
//! 1. Built-in defaults
//! 2. JSON file (`--config <path>` or ~/.config/slack-export/config.json)
//! 3. Environment variables
//!
//! Command-line flags are applied on top by the binary.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sync::timing::seconds;

/// Config filename in the exporter config directory
const CONFIG_FILE: &str = "config.json";

/// Page size for history/replies calls of marketplace apps
const MARKETPLACE_HISTORY_LIMIT: u32 = 200;
/// Non-marketplace apps get 15 messages per history/replies request
const RESTRICTED_HISTORY_LIMIT: u32 = 15;

/// Everything the export engine needs to know up front
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// User OAuth token (`xoxp-...`)
    pub user_token: String,
    /// Bot OAuth token (`xoxb-...`)
    pub bot_token: String,
    /// Use the user token instead of the bot token
    pub use_user_token: bool,
    /// Seconds between general API calls and file downloads
    pub access_wait_secs: f64,
    /// Seconds between history/replies calls for non-marketplace apps
    pub conversations_access_wait_secs: f64,
    /// Marketplace apps get the higher history/replies tier
    pub is_marketplace_app: bool,
    /// Directory that holds session folders, archives and checkpoints
    pub export_base_path: PathBuf,
    pub connect_timeout_secs: f64,
    pub read_timeout_secs: f64,
    /// Write one message file per day instead of one per channel
    pub split_message_files: bool,
    /// Give up after this many throttled retries; 0 retries forever
    pub max_rate_limit_retries: u32,
    /// Settling delay before the first call of a new session
    pub initial_delay_secs: f64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            user_token: String::new(),
            bot_token: String::new(),
            use_user_token: true,
            access_wait_secs: 2.0,
            conversations_access_wait_secs: 60.0,
            is_marketplace_app: false,
            export_base_path: PathBuf::from("./export"),
            connect_timeout_secs: 3.05,
            read_timeout_secs: 60.0,
            split_message_files: true,
            max_rate_limit_retries: 0,
            initial_delay_secs: 10.0,
        }
    }
}

impl ExportConfig {
    /// Load configuration from the default file (if present) and the environment
    pub fn load() -> Result<Self> {
        let mut config = if config::config_exists(CONFIG_FILE) {
            config::load_json(CONFIG_FILE)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific JSON file, then the environment
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut config: Self = config::load_json_file(path)?;
        config.apply_env();
        Ok(config)
    }

    /// Parse configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse export config JSON")
    }

    fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a variable lookup (normally the process environment)
    ///
    /// Unparseable numeric or boolean values are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("SLACK_USER_TOKEN") {
            self.user_token = token;
        }
        if let Some(token) = lookup("SLACK_BOT_TOKEN") {
            self.bot_token = token;
        }
        if let Some(path) = lookup("SLACK_EXPORT_BASE_PATH") {
            self.export_base_path = PathBuf::from(path);
        }
        if let Some(value) = lookup("SLACK_EXPORT_MARKETPLACE") {
            match parse_bool(&value) {
                Some(flag) => self.is_marketplace_app = flag,
                None => log::warn!("Ignoring SLACK_EXPORT_MARKETPLACE={:?}", value),
            }
        }
        if let Some(value) = lookup("SLACK_EXPORT_MAX_RETRIES") {
            match value.trim().parse() {
                Ok(n) => self.max_rate_limit_retries = n,
                Err(_) => log::warn!("Ignoring SLACK_EXPORT_MAX_RETRIES={:?}", value),
            }
        }
    }

    /// The bearer credential selected by `use_user_token`
    pub fn token(&self) -> &str {
        if self.use_user_token {
            &self.user_token
        } else {
            &self.bot_token
        }
    }

    /// Page size for `conversations.history` and `conversations.replies`
    pub fn history_page_limit(&self) -> u32 {
        if self.is_marketplace_app {
            MARKETPLACE_HISTORY_LIMIT
        } else {
            RESTRICTED_HISTORY_LIMIT
        }
    }

    /// Pacing between general calls (users, channels, downloads)
    pub fn general_wait(&self) -> Duration {
        seconds(self.access_wait_secs)
    }

    /// Pacing between history/replies calls
    pub fn history_wait(&self) -> Duration {
        if self.is_marketplace_app {
            self.general_wait()
        } else {
            seconds(self.conversations_access_wait_secs)
        }
    }

    pub fn initial_delay(&self) -> Duration {
        seconds(self.initial_delay_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        seconds(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        seconds(self.read_timeout_secs)
    }

    /// Get the default config file path (~/.config/slack-export/config.json)
    pub fn default_config_path() -> Option<PathBuf> {
        config::config_path(CONFIG_FILE)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
