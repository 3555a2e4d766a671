//! Configuration file helpers for the Slack exporter
//!
//! Resolves and reads files from the exporter's config directory
//! (~/.config/slack-export/).
//!
//! Call [`init`] at application startup to bootstrap the config directory.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Name of the directory under the platform config dir
const APP_DIR: &str = "slack-export";

/// Initialize the exporter config directory.
///
/// Creates ~/.config/slack-export/ if it doesn't exist.
pub fn init() -> Result<PathBuf> {
    ensure_config_dir()
}

/// Get the exporter config directory (~/.config/slack-export/)
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_DIR))
}

/// Get the path to a file within the config directory
pub fn config_path(filename: &str) -> Option<PathBuf> {
    config_dir().map(|p| p.join(filename))
}

/// Load and parse a JSON file from the config directory
pub fn load_json<T: DeserializeOwned>(filename: &str) -> Result<T> {
    let path = config_path(filename).context("Could not determine config directory")?;
    load_json_file(&path)
}

/// Load and parse a JSON file from an arbitrary path
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Check if a file exists in the config directory
pub fn config_exists(filename: &str) -> bool {
    config_path(filename).is_some_and(|p| p.exists())
}

/// Ensure the config directory exists
pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir().context("Could not determine config directory")?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir() {
        let dir = config_dir();
        assert!(dir.is_some());
        assert!(dir.unwrap().ends_with("slack-export"));
    }

    #[test]
    fn test_config_path() {
        let path = config_path("config.json");
        assert!(path.is_some());
        assert!(path.unwrap().ends_with("slack-export/config.json"));
    }

    #[test]
    fn test_load_json_file() {
        let dir = std::env::temp_dir().join(format!("slack-export-cfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sample.json");
        std::fs::write(&path, r#"{"value": 42}"#).unwrap();

        let parsed: serde_json::Value = load_json_file(&path).unwrap();
        assert_eq!(parsed["value"], 42);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_json_file_missing() {
        let result: Result<serde_json::Value> =
            load_json_file(Path::new("/nonexistent/slack-export/none.json"));
        assert!(result.is_err());
    }
}
