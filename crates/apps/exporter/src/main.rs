//! slack-export - resumable Slack workspace export
//!
//! Exports users, channels, messages (with thread replies) and files into
//! `<export path>/<session>/`, then zips the session. Interrupted runs can be
//! continued with `--resume`.

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use export::{
    ExportConfig, ExportStats, Exporter, FileCheckpointStore, JsonExportWriter, SessionMode,
    SlackClient, ThreadSleeper, ZipArchiver,
};
use log::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "slack-export", version, about = "Export a Slack workspace to JSON")]
struct Cli {
    /// Resume the most recent unfinished session
    #[arg(long)]
    resume: bool,

    /// Resume a specific session (e.g. 20240131_093000)
    #[arg(long, env = "SLACK_EXPORT_RESUME_TIMESTAMP")]
    session: Option<String>,

    /// Config file (defaults to ~/.config/slack-export/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory that receives the export
    #[arg(long)]
    export_path: Option<PathBuf>,

    /// Authenticate with the bot token instead of the user token
    #[arg(long)]
    bot_token: bool,

    /// The app is distributed through the Slack Marketplace
    #[arg(long)]
    marketplace: bool,

    /// Give up after this many rate-limited retries (0 = never)
    #[arg(long)]
    max_retries: Option<u32>,

    /// Write one messages.json per channel instead of one file per day
    #[arg(long)]
    no_split: bool,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn session_mode(&self) -> SessionMode {
        match (&self.session, self.resume) {
            (Some(id), _) => SessionMode::Resume(id.clone()),
            (None, true) => SessionMode::Latest,
            (None, false) => SessionMode::New,
        }
    }

    fn load_config(&self) -> Result<ExportConfig> {
        let mut config = match &self.config {
            Some(path) => ExportConfig::from_file(path)?,
            None => ExportConfig::load()?,
        };

        if let Some(path) = &self.export_path {
            config.export_base_path = path.clone();
        }
        if self.bot_token {
            config.use_user_token = false;
        }
        if self.marketplace {
            config.is_marketplace_app = true;
        }
        if let Some(max) = self.max_retries {
            config.max_rate_limit_retries = max;
        }
        if self.no_split {
            config.split_message_files = false;
        }
        Ok(config)
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        warn!("Failed to initialize config directory: {}", e);
    }

    match run(&cli) {
        Ok(stats) => log_summary(&stats),
        Err(e) => {
            error!("Export failed: {:#}", e);
            error!("Progress has been preserved. Run again with --resume to continue.");
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<ExportStats> {
    let config = cli.load_config()?;
    if config.token().is_empty() {
        let variable = if config.use_user_token {
            "SLACK_USER_TOKEN"
        } else {
            "SLACK_BOT_TOKEN"
        };
        anyhow::bail!("No Slack token configured; set {} or add it to the config file", variable);
    }

    log_strategy(&config);

    let root = &config.export_base_path;
    let client = SlackClient::new(&config);
    let checkpoints = FileCheckpointStore::new(root);
    let writer = JsonExportWriter::new(root, config.split_message_files);
    let archiver = ZipArchiver::new(root);
    let sleeper = ThreadSleeper;

    Exporter::new(
        &config,
        &client,
        &client,
        &checkpoints,
        &writer,
        &archiver,
        &sleeper,
    )
    .run(cli.session_mode())
    .with_context(|| format!("Export into {} did not finish", root.display()))
}

fn log_strategy(config: &ExportConfig) {
    if config.max_rate_limit_retries == 0 {
        info!("Rate limit strategy: retry indefinitely with backoff");
    } else {
        info!(
            "Rate limit strategy: give up after {} retries",
            config.max_rate_limit_retries
        );
    }

    if config.is_marketplace_app {
        info!(
            "Marketplace app: {} messages per history request",
            config.history_page_limit()
        );
    } else {
        warn!(
            "Non-marketplace app: history and replies are limited to {} messages per request, \
             one request every {:?}",
            config.history_page_limit(),
            config.history_wait()
        );
    }
}

fn log_summary(stats: &ExportStats) {
    info!("Export session {} finished in {}ms", stats.session_id, stats.duration_ms);
    info!(
        "  {} users, {} channels ({} skipped as already exported)",
        stats.users, stats.channels, stats.channels_skipped
    );
    info!("  {} messages", stats.messages);
    info!(
        "  {} files downloaded, {} failed, {} skipped",
        stats.files_downloaded, stats.files_failed, stats.files_skipped
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_mode_from_flags() {
        let cli = Cli::parse_from(["slack-export"]);
        assert_eq!(cli.session_mode(), SessionMode::New);

        let cli = Cli::parse_from(["slack-export", "--resume"]);
        assert_eq!(cli.session_mode(), SessionMode::Latest);

        let cli = Cli::parse_from(["slack-export", "--session", "20240131_093000"]);
        assert_eq!(
            cli.session_mode(),
            SessionMode::Resume("20240131_093000".to_string())
        );
    }

    #[test]
    fn test_flags_override_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"user_token": "xoxp-file", "max_rate_limit_retries": 3}"#)
            .unwrap();

        let cli = Cli::parse_from([
            "slack-export",
            "--config",
            path.to_str().unwrap(),
            "--export-path",
            "/tmp/out",
            "--marketplace",
            "--max-retries",
            "9",
            "--no-split",
        ]);
        let config = cli.load_config().unwrap();

        assert_eq!(config.export_base_path, PathBuf::from("/tmp/out"));
        assert!(config.is_marketplace_app);
        assert_eq!(config.max_rate_limit_retries, 9);
        assert!(!config.split_message_files);
    }
}
