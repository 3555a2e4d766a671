//! Export orchestration
//!
//! Drives a session through its stages:
//! users, channels, then every channel's messages and files, then archival.
//! The checkpoint is saved after every stage and after every channel, so an
//! interrupted run continues from the first unfinished channel.

use std::time::Instant;

use anyhow::{Context, Result, bail};
use chrono::Local;
use log::{debug, error, info, warn};

use super::files::{FileRetriever, downloadable_attachments};
use super::invoker::RateLimitedInvoker;
use super::paginate::fetch_all;
use super::threads::merge_thread_replies;
use super::timing::Sleeper;
use crate::config::ExportConfig;
use crate::models::{Channel, Message, SyncSession, SyncStage, User, sort_messages};
use crate::slack::{FileTransport, SlackApi};
use crate::storage::{Archiver, CheckpointStore, ExportWriter};

/// Which session a run works on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMode {
    /// Start a new session named after the current time
    New,
    /// Resume the most recently checkpointed session
    Latest,
    /// Resume a specific session
    Resume(String),
}

/// Statistics from an export run
#[derive(Debug, Default, Clone)]
pub struct ExportStats {
    pub session_id: String,
    /// Number of users in the export
    pub users: usize,
    /// Number of channels in the export
    pub channels: usize,
    /// Channels skipped because an earlier run completed them
    pub channels_skipped: usize,
    /// Messages written, thread replies included
    pub messages: usize,
    pub files_downloaded: usize,
    /// Attachments that could not be downloaded
    pub files_failed: usize,
    /// Deleted attachments and attachments without a URL
    pub files_skipped: usize,
    /// Duration of the run
    pub duration_ms: u64,
}

/// Runs export sessions against injected collaborators
pub struct Exporter<'a> {
    config: &'a ExportConfig,
    api: &'a dyn SlackApi,
    checkpoints: &'a dyn CheckpointStore,
    writer: &'a dyn ExportWriter,
    archiver: &'a dyn Archiver,
    sleeper: &'a dyn Sleeper,
    invoker: RateLimitedInvoker<'a>,
    files: FileRetriever<'a>,
}

impl<'a> Exporter<'a> {
    pub fn new(
        config: &'a ExportConfig,
        api: &'a dyn SlackApi,
        transport: &'a dyn FileTransport,
        checkpoints: &'a dyn CheckpointStore,
        writer: &'a dyn ExportWriter,
        archiver: &'a dyn Archiver,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            config,
            api,
            checkpoints,
            writer,
            archiver,
            sleeper,
            invoker: RateLimitedInvoker::new(sleeper, config.max_rate_limit_retries),
            files: FileRetriever::new(transport, sleeper, config.max_rate_limit_retries),
        }
    }

    /// Run one session to completion
    ///
    /// A session that was already archived returns at once without any
    /// remote call. On error the checkpoint reflects every channel that
    /// finished, so the same session can be resumed.
    pub fn run(&self, mode: SessionMode) -> Result<ExportStats> {
        let start = Instant::now();
        let mut session = self.open_session(mode)?;
        let mut stats = ExportStats {
            session_id: session.id.clone(),
            ..Default::default()
        };

        if session.record.is_empty() && self.archiver.is_archived(&session.id) {
            info!("Session {} is already archived, nothing to do", session.id);
            stats.duration_ms = start.elapsed().as_millis() as u64;
            return Ok(stats);
        }

        if session.record.has_reached(SyncStage::Complete) {
            info!("Session {} finished exporting earlier", session.id);
        } else {
            self.export(&mut session, &mut stats)?;
        }

        // Interrupted between archival and cleanup: the archive is final
        if session.record.has_reached(SyncStage::Complete)
            && self.archiver.is_archived(&session.id)
        {
            info!("Session {} is already archived", session.id);
        } else {
            let archive = self
                .archiver
                .archive(&session.id)
                .context("Failed to archive export")?;
            info!("Export archived to {}", archive.display());
        }
        self.checkpoints.clear(&session.id)?;

        stats.duration_ms = start.elapsed().as_millis() as u64;
        Ok(stats)
    }

    fn open_session(&self, mode: SessionMode) -> Result<SyncSession> {
        let id = match mode {
            SessionMode::New => return Ok(self.start_session()),
            SessionMode::Latest => match self.checkpoints.discover_latest()? {
                Some(id) => id,
                None => bail!("No previous export session found to resume"),
            },
            SessionMode::Resume(id) => id,
        };

        let record = self.checkpoints.load(&id).unwrap_or_else(|e| {
            warn!("Could not read checkpoint of {} ({:#}), starting it over", id, e);
            Default::default()
        });
        info!(
            "Resuming export session {} (stage: {:?}, {} channels complete)",
            id,
            record.stage,
            record.completed_channel_ids.len()
        );
        Ok(SyncSession::resume(id, record))
    }

    fn start_session(&self) -> SyncSession {
        let session = SyncSession::start(Local::now());
        info!("Starting new export session {}", session.id);

        match self.checkpoints.discover_latest() {
            Ok(Some(previous)) if previous != session.id => info!(
                "Found unfinished session {}; run with --resume to continue it",
                previous
            ),
            Ok(_) => {}
            Err(e) => debug!("Could not look for earlier sessions: {:#}", e),
        }

        let delay = self.config.initial_delay();
        info!("Waiting {:?} before the first request...", delay);
        self.sleeper.sleep(delay);
        session
    }

    fn export(&self, session: &mut SyncSession, stats: &mut ExportStats) -> Result<()> {
        let users = self.users(session)?;
        stats.users = users.len();

        let channels = self.channels(session, &users)?;
        stats.channels = channels.len();

        if !session.record.has_reached(SyncStage::Processing) {
            session.record.advance(SyncStage::Processing);
            self.save(session)?;
        }

        for channel in &channels {
            let name = channel.display_name();
            if session.record.is_channel_complete(&channel.id) {
                info!("Skipping already processed channel: {}", name);
                stats.channels_skipped += 1;
                continue;
            }

            if let Err(e) = self.export_channel(&session.id, channel, stats) {
                error!("Error processing channel {}: {:#}", name, e);
                error!("Progress saved. You can resume from this point.");
                return Err(e.context(format!("Failed to export channel {}", name)));
            }

            session.record.mark_channel_complete(channel.id.clone());
            self.save(session)?;
        }

        session.record.advance(SyncStage::Complete);
        self.save(session)?;
        info!("Export of session {} complete", session.id);
        Ok(())
    }

    fn users(&self, session: &mut SyncSession) -> Result<Vec<User>> {
        if session.record.has_reached(SyncStage::UsersFetched) {
            match self.writer.read_users(&session.id) {
                Ok(users) => {
                    info!("Users already fetched, loaded {} from disk", users.len());
                    return Ok(users);
                }
                Err(e) => warn!("Saved users are unreadable ({:#}), fetching again", e),
            }
        }

        info!("Fetching users...");
        let users = fetch_all(&self.invoker, "users.list", self.config.general_wait(), |cursor| {
            self.api.list_users(cursor)
        })
        .context("Failed to fetch users")?;

        self.writer.write_users(&session.id, &users)?;
        session.record.advance(SyncStage::UsersFetched);
        self.save(session)?;
        Ok(users)
    }

    fn channels(&self, session: &mut SyncSession, users: &[User]) -> Result<Vec<Channel>> {
        if session.record.has_reached(SyncStage::ChannelsFetched) {
            match self.writer.read_channels(&session.id) {
                Ok(channels) => {
                    info!("Channels already fetched, loaded {} from disk", channels.len());
                    return Ok(channels);
                }
                Err(e) => warn!("Saved channels are unreadable ({:#}), fetching again", e),
            }
        }

        info!("Fetching channels...");
        let channels: Vec<Channel> = fetch_all(
            &self.invoker,
            "conversations.list",
            self.config.general_wait(),
            |cursor| self.api.list_conversations(cursor),
        )
        .context("Failed to fetch channels")?
        .into_iter()
        .map(|channel| channel.with_resolved_name(users))
        .collect();

        self.writer.write_channels(&session.id, &channels)?;
        session.record.advance(SyncStage::ChannelsFetched);
        self.save(session)?;
        Ok(channels)
    }

    fn export_channel(
        &self,
        session_id: &str,
        channel: &Channel,
        stats: &mut ExportStats,
    ) -> Result<()> {
        let name = channel.display_name();
        let pacing = self.config.history_wait();
        info!("Processing channel: {}", name);

        let history = fetch_all(&self.invoker, "conversations.history", pacing, |cursor| {
            self.api.conversation_history(channel.id.as_str(), cursor)
        })?;
        debug!("Fetched {} messages from {}", history.len(), name);

        let merged =
            merge_thread_replies(self.api, &self.invoker, pacing, channel.id.as_str(), history)?;
        let messages = sort_messages(merged);

        self.writer.write_messages(session_id, name, &messages)?;
        stats.messages += messages.len();
        info!("Saved {} messages from {}", messages.len(), name);

        self.download_files(session_id, name, &messages, stats);
        Ok(())
    }

    /// Download every live attachment of a channel
    ///
    /// A failed download or write is logged and counted, never fatal.
    fn download_files(
        &self,
        session_id: &str,
        channel_name: &str,
        messages: &[Message],
        stats: &mut ExportStats,
    ) {
        let total: usize = messages.iter().map(|m| m.attachments().len()).sum();
        let mut attempted = 0;

        for attachment in downloadable_attachments(messages) {
            attempted += 1;
            // Filtered for a URL above
            let Some(url) = attachment.url_private.as_deref() else {
                continue;
            };

            info!("Downloading file: {}", attachment.display_name());
            match self.files.download(url, self.config.token()) {
                Ok(data) => {
                    match self
                        .writer
                        .write_file(session_id, channel_name, attachment, &data)
                    {
                        Ok(()) => stats.files_downloaded += 1,
                        Err(e) => {
                            error!("Error saving file {}: {:#}", attachment.display_name(), e);
                            stats.files_failed += 1;
                        }
                    }
                }
                Err(e) => {
                    error!("Error downloading file {}: {}", url, e);
                    stats.files_failed += 1;
                }
            }
            self.sleeper.sleep(self.config.general_wait());
        }

        stats.files_skipped += total - attempted;
    }

    fn save(&self, session: &SyncSession) -> Result<()> {
        self.checkpoints
            .save(&session.id, &session.record)
            .context("Failed to save checkpoint")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Attachment, ChannelId, CheckpointRecord};
    use crate::slack::{ApiCall, ApiError, FileResponse, Page, ScriptedApi, ScriptedTransport};
    use crate::storage::{InMemoryArchiver, InMemoryCheckpointStore, InMemoryExportWriter};
    use crate::sync::timing::RecordingSleeper;
    use std::time::Duration;

    struct Harness {
        config: ExportConfig,
        api: ScriptedApi,
        transport: ScriptedTransport,
        checkpoints: InMemoryCheckpointStore,
        writer: InMemoryExportWriter,
        archiver: InMemoryArchiver,
        sleeper: RecordingSleeper,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                config: ExportConfig::default(),
                api: ScriptedApi::new(),
                transport: ScriptedTransport::new(),
                checkpoints: InMemoryCheckpointStore::new(),
                writer: InMemoryExportWriter::new(),
                archiver: InMemoryArchiver::new(),
                sleeper: RecordingSleeper::new(),
            }
        }

        fn run(&self, mode: SessionMode) -> Result<ExportStats> {
            Exporter::new(
                &self.config,
                &self.api,
                &self.transport,
                &self.checkpoints,
                &self.writer,
                &self.archiver,
                &self.sleeper,
            )
            .run(mode)
        }

        fn resume_from(&self, id: &str, record: CheckpointRecord) -> Result<ExportStats> {
            self.checkpoints.save(id, &record).unwrap();
            self.run(SessionMode::Resume(id.to_string()))
        }
    }

    fn record_at(stage: SyncStage) -> CheckpointRecord {
        let mut record = CheckpointRecord::default();
        record.advance(stage);
        record
    }

    #[test]
    fn test_new_session_waits_before_first_request() {
        let h = Harness::new();
        h.api.push_users(Ok(Page::last(vec![])));
        h.api.push_conversations(Ok(Page::last(vec![])));

        let stats = h.run(SessionMode::New).unwrap();

        assert_eq!(h.sleeper.waits(), vec![Duration::from_secs(10)]);
        assert!(h.archiver.is_archived(&stats.session_id));
        assert!(h.checkpoints.get(&stats.session_id).is_none());
    }

    #[test]
    fn test_resume_has_no_initial_delay() {
        let h = Harness::new();
        h.api.push_users(Ok(Page::last(vec![])));
        h.api.push_conversations(Ok(Page::last(vec![])));

        h.resume_from("s1", CheckpointRecord::default()).unwrap();

        assert!(h.sleeper.waits().is_empty());
    }

    #[test]
    fn test_direct_message_named_after_counterpart() {
        let h = Harness::new();
        h.api.push_users(Ok(Page::last(vec![User::new("U1", "Jane")])));
        h.api
            .push_conversations(Ok(Page::last(vec![Channel::direct_message("D1", "U1")])));
        h.api.push_history("D1", Ok(Page::last(vec![Message::new("1.000000")])));

        h.resume_from("s1", CheckpointRecord::default()).unwrap();

        assert_eq!(h.writer.channel_names("s1"), vec!["@Jane".to_string()]);
    }

    #[test]
    fn test_channel_messages_sorted_with_replies() {
        let h = Harness::new();
        h.api.push_users(Ok(Page::last(vec![])));
        h.api
            .push_conversations(Ok(Page::last(vec![Channel::new("C1", "general")])));
        h.api.push_history(
            "C1",
            Ok(Page::last(vec![
                Message::new("3.000000"),
                Message::in_thread("1.000000", "1.000000"),
            ])),
        );
        h.api.push_replies(
            "C1",
            "1.000000",
            Ok(Page::last(vec![
                Message::in_thread("1.000000", "1.000000"),
                Message::in_thread("2.000000", "1.000000"),
            ])),
        );

        let stats = h.resume_from("s1", CheckpointRecord::default()).unwrap();

        let ts: Vec<String> = h
            .writer
            .messages("s1", "general")
            .unwrap()
            .into_iter()
            .map(|m| m.ts)
            .collect();
        assert_eq!(ts, vec!["1.000000", "2.000000", "3.000000"]);
        assert_eq!(stats.messages, 3);
    }

    #[test]
    fn test_file_failures_are_contained() {
        let h = Harness::new();
        h.api.push_users(Ok(Page::last(vec![])));
        h.api
            .push_conversations(Ok(Page::last(vec![Channel::new("C1", "general")])));
        h.api.push_history(
            "C1",
            Ok(Page::last(vec![Message::new("1.000000").with_files(vec![
                Attachment::new("F1", "gone.png", "https://files/gone.png"),
                Attachment::tombstone("F2"),
                Attachment::new("F3", "ok.txt", "https://files/ok.txt"),
            ])])),
        );
        h.transport
            .push("https://files/gone.png", Ok(FileResponse::status(404)))
            .push("https://files/ok.txt", Ok(FileResponse::ok(b"ok".to_vec())));

        let stats = h.resume_from("s1", CheckpointRecord::default()).unwrap();

        assert_eq!(stats.files_downloaded, 1);
        assert_eq!(stats.files_failed, 1);
        assert_eq!(stats.files_skipped, 1);
        assert_eq!(h.writer.file("s1", "F3_ok.txt"), Some(b"ok".to_vec()));
        assert_eq!(
            h.transport.requests(),
            vec!["https://files/gone.png", "https://files/ok.txt"]
        );
        // Access wait after each attempted download
        assert_eq!(h.sleeper.waits(), vec![Duration::from_secs(2); 2]);
    }

    #[test]
    fn test_file_write_failure_is_contained() {
        let h = Harness::new();
        h.writer.fail_file("F1_a.txt");
        h.api.push_users(Ok(Page::last(vec![])));
        h.api
            .push_conversations(Ok(Page::last(vec![Channel::new("C1", "general")])));
        h.api.push_history(
            "C1",
            Ok(Page::last(vec![Message::new("1.000000").with_files(vec![
                Attachment::new("F1", "a.txt", "https://f/1"),
                Attachment::new("F2", "b.txt", "https://f/2"),
            ])])),
        );
        h.transport
            .push("https://f/1", Ok(FileResponse::ok(b"a".to_vec())))
            .push("https://f/2", Ok(FileResponse::ok(b"b".to_vec())));

        let stats = h.resume_from("s1", CheckpointRecord::default()).unwrap();

        assert_eq!(h.transport.requests(), vec!["https://f/1", "https://f/2"]);
        assert_eq!(stats.files_failed, 1);
        assert_eq!(stats.files_downloaded, 1);
        assert_eq!(h.writer.file_count(), 1);
        assert_eq!(h.writer.file("s1", "F2_b.txt"), Some(b"b".to_vec()));
        assert!(h.archiver.is_archived("s1"));
        assert!(h.checkpoints.get("s1").is_none());
    }

    #[test]
    fn test_history_uses_conversation_pacing() {
        let h = Harness::new();
        h.api.push_users(Ok(Page::last(vec![])));
        h.api
            .push_conversations(Ok(Page::last(vec![Channel::new("C1", "general")])));
        h.api
            .push_history("C1", Ok(Page::with_cursor(vec![Message::new("1.000000")], "h1")))
            .push_history("C1", Ok(Page::last(vec![Message::new("2.000000")])));

        h.resume_from("s1", CheckpointRecord::default()).unwrap();

        assert_eq!(h.sleeper.waits(), vec![Duration::from_secs(60)]);
    }

    #[test]
    fn test_checkpoint_advances_through_stages() {
        let h = Harness::new();
        h.api.push_users(Ok(Page::last(vec![])));
        h.api.push_conversations(Ok(Page::last(vec![
            Channel::new("C1", "general"),
            Channel::new("C2", "random"),
        ])));
        h.api.push_history("C1", Ok(Page::last(vec![])));
        h.api
            .push_history("C2", Err(ApiError::remote("channel_not_found")));

        let err = h.resume_from("s1", CheckpointRecord::default()).unwrap_err();

        assert!(format!("{:#}", err).contains("random"));
        let record = h.checkpoints.get("s1").unwrap();
        assert_eq!(record.stage, SyncStage::Processing);
        assert_eq!(record.completed_channel_ids, vec![ChannelId::new("C1")]);
        assert!(!h.archiver.is_archived("s1"));
    }

    #[test]
    fn test_completed_channel_is_skipped() {
        let h = Harness::new();
        h.writer.write_users("s1", &[]).unwrap();
        h.writer
            .write_channels(
                "s1",
                &[Channel::new("C1", "general"), Channel::new("C2", "random")],
            )
            .unwrap();
        h.api.push_history("C2", Ok(Page::last(vec![])));
        let mut record = record_at(SyncStage::Processing);
        record.mark_channel_complete(ChannelId::new("C1"));

        let stats = h.resume_from("s1", record).unwrap();

        assert_eq!(h.api.calls_for_channel("C1"), 0);
        assert_eq!(
            h.api.calls(),
            vec![ApiCall::History {
                channel: "C2".to_string(),
                cursor: None
            }]
        );
        assert_eq!(stats.channels_skipped, 1);
    }

    #[test]
    fn test_lost_users_are_fetched_again() {
        let h = Harness::new();
        h.writer.write_users("s1", &[User::new("U9", "Old")]).unwrap();
        h.writer.drop_users("s1");
        h.api.push_users(Ok(Page::last(vec![User::new("U1", "Jane")])));
        h.api.push_conversations(Ok(Page::last(vec![])));

        let stats = h
            .resume_from("s1", record_at(SyncStage::UsersFetched))
            .unwrap();

        assert_eq!(stats.users, 1);
        assert_eq!(h.api.calls()[0], ApiCall::ListUsers { cursor: None });
    }

    #[test]
    fn test_corrupt_checkpoint_starts_over() {
        let h = Harness::new();
        h.checkpoints.corrupt("s1");
        h.api.push_users(Ok(Page::last(vec![])));
        h.api.push_conversations(Ok(Page::last(vec![])));

        h.run(SessionMode::Resume("s1".to_string())).unwrap();

        assert_eq!(h.api.call_count(), 2);
        assert!(h.archiver.is_archived("s1"));
    }

    #[test]
    fn test_complete_session_only_archives() {
        let h = Harness::new();

        h.resume_from("s1", record_at(SyncStage::Complete)).unwrap();

        assert_eq!(h.api.call_count(), 0);
        assert_eq!(h.archiver.archive_count("s1"), 1);
        assert!(h.checkpoints.get("s1").is_none());
    }

    #[test]
    fn test_archived_complete_session_keeps_archive() {
        let h = Harness::new();
        h.archiver.archive("s1").unwrap();

        let stats = h.resume_from("s1", record_at(SyncStage::Complete)).unwrap();

        assert_eq!(stats.session_id, "s1");
        assert_eq!(h.api.call_count(), 0);
        assert_eq!(h.archiver.archive_count("s1"), 1);
        assert!(h.checkpoints.get("s1").is_none());
    }

    #[test]
    fn test_latest_without_sessions_fails() {
        let h = Harness::new();

        assert!(h.run(SessionMode::Latest).is_err());
        assert_eq!(h.api.call_count(), 0);
    }

    #[test]
    fn test_latest_picks_most_recent_checkpoint() {
        let h = Harness::new();
        h.checkpoints
            .save("old", &record_at(SyncStage::Complete))
            .unwrap();
        h.checkpoints
            .save("new", &record_at(SyncStage::Complete))
            .unwrap();

        let stats = h.run(SessionMode::Latest).unwrap();

        assert_eq!(stats.session_id, "new");
        assert!(h.archiver.is_archived("new"));
        assert!(!h.archiver.is_archived("old"));
    }
}
