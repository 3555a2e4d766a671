//! Attachment download with backoff

use log::{debug, error, info, warn};

use super::timing::{
    Sleeper, retry_ceiling_reached, seconds, throttle_backoff_secs, transport_backoff_secs,
};
use crate::models::{Attachment, Message};
use crate::slack::{DEFAULT_RETRY_AFTER_SECS, FileResponse, FileTransport, TransportError};

/// Why a download gave up
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DownloadError {
    #[error("gave up after {retries} retries")]
    Exhausted { retries: u32 },

    /// Non-retryable HTTP status
    #[error("HTTP {status} error")]
    Status { status: u16 },

    #[error("network error: {0}")]
    Transport(#[from] TransportError),
}

/// Downloads private files, riding out throttling and flaky connections
pub struct FileRetriever<'a> {
    transport: &'a dyn FileTransport,
    sleeper: &'a dyn Sleeper,
    max_retries: u32,
}

impl<'a> FileRetriever<'a> {
    /// `max_retries == 0` retries forever
    pub fn new(transport: &'a dyn FileTransport, sleeper: &'a dyn Sleeper, max_retries: u32) -> Self {
        Self {
            transport,
            sleeper,
            max_retries,
        }
    }

    /// Fetch the bytes at `url`
    ///
    /// - 200: returns the body
    /// - 429: waits `Retry-After` (default 60s, grown past five retries)
    /// - transport failure: waits 10s, then `min(60 * attempt, 300)` past five
    /// - any other status: fails at once after logging the response
    ///
    /// Throttles and transport failures share one retry counter.
    pub fn download(&self, url: &str, token: &str) -> Result<Vec<u8>, DownloadError> {
        let mut retries = 0u32;
        loop {
            match self.transport.get(url, token) {
                Ok(response) if response.status == 200 => return Ok(response.body),
                Ok(response) if response.status == 429 => {
                    retries += 1;
                    let suggested = response
                        .header("retry-after")
                        .and_then(|v| v.trim().parse::<f64>().ok())
                        .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                    let wait = throttle_backoff_secs(suggested, retries);

                    if retry_ceiling_reached(self.max_retries, retries) {
                        error!("Reached maximum retry limit ({})", self.max_retries);
                        return Err(DownloadError::Exhausted { retries });
                    }

                    warn!(
                        "File download rate limited. Waiting {} seconds (retry #{})",
                        wait, retries
                    );
                    self.sleeper.sleep(seconds(wait));
                }
                Ok(response) => {
                    log_failed_response(url, &response);
                    return Err(DownloadError::Status {
                        status: response.status,
                    });
                }
                Err(e) => {
                    error!("Network error during file download: {}", e);
                    retries += 1;
                    let wait = transport_backoff_secs(retries);

                    if retry_ceiling_reached(self.max_retries, retries) {
                        error!("Reached maximum retry limit ({})", self.max_retries);
                        return Err(DownloadError::Transport(e));
                    }

                    info!(
                        "Retrying download in {} seconds (retry #{})...",
                        wait, retries
                    );
                    self.sleeper.sleep(seconds(wait));
                }
            }
        }
    }
}

fn log_failed_response(url: &str, response: &FileResponse) {
    error!("File download failed with status {}", response.status);
    debug!("    URL: {}", url);
    debug!("    Headers: {:?}", response.headers);
    if !response.redirects.is_empty() {
        debug!("    Redirects: {:?}", response.redirects);
        if let Some(final_url) = &response.final_url {
            debug!("    Final URL: {}", final_url);
        }
    }
}

/// Attachments worth downloading: everything except deleted (tombstoned)
/// files and files without a private URL
pub fn downloadable_attachments(messages: &[Message]) -> impl Iterator<Item = &Attachment> {
    messages
        .iter()
        .flat_map(|m| m.attachments())
        .filter(|a| !a.is_tombstone())
        .filter(|a| {
            if a.url_private.is_none() {
                warn!("Skipping file {} without a private URL", a.id);
                return false;
            }
            true
        })
}
