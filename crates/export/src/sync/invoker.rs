//! Rate-limit aware call wrapper

use log::{debug, info, warn};

use super::timing::{Sleeper, retry_ceiling_reached, seconds, throttle_backoff_secs};
use crate::slack::ApiError;

/// Failure of a call made through [`RateLimitedInvoker`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RetryError {
    /// The retry ceiling was reached while still throttled
    #[error("{call}: gave up after {retries} rate-limited retries ({last})")]
    Exhausted {
        call: String,
        retries: u32,
        #[source]
        last: ApiError,
    },

    /// A non-throttle failure, passed through untouched
    #[error("{call}: {source}")]
    Failed {
        call: String,
        #[source]
        source: ApiError,
    },
}

impl RetryError {
    /// The underlying remote error
    pub fn api_error(&self) -> &ApiError {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Failed { source, .. } => source,
        }
    }
}

/// Retries throttled calls until they succeed or the ceiling is reached
///
/// Works with any fallible remote call; successful calls return at once with
/// no extra delay. Pacing between calls is the caller's job.
pub struct RateLimitedInvoker<'a> {
    sleeper: &'a dyn Sleeper,
    max_retries: u32,
}

impl<'a> RateLimitedInvoker<'a> {
    /// `max_retries == 0` retries forever
    pub fn new(sleeper: &'a dyn Sleeper, max_retries: u32) -> Self {
        Self {
            sleeper,
            max_retries,
        }
    }

    pub fn sleeper(&self) -> &'a dyn Sleeper {
        self.sleeper
    }

    /// Run `call`, waiting out throttling responses
    ///
    /// `name` identifies the call in logs and errors.
    pub fn invoke<T, F>(&self, name: &str, mut call: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Result<T, ApiError>,
    {
        let mut retries = 0u32;
        loop {
            let hint = match call() {
                Ok(value) => return Ok(value),
                Err(ApiError::Throttled(hint)) => hint,
                Err(source) => {
                    return Err(RetryError::Failed {
                        call: name.to_string(),
                        source,
                    });
                }
            };

            retries += 1;
            debug!("{} throttled: {:?}", name, hint);

            let mut wait = hint.wait_secs();
            let grown = throttle_backoff_secs(wait, retries);
            if grown != wait {
                info!("Applying exponential backoff: {} seconds", grown);
                wait = grown;
            }

            if retry_ceiling_reached(self.max_retries, retries) {
                log::error!("Reached maximum retry limit ({})", self.max_retries);
                return Err(RetryError::Exhausted {
                    call: name.to_string(),
                    retries,
                    last: ApiError::Throttled(hint),
                });
            }

            warn!(
                "Rate limited on {}. Waiting {} seconds (retry #{})",
                name, wait, retries
            );
            self.sleeper.sleep(seconds(wait));
        }
    }
}
