//! Waiting and backoff arithmetic
//!
//! Every suspension of the engine goes through a [`Sleeper`], so tests can
//! observe the exact schedule without waiting for it.

use std::sync::Mutex;
use std::time::Duration;

/// Retries beyond this count grow the wait exponentially
pub const BACKOFF_THRESHOLD: u32 = 5;
/// Upper bound for any grown wait, in seconds
pub const MAX_BACKOFF_SECS: f64 = 300.0;
/// Fixed wait after the first few transport failures of a download
pub const TRANSPORT_RETRY_SECS: f64 = 10.0;

/// Blocks the calling flow of control
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Records requested waits and returns immediately
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every wait requested so far, in order
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }

    pub fn total(&self) -> Duration {
        self.waits.lock().unwrap().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

/// Wait before retrying a throttled call
///
/// `suggested_secs` is the remote's hint and `retries` counts throttles so
/// far, including the current one. Past [`BACKOFF_THRESHOLD`] the hint is
/// multiplied by `1.5^(retries - 5)` and capped at five minutes, which keeps
/// an endpoint that keeps reporting a too-short hint from spinning.
pub fn throttle_backoff_secs(suggested_secs: f64, retries: u32) -> f64 {
    if retries > BACKOFF_THRESHOLD {
        let growth = 1.5_f64.powi((retries - BACKOFF_THRESHOLD) as i32);
        (suggested_secs * growth).min(MAX_BACKOFF_SECS)
    } else {
        suggested_secs
    }
}

/// Wait before retrying a download after a transport failure
///
/// 10s for the first five attempts, then `min(60 * attempt, 300)`.
pub fn transport_backoff_secs(attempt: u32) -> f64 {
    if attempt > BACKOFF_THRESHOLD {
        (60.0 * attempt as f64).min(MAX_BACKOFF_SECS)
    } else {
        TRANSPORT_RETRY_SECS
    }
}

/// Whether `retries` has hit the configured ceiling (0 means no ceiling)
pub fn retry_ceiling_reached(max_retries: u32, retries: u32) -> bool {
    max_retries > 0 && retries >= max_retries
}

/// Convert fractional seconds to a duration, clamping negatives to zero
pub fn seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}
