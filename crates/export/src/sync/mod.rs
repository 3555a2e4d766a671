//! Sync engine for exporting a workspace
//!
//! Every remote call goes through a [`RateLimitedInvoker`] and every wait
//! through a [`Sleeper`]. Progress is checkpointed so runs can be resumed.

mod engine;
mod files;
mod invoker;
mod paginate;
mod threads;
pub mod timing;

pub use engine::{ExportStats, Exporter, SessionMode};
pub use files::{DownloadError, FileRetriever, downloadable_attachments};
pub use invoker::{RateLimitedInvoker, RetryError};
pub use paginate::fetch_all;
pub use threads::merge_thread_replies;
pub use timing::{RecordingSleeper, Sleeper, ThreadSleeper};
