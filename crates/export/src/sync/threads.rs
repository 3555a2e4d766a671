//! Thread reply reconciliation

use std::time::Duration;

use log::debug;

use super::invoker::{RateLimitedInvoker, RetryError};
use super::paginate::fetch_all;
use crate::models::Message;
use crate::slack::SlackApi;

/// Merge the replies of every thread in `messages` into the list
///
/// Each thread root (a message whose `thread_ts` equals its own `ts`) gets its
/// own paginated `conversations.replies` walk starting from an empty cursor.
/// The root comes back in the replies too and is dropped, since it is already
/// in `messages`. Output order is unspecified; callers sort afterwards.
pub fn merge_thread_replies(
    api: &dyn SlackApi,
    invoker: &RateLimitedInvoker<'_>,
    pacing: Duration,
    channel_id: &str,
    mut messages: Vec<Message>,
) -> Result<Vec<Message>, RetryError> {
    let roots: Vec<String> = messages
        .iter()
        .filter(|m| m.is_thread_root())
        .map(|m| m.ts.clone())
        .collect();

    for root_ts in roots {
        debug!("Fetching replies of thread {} in {}", root_ts, channel_id);
        let replies = fetch_all(invoker, "conversations.replies", pacing, |cursor| {
            api.conversation_replies(channel_id, &root_ts, cursor)
        })?;

        messages.extend(replies.into_iter().filter(|reply| !reply.is_thread_root()));
    }

    Ok(messages)
}
