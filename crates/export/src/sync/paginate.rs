//! Cursor-driven listing

use std::time::Duration;

use log::debug;

use super::invoker::{RateLimitedInvoker, RetryError};
use crate::slack::{ApiError, Page};

/// Fetch every page of a cursor-paginated listing
///
/// Starts without a cursor and follows `next_cursor` until it is absent or
/// empty, concatenating pages in request order. `pacing` is slept between
/// pages (not after the last one). Each page goes through `invoker`, so
/// throttled pages are retried in place.
pub fn fetch_all<T, F>(
    invoker: &RateLimitedInvoker<'_>,
    name: &str,
    pacing: Duration,
    mut fetch: F,
) -> Result<Vec<T>, RetryError>
where
    F: FnMut(Option<&str>) -> Result<Page<T>, ApiError>,
{
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        debug!("Call {} (cursor: {:?})", name, cursor);
        let page = invoker.invoke(name, || fetch(cursor.as_deref()))?;
        items.extend(page.items);

        match page.next_cursor.filter(|c| !c.is_empty()) {
            Some(next) => {
                debug!("  next cursor: {}", next);
                debug!("Waiting {:?} before next {} call", pacing, name);
                invoker.sleeper().sleep(pacing);
                cursor = Some(next);
            }
            None => break,
        }
    }

    Ok(items)
}
