//! Slack Web API HTTP client
//!
//! Implements [`SlackApi`] and [`FileTransport`] over HTTPS.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use serde::de::DeserializeOwned;
use ureq::http::HeaderMap;
use ureq::{Agent, ResponseExt};
use url::Url;

use super::api::ListResponse;
use super::{ApiError, FileResponse, FileTransport, Page, RetryHint, SlackApi, TransportError};
use crate::config::ExportConfig;
use crate::models::{Channel, Message, User};

/// Slack Web API client
///
/// Non-2xx statuses are returned as responses rather than transport errors so
/// throttling (HTTP 429) can be told apart from everything else.
pub struct SlackClient {
    api: Agent,
    files: Agent,
    token: String,
    history_limit: u32,
}

impl SlackClient {
    /// Slack Web API base URL
    const BASE_URL: &'static str = "https://slack.com/api";

    /// Page size for users and conversations listings
    const LIST_LIMIT: u32 = 200;

    /// Every conversation type the token can see
    const CONVERSATION_TYPES: &'static str = "public_channel,private_channel,mpim,im";

    /// Create a client using the credential and limits from `config`
    pub fn new(config: &ExportConfig) -> Self {
        let api = Agent::new_with_config(
            Agent::config_builder()
                .http_status_as_error(false)
                .timeout_connect(Some(config.connect_timeout()))
                .timeout_recv_response(Some(config.read_timeout()))
                .timeout_recv_body(Some(config.read_timeout()))
                .build(),
        );

        let files = Agent::new_with_config(
            Agent::config_builder()
                .http_status_as_error(false)
                .save_redirect_history(true)
                .timeout_connect(Some(config.connect_timeout()))
                .timeout_recv_response(Some(config.read_timeout()))
                .timeout_recv_body(Some(config.read_timeout()))
                .build(),
        );

        Self {
            api,
            files,
            token: config.token().to_string(),
            history_limit: config.history_page_limit(),
        }
    }

    /// Call a listing method and return one page
    fn list<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, &str)],
        cursor: Option<&str>,
    ) -> Result<Page<T>, ApiError> {
        let mut query = params.to_vec();
        if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
            query.push(("cursor", cursor));
        }

        let url = Url::parse_with_params(&format!("{}/{}", Self::BASE_URL, method), &query)
            .map_err(|e| ApiError::remote(format!("invalid URL for {}: {}", method, e)))?;

        let mut response = self
            .api
            .get(url.as_str())
            .header("Authorization", &format!("Bearer {}", self.token))
            .call()
            .map_err(|e| ApiError::Transport(format!("{} request failed: {}", method, e)))?;

        let status = response.status().as_u16();
        let header_retry = retry_after_header(response.headers());

        if status == 429 {
            return Err(ApiError::Throttled(RetryHint {
                header: header_retry,
                payload: None,
            }));
        }
        if !(200..300).contains(&status) {
            return Err(ApiError::Remote {
                status: Some(status),
                detail: format!("{} returned HTTP {}", method, status),
            });
        }

        let body: ListResponse<T> = response.body_mut().read_json().map_err(|e| match e {
            ureq::Error::Io(_) | ureq::Error::Timeout(_) => {
                ApiError::Transport(format!("{} response interrupted: {}", method, e))
            }
            _ => ApiError::remote(format!("Failed to parse {} response: {}", method, e)),
        })?;

        into_page(body, header_retry)
    }
}

impl SlackApi for SlackClient {
    fn list_users(&self, cursor: Option<&str>) -> Result<Page<User>, ApiError> {
        let limit = Self::LIST_LIMIT.to_string();
        self.list("users.list", &[("limit", limit.as_str())], cursor)
    }

    fn list_conversations(&self, cursor: Option<&str>) -> Result<Page<Channel>, ApiError> {
        let limit = Self::LIST_LIMIT.to_string();
        self.list(
            "conversations.list",
            &[
                ("types", Self::CONVERSATION_TYPES),
                ("limit", limit.as_str()),
            ],
            cursor,
        )
    }

    fn conversation_history(
        &self,
        channel_id: &str,
        cursor: Option<&str>,
    ) -> Result<Page<Message>, ApiError> {
        let limit = self.history_limit.to_string();
        self.list(
            "conversations.history",
            &[("channel", channel_id), ("limit", limit.as_str())],
            cursor,
        )
    }

    fn conversation_replies(
        &self,
        channel_id: &str,
        thread_ts: &str,
        cursor: Option<&str>,
    ) -> Result<Page<Message>, ApiError> {
        let limit = self.history_limit.to_string();
        self.list(
            "conversations.replies",
            &[
                ("channel", channel_id),
                ("ts", thread_ts),
                ("limit", limit.as_str()),
            ],
            cursor,
        )
    }
}

impl FileTransport for SlackClient {
    fn get(&self, url: &str, token: &str) -> Result<FileResponse, TransportError> {
        let mut response = self
            .files
            .get(url)
            .header("Authorization", &format!("Bearer {}", token))
            .call()
            .map_err(|e| TransportError(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let redirects = response
            .get_redirect_history()
            .map(|history| history.iter().map(|uri| uri.to_string()).collect())
            .unwrap_or_default();
        let final_url = Some(response.get_uri().to_string());

        // Only successful bodies are worth reading; files may exceed the default cap
        let body = if status == 200 {
            response
                .body_mut()
                .with_config()
                .limit(u64::MAX)
                .read_to_vec()
                .map_err(|e| TransportError(format!("Failed to read file body: {}", e)))?
        } else {
            Vec::new()
        };

        Ok(FileResponse {
            status,
            headers,
            body,
            redirects,
            final_url,
        })
    }
}

/// Turn a decoded listing envelope into a page or a classified error
fn into_page<T>(body: ListResponse<T>, header_retry: Option<f64>) -> Result<Page<T>, ApiError> {
    if !body.ok {
        let error = body.error.unwrap_or_else(|| "unknown_error".to_string());
        if error == "ratelimited" {
            return Err(ApiError::Throttled(RetryHint {
                header: header_retry,
                payload: body.retry_after,
            }));
        }
        return Err(ApiError::remote(error));
    }

    let next_cursor = body.next_cursor();
    Ok(Page {
        items: body.items,
        next_cursor,
    })
}

fn retry_after_header(headers: &HeaderMap) -> Option<f64> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
