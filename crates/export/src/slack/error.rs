//! Error types for remote calls

/// Seconds to wait when a throttled response carries no hint
pub const DEFAULT_RETRY_AFTER_SECS: f64 = 60.0;

/// Wait suggestion attached to a throttled response
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RetryHint {
    /// `Retry-After` header value, in seconds
    pub header: Option<f64>,
    /// `retry_after` field of the error payload, in seconds
    pub payload: Option<f64>,
}

impl RetryHint {
    pub fn from_header(secs: f64) -> Self {
        Self {
            header: Some(secs),
            payload: None,
        }
    }

    pub fn from_payload(secs: f64) -> Self {
        Self {
            header: None,
            payload: Some(secs),
        }
    }

    /// Seconds to wait: the header wins over the payload, 60s when neither is set
    pub fn wait_secs(&self) -> f64 {
        self.header
            .or(self.payload)
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
    }
}

/// Outcome of a failed remote call
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// The remote asked us to slow down
    #[error("rate limited (retry after {}s)", .0.wait_secs())]
    Throttled(RetryHint),

    /// Connection failure, timeout or unreadable response stream
    #[error("transport error: {0}")]
    Transport(String),

    /// Any other failure reported by the remote
    #[error("remote error{}: {detail}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    Remote { status: Option<u16>, detail: String },
}

impl ApiError {
    pub fn remote(detail: impl Into<String>) -> Self {
        Self::Remote {
            status: None,
            detail: detail.into(),
        }
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, ApiError::Throttled(_))
    }
}

/// Network-level failure while downloading a file
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_hint_precedence() {
        let hint = RetryHint {
            header: Some(5.0),
            payload: Some(30.0),
        };
        assert_eq!(hint.wait_secs(), 5.0);
        assert_eq!(RetryHint::from_payload(30.0).wait_secs(), 30.0);
        assert_eq!(RetryHint::default().wait_secs(), 60.0);
    }

    #[test]
    fn test_error_messages() {
        let err = ApiError::Remote {
            status: Some(404),
            detail: "channel_not_found".to_string(),
        };
        assert_eq!(err.to_string(), "remote error (HTTP 404): channel_not_found");
        assert_eq!(ApiError::remote("invalid_auth").to_string(), "remote error: invalid_auth");
        assert_eq!(
            ApiError::Throttled(RetryHint::from_header(3.0)).to_string(),
            "rate limited (retry after 3s)"
        );
    }
}
