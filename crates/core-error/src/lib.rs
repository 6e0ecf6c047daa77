use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InboxError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("not connected: {0}")]
    NotConnected(String),

    #[error("api error: {0}")]
    Api(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl InboxError {
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn not_connected(msg: impl Into<String>) -> Self {
        Self::NotConnected(msg.into())
    }

    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }

    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    /// HTTP status the route layer answers with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Auth(_) | Self::NotConnected(_) => 401,
            Self::InvalidInput(_) => 400,
            Self::NotFound(_) => 404,
            Self::RateLimited(_) => 429,
            Self::Api(_) | Self::Network(_) => 502,
            Self::Parse(_) | Self::Internal(_) => 500,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<&'static str>,
    pub retryable: bool,
}

impl From<&InboxError> for ErrorResponse {
    fn from(err: &InboxError) -> Self {
        let (code, suggestion, retryable) = match err {
            InboxError::Auth(_) => (
                "AUTH_ERROR",
                Some("Reconnect the mailbox via /api/v1/auth/login"),
                false,
            ),
            InboxError::NotConnected(_) => (
                "NOT_CONNECTED",
                Some("Connect a Gmail account via /api/v1/auth/login"),
                false,
            ),
            InboxError::Api(_) => ("API_ERROR", None, false),
            InboxError::RateLimited(_) => (
                "RATE_LIMITED",
                Some("Upstream provider is throttling requests, retry later"),
                true,
            ),
            InboxError::Network(_) => (
                "NETWORK_ERROR",
                Some("Check internet connection and try again"),
                true,
            ),
            InboxError::Parse(_) => ("PARSE_ERROR", None, false),
            InboxError::NotFound(_) => ("NOT_FOUND", None, false),
            InboxError::InvalidInput(_) => ("INVALID_INPUT", None, false),
            InboxError::Internal(_) => ("INTERNAL_ERROR", Some("Unexpected error"), true),
        };
        Self {
            code,
            message: err.to_string(),
            suggestion,
            retryable,
        }
    }
}

impl ErrorResponse {
    pub fn to_compact(&self) -> String {
        let mut parts = vec![format!("[{}] {}", self.code, self.message)];
        if let Some(s) = self.suggestion {
            parts.push(format!("Suggestion: {s}"));
        }
        if self.retryable {
            parts.push("(retryable)".to_string());
        }
        parts.join(" | ")
    }
}
