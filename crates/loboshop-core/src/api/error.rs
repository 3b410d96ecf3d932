//! Structured API errors.

use std::fmt;

use serde_json::Value;

use crate::storage::StorageError;

/// Message used when no response was received.
pub const CONNECTION_ERROR_MESSAGE: &str = "Connection error";

/// Categories of API errors for consistent handling by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// No response received (DNS, connect, reset).
    Transport,
    /// The request exceeded its timeout.
    Timeout,
    /// HTTP 401.
    Unauthorized,
    /// The server answered but refused the operation (`success: false`, 403).
    Rejected,
    /// Any other non-2xx status.
    HttpStatus,
    /// The response body could not be decoded.
    Parse,
    /// The local store failed while persisting or reading session data.
    Storage,
    /// The request could not be built from the given input.
    InvalidInput,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApiErrorKind::Transport => "transport",
            ApiErrorKind::Timeout => "timeout",
            ApiErrorKind::Unauthorized => "unauthorized",
            ApiErrorKind::Rejected => "rejected",
            ApiErrorKind::HttpStatus => "http_status",
            ApiErrorKind::Parse => "parse",
            ApiErrorKind::Storage => "storage",
            ApiErrorKind::InvalidInput => "invalid_input",
        };
        f.write_str(name)
    }
}

/// Error returned by API and session operations.
///
/// `message` is a one-line, human-readable summary. When the server sent a
/// `message` field, that text is used verbatim.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
    /// HTTP status, when a response was received.
    pub status: Option<u16>,
    /// Raw body or underlying error text, for logs.
    pub details: Option<String>,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            details: None,
        }
    }

    /// Maps a reqwest send/receive failure.
    pub fn transport(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ApiErrorKind::Timeout
        } else {
            ApiErrorKind::Transport
        };
        Self {
            kind,
            message: CONNECTION_ERROR_MESSAGE.to_string(),
            status: None,
            details: Some(err.to_string()),
        }
    }

    /// Builds the error for a non-2xx response.
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = match status {
            401 => ApiErrorKind::Unauthorized,
            403 => ApiErrorKind::Rejected,
            _ => ApiErrorKind::HttpStatus,
        };
        let message = server_message(body).unwrap_or_else(|| format!("HTTP {status}"));
        Self {
            kind,
            message,
            status: Some(status),
            details: (!body.is_empty()).then(|| body.to_string()),
        }
    }

    /// The server answered 2xx with `success: false`.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Rejected, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Parse, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::InvalidInput, message)
    }

    /// True when the server refused the credentials or token.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self.kind, ApiErrorKind::Unauthorized | ApiErrorKind::Rejected)
    }

    /// True when no response was received.
    pub fn is_transport(&self) -> bool {
        matches!(self.kind, ApiErrorKind::Transport | ApiErrorKind::Timeout)
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        Self::new(ApiErrorKind::Storage, err.to_string())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ApiError {}

/// Extracts the server's `message` (or `error`) string from a JSON body.
pub fn server_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    value_message(&json)
}

pub(crate) fn value_message(json: &Value) -> Option<String> {
    ["message", "error"]
        .iter()
        .find_map(|key| json.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}
