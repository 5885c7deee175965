//! Error classification for failed API calls
//!
//! Maps a `TransportError` to a typed `ErrorKind` with a retryable flag. The
//! checks run in a fixed order: connectivity first, then HTTP status, and only
//! then the message text, so a generic error string can never override a
//! concrete status.

use std::fmt;

use serde::Serialize;

use crate::transport::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Server,
    Auth,
    Validation,
    NotFound,
    RateLimit,
    Timeout,
    Unknown,
}

impl ErrorKind {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Server => "server",
            ErrorKind::Auth => "auth",
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Fixed user-facing copy shown by the notify strategy.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::Network => "Unable to reach the server. Check your connection.",
            ErrorKind::Server => "The server ran into a problem. Please try again shortly.",
            ErrorKind::Auth => "You are not allowed to do that. Please sign in again.",
            ErrorKind::Validation => "Some of the submitted information is invalid.",
            ErrorKind::NotFound => "The requested item could not be found.",
            ErrorKind::RateLimit => "Too many requests. Please wait a moment and try again.",
            ErrorKind::Timeout => "The request took too long to complete.",
            ErrorKind::Unknown => "Something went wrong.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying one failed call. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub http_status: Option<u16>,
    pub retryable: bool,
    pub message: String,
}

impl ClassifiedError {
    fn new(kind: ErrorKind, retryable: bool, error: &TransportError) -> Self {
        Self {
            kind,
            http_status: error.status,
            retryable,
            message: error.message.clone(),
        }
    }
}

/// Classify a failed call.
///
/// 401 and 403 both classify as `Auth`; only 401 ever reaches the refresh
/// path (see `ApiClient::send`), a 403 is a terminal authorization failure.
pub fn classify(error: &TransportError) -> ClassifiedError {
    if error.network {
        return ClassifiedError::new(ErrorKind::Network, true, error);
    }

    if let Some(status) = error.status {
        let by_status = match status {
            500.. => Some((ErrorKind::Server, true)),
            401 | 403 => Some((ErrorKind::Auth, false)),
            400 | 422 => Some((ErrorKind::Validation, false)),
            404 => Some((ErrorKind::NotFound, false)),
            429 => Some((ErrorKind::RateLimit, true)),
            _ => None,
        };
        if let Some((kind, retryable)) = by_status {
            return ClassifiedError::new(kind, retryable, error);
        }
    }

    if error.timed_out || error.message.to_lowercase().contains("timeout") {
        return ClassifiedError::new(ErrorKind::Timeout, true, error);
    }

    ClassifiedError::new(ErrorKind::Unknown, true, error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> ClassifiedError {
        classify(&TransportError::from_status(code, String::new()))
    }

    #[test]
    fn network_failure_is_retryable() {
        let c = classify(&TransportError::network("connection refused"));
        assert_eq!(c.kind, ErrorKind::Network);
        assert!(c.retryable);
        assert_eq!(c.http_status, None);
    }

    #[test]
    fn server_errors_are_retryable() {
        for code in [500, 502, 503, 504, 599] {
            let c = status(code);
            assert_eq!(c.kind, ErrorKind::Server, "status {code}");
            assert!(c.retryable);
            assert_eq!(c.http_status, Some(code));
        }
    }

    #[test]
    fn auth_statuses_are_not_retryable() {
        for code in [401, 403] {
            let c = status(code);
            assert_eq!(c.kind, ErrorKind::Auth);
            assert!(!c.retryable);
        }
    }

    #[test]
    fn validation_and_not_found_are_not_retryable() {
        assert_eq!(status(400).kind, ErrorKind::Validation);
        assert_eq!(status(422).kind, ErrorKind::Validation);
        assert!(!status(422).retryable);
        assert_eq!(status(404).kind, ErrorKind::NotFound);
        assert!(!status(404).retryable);
    }

    #[test]
    fn rate_limit_is_retryable() {
        let c = status(429);
        assert_eq!(c.kind, ErrorKind::RateLimit);
        assert!(c.retryable);
    }

    #[test]
    fn timeout_flag_and_message_classify_as_timeout() {
        assert_eq!(
            classify(&TransportError::timeout("operation timed out")).kind,
            ErrorKind::Timeout
        );
        // 408 has no dedicated status rule; its reason phrase mentions timeout
        assert_eq!(status(408).kind, ErrorKind::Timeout);
    }

    #[test]
    fn status_wins_over_message_text() {
        let err = TransportError::from_status(500, r#"{"message":"upstream timeout"}"#.into());
        assert_eq!(classify(&err).kind, ErrorKind::Server);
    }

    #[test]
    fn network_wins_over_message_text() {
        let c = classify(&TransportError::network("dns lookup timeout"));
        assert_eq!(c.kind, ErrorKind::Network);
    }

    #[test]
    fn anything_else_is_unknown_and_retryable() {
        let c = status(418);
        assert_eq!(c.kind, ErrorKind::Unknown);
        assert!(c.retryable);
        assert_eq!(classify(&TransportError::decode("eof")).kind, ErrorKind::Unknown);
    }

    #[test]
    fn display_combines_kind_and_message() {
        let c = status(404);
        assert_eq!(c.to_string(), "not_found error: HTTP 404: Not Found");
    }

    #[test]
    fn kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::RateLimit).unwrap(),
            "\"rate_limit\""
        );
        assert_eq!(ErrorKind::NotFound.to_string(), "not_found");
    }
}
