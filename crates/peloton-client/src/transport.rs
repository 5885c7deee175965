//! Adapter from the HTTP client's failure shapes to a neutral struct
//!
//! This is the only place that inspects `reqwest::Error` or raw responses.
//! Everything downstream (classifier, refresh path, fallback engine) sees a
//! `TransportError`.
//!
//! Timeouts are reported through `timed_out` and are *not* flagged as
//! `network`, so the classifier can tell them apart.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    /// HTTP status when the server answered
    pub status: Option<u16>,
    /// No connectivity or the request never produced a response
    pub network: bool,
    pub timed_out: bool,
    pub message: String,
    /// Raw response body for non-2xx answers
    pub body: Option<String>,
}

impl TransportError {
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        let timed_out = error.is_timeout();
        let status = error.status().map(|s| s.as_u16());
        let network = !timed_out
            && status.is_none()
            && (error.is_connect() || error.is_request() || error.is_body());
        Self {
            status,
            network,
            timed_out,
            message: error.to_string(),
            body: None,
        }
    }

    /// A non-2xx answer. The message prefers the server's own error text.
    pub fn from_status(status: u16, body: String) -> Self {
        let detail = server_message(&body).unwrap_or_else(|| reason_phrase(status).to_string());
        Self {
            status: Some(status),
            network: false,
            timed_out: false,
            message: format!("HTTP {status}: {detail}"),
            body: (!body.is_empty()).then_some(body),
        }
    }

    /// A 2xx answer whose body was not valid JSON.
    pub fn decode(detail: impl std::fmt::Display) -> Self {
        Self {
            status: None,
            network: false,
            timed_out: false,
            message: format!("invalid JSON response: {detail}"),
            body: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: None,
            network: true,
            timed_out: false,
            message: message.into(),
            body: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            status: None,
            network: false,
            timed_out: true,
            message: message.into(),
            body: None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(401)
    }
}

/// Pull a human-readable message out of common JSON error envelopes:
/// `{"message": ..}`, `{"error": ".."}`, `{"error": {"message": ..}}`.
fn server_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    let candidate = json
        .get("message")
        .or_else(|| json.get("error").and_then(|e| e.get("message")))
        .or_else(|| json.get("error"))?;
    candidate.as_str().map(str::to_string)
}

fn reason_phrase(status: u16) -> &'static str {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("unexpected status")
}
