//! Outgoing request interceptors
//!
//! Defines the `RequestInterceptor` trait that decouples the API client from
//! how requests are decorated. The client runs its interceptors in order
//! before every dispatch (including replays after a token refresh):
//! - `StaticHeaders` injects configured default headers
//! - `RequestIdInterceptor` stamps a per-request correlation id
//! - `BearerInterceptor` attaches the current access token
//!
//! Interceptors may fail, but `apply_all` never does: a failing interceptor is
//! logged and skipped so the request still goes out.

pub mod bearer;
pub mod static_headers;

pub use bearer::BearerInterceptor;
pub use static_headers::{HeaderInjection, StaticHeaders};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::warn;

/// Header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Errors from a single interceptor.
#[derive(Debug, thiserror::Error)]
pub enum InterceptorError {
    #[error("token unavailable: {0}")]
    Token(String),

    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },
}

/// Result alias for interceptor operations.
pub type Result<T> = std::result::Result<T, InterceptorError>;

/// Decorates an outgoing request's headers.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn RequestInterceptor>`).
pub trait RequestInterceptor: Send + Sync {
    /// Identifier for logging (e.g. "bearer", "static_headers")
    fn id(&self) -> &str;

    fn prepare_request<'a>(
        &'a self,
        headers: &'a mut HeaderMap,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Run every interceptor in order. Failures are logged and skipped.
pub async fn apply_all(interceptors: &[Arc<dyn RequestInterceptor>], headers: &mut HeaderMap) {
    for interceptor in interceptors {
        if let Err(e) = interceptor.prepare_request(headers).await {
            warn!(interceptor = interceptor.id(), error = %e, "interceptor failed, continuing");
        }
    }
}

/// Stamps each request with a fresh UUID v4 `x-request-id`.
///
/// An id already present (e.g. propagated by the caller) is kept.
pub struct RequestIdInterceptor;

impl RequestInterceptor for RequestIdInterceptor {
    fn id(&self) -> &str {
        "request_id"
    }

    fn prepare_request<'a>(
        &'a self,
        headers: &'a mut HeaderMap,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if !headers.contains_key(REQUEST_ID_HEADER) {
                let id = format!("req_{}", uuid::Uuid::new_v4().simple());
                let value = HeaderValue::from_str(&id).map_err(|e| InterceptorError::InvalidHeader {
                    name: REQUEST_ID_HEADER.into(),
                    reason: e.to_string(),
                })?;
                headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
            }
            Ok(())
        })
    }
}
