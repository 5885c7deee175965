//! Request context shared by the client, the fallback engine and the cache
//!
//! An `ApiRequest` is everything needed to issue a call again later: verb,
//! endpoint, query params and JSON body. Params live in a `BTreeMap` so the
//! cache signature is deterministic regardless of insertion order.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;

use crate::transport::TransportError;

/// Future returned by a re-invocable call.
pub type CallFuture = Pin<Box<dyn Future<Output = Result<Value, TransportError>> + Send>>;

/// A network call that can be issued again (by the retry strategy or a
/// notification's retry action).
pub type Call = Arc<dyn Fn() -> CallFuture + Send + Sync>;

/// Wrap an async closure as a `Call`.
pub fn make_call<F, Fut>(f: F) -> Call
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, TransportError>> + Send + 'static,
{
    Arc::new(move || -> CallFuture { Box::pin(f()) })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub endpoint: String,
    pub params: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            params: BTreeMap::new(),
            body: None,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    pub fn post(endpoint: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, endpoint).with_body(body)
    }

    pub fn patch(endpoint: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PATCH, endpoint).with_body(body)
    }

    pub fn put(endpoint: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, endpoint).with_body(body)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::DELETE, endpoint)
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Whether the call has side effects on the server.
    pub fn is_mutation(&self) -> bool {
        !matches!(self.method, Method::GET | Method::HEAD | Method::OPTIONS)
    }

    /// Deterministic cache/retry key: `endpoint` or `endpoint?k1=v1&k2=v2`
    /// with params in key order.
    pub fn signature(&self) -> String {
        if self.params.is_empty() {
            return self.endpoint.clone();
        }
        let query = self
            .params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{query}", self.endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn signature_is_independent_of_param_order() {
        let a = ApiRequest::get("/cols").param("region", "alps").param("difficulty", 4);
        let b = ApiRequest::get("/cols").param("difficulty", 4).param("region", "alps");
        assert_eq!(a.signature(), "/cols?difficulty=4&region=alps");
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn signature_without_params_is_endpoint() {
        assert_eq!(ApiRequest::get("/cols").signature(), "/cols");
    }

    #[test]
    fn mutation_detection_follows_verb() {
        assert!(!ApiRequest::get("/cols").is_mutation());
        assert!(ApiRequest::patch("/activities/1", json!({})).is_mutation());
        assert!(ApiRequest::delete("/activities/1").is_mutation());
    }
}
