//! Static header injection from configuration
//!
//! Adds configured default headers (client identification, accept, feature
//! flags) to every request. The Authorization header is owned by
//! `BearerInterceptor` and is never overwritten from config.

use crate::{RequestInterceptor, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use tracing::warn;

/// Header injection rule (name + value pair from config).
#[derive(Debug, Clone)]
pub struct HeaderInjection {
    pub name: String,
    pub value: String,
}

/// Pre-validated set of headers added to each request.
///
/// Invalid names/values and attempts to set Authorization are dropped with a
/// warning at construction time, so `prepare_request` cannot fail.
pub struct StaticHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl StaticHeaders {
    pub fn new(injections: &[HeaderInjection]) -> Self {
        let mut headers = Vec::with_capacity(injections.len());
        for injection in injections {
            let name = match HeaderName::from_str(&injection.name) {
                Ok(n) => n,
                Err(e) => {
                    warn!(header = %injection.name, error = %e, "skipping invalid header name");
                    continue;
                }
            };
            if name == reqwest::header::AUTHORIZATION {
                warn!(header = %injection.name, "refusing to set authorization header from config");
                continue;
            }
            let value = match HeaderValue::from_str(&injection.value) {
                Ok(v) => v,
                Err(e) => {
                    warn!(header = %injection.name, error = %e, "skipping invalid header value");
                    continue;
                }
            };
            headers.push((name, value));
        }
        Self { headers }
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl RequestInterceptor for StaticHeaders {
    fn id(&self) -> &str {
        "static_headers"
    }

    fn prepare_request<'a>(
        &'a self,
        headers: &'a mut HeaderMap,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            for (name, value) in &self.headers {
                headers.insert(name.clone(), value.clone());
            }
            Ok(())
        })
    }
}
