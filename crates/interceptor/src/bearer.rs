//! Bearer token attachment
//!
//! Asks the token provider for the current access token and sets
//! `Authorization: Bearer <token>`. When no token is available the request
//! proceeds unauthenticated: the server's 401 then drives the refresh path,
//! which gives a clearer failure than an opaque client-side error.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use peloton_auth::{BEARER_PREFIX, TokenProvider};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::debug;

use crate::{InterceptorError, RequestInterceptor, Result};

pub struct BearerInterceptor {
    tokens: Arc<TokenProvider>,
}

impl BearerInterceptor {
    pub fn new(tokens: Arc<TokenProvider>) -> Self {
        Self { tokens }
    }
}

/// Build an Authorization header value for `token`.
pub fn bearer_value(token: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("{BEARER_PREFIX}{token}")).map_err(|e| {
        InterceptorError::InvalidHeader {
            name: AUTHORIZATION.to_string(),
            reason: e.to_string(),
        }
    })?;
    value.set_sensitive(true);
    Ok(value)
}

impl RequestInterceptor for BearerInterceptor {
    fn id(&self) -> &str {
        "bearer"
    }

    fn prepare_request<'a>(
        &'a self,
        headers: &'a mut HeaderMap,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            match self.tokens.get_token().await {
                Some(token) => {
                    headers.insert(AUTHORIZATION, bearer_value(&token)?);
                }
                None => {
                    debug!("no token available, sending request unauthenticated");
                    headers.remove(AUTHORIZATION);
                }
            }
            Ok(())
        })
    }
}
