//! Authenticated HTTP client
//!
//! Every dispatch runs the interceptor chain (static headers, request id,
//! bearer token) and applies the per-request timeout. A 401 hands off to the
//! context's `RefreshCoordinator` and the request is replayed exactly once
//! with the new token; a 401 on the replay is final. A 403 never triggers a
//! refresh.
//!
//! Responses are decoded as JSON; an empty 2xx body decodes to `null`.

use std::sync::Arc;
use std::time::Duration;

use interceptor::bearer::bearer_value;
use interceptor::{BearerInterceptor, RequestIdInterceptor, RequestInterceptor, StaticHeaders};
use reqwest::header::{AUTHORIZATION, HeaderMap};
use serde_json::Value;
use tracing::{debug, warn};

use crate::context::ClientContext;
use crate::metrics;
use crate::refresh::RefreshCoordinator;
use crate::request::ApiRequest;
use crate::transport::TransportError;

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    interceptors: Vec<Arc<dyn RequestInterceptor>>,
    refresh: RefreshCoordinator,
}

impl ApiClient {
    pub fn new(ctx: &ClientContext) -> Self {
        let interceptors: Vec<Arc<dyn RequestInterceptor>> = vec![
            Arc::new(StaticHeaders::new(&ctx.config.header_injections())),
            Arc::new(RequestIdInterceptor),
            Arc::new(BearerInterceptor::new(ctx.tokens.clone())),
        ];
        Self {
            http: ctx.http.clone(),
            base_url: ctx.config.api.base_url.trim_end_matches('/').to_string(),
            timeout: ctx.config.timeout(),
            interceptors,
            refresh: ctx.refresh.clone(),
        }
    }

    /// Append an interceptor; it runs after the built-in ones.
    pub fn with_interceptor(mut self, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn refresh(&self) -> &RefreshCoordinator {
        &self.refresh
    }

    /// Issue the request, refreshing and replaying once on 401.
    pub async fn send(&self, request: &ApiRequest) -> Result<Value, TransportError> {
        let headers = self.headers(None).await;
        let sent = sent_token(&headers);

        match self.dispatch(request, headers).await {
            Err(e) if e.is_unauthorized() => {
                debug!(endpoint = %request.endpoint, "unauthorized, waiting for token refresh");
                let token = match self.refresh.token_after_unauthorized(sent.as_deref()).await {
                    Ok(token) => token,
                    Err(refresh_err) => {
                        warn!(endpoint = %request.endpoint, error = %refresh_err, "refresh failed, surfacing original 401");
                        return Err(e);
                    }
                };

                let headers = self.headers(Some(&token)).await;
                let replay = self.dispatch(request, headers).await;
                if let Err(again) = &replay
                    && again.is_unauthorized()
                {
                    warn!(endpoint = %request.endpoint, "replay still unauthorized, giving up");
                }
                replay
            }
            other => other,
        }
    }

    /// Run the interceptor chain. A replay carries the token the refresh
    /// produced, whatever the provider's cache says by now.
    async fn headers(&self, token: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        interceptor::apply_all(&self.interceptors, &mut headers).await;

        if let Some(token) = token {
            match bearer_value(token) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(e) => warn!(error = %e, "refreshed token is not a valid header value"),
            }
        }
        headers
    }

    fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        headers: HeaderMap,
    ) -> Result<Value, TransportError> {
        let mut builder = self
            .http
            .request(request.method.clone(), self.url_for(&request.endpoint))
            .headers(headers)
            .timeout(self.timeout);
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&e))?;
        let status = response.status();
        metrics::record_request(request.method.as_str(), status.as_u16());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(&e))?;

        if !status.is_success() {
            return Err(TransportError::from_status(
                status.as_u16(),
                String::from_utf8_lossy(&bytes).into_owned(),
            ));
        }
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(TransportError::decode)
    }
}

fn sent_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}
