//! Ordered fallback strategies for failed calls
//!
//! `FallbackEngine::handle` classifies the failure, logs it, then walks the
//! caller's strategy list in order:
//!
//! - `Cache` serves the last good value stored under the request signature,
//!   or under the caller's own key with `handle_keyed`
//! - `Retry` re-issues the call with exponential backoff (retryable kinds only)
//! - `Notify` emits one user-facing notification, with a retry action for
//!   retryable kinds
//! - `Throw` surfaces the classified error
//!
//! The first strategy that produces data wins. If the list runs out without
//! data or a `Throw`, the caller gets `Error::Unresolved`.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::QueryCache;
use crate::classify::{ClassifiedError, classify};
use crate::context::ClientContext;
use crate::error::{Error, Result};
use crate::metrics;
use crate::notify::{Notification, NotificationAction, NotificationLevel, Notifier};
use crate::request::{ApiRequest, Call};
use crate::retry::{RetryPolicy, RetryStore};
use crate::transport::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    Cache,
    Retry,
    Notify,
    Throw,
}

impl Strategy {
    /// Default list for reads.
    pub const READ: [Strategy; 4] = [
        Strategy::Cache,
        Strategy::Retry,
        Strategy::Notify,
        Strategy::Throw,
    ];

    /// Default list for mutations. Never served from cache.
    pub const MUTATION: [Strategy; 2] = [Strategy::Notify, Strategy::Throw];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Cache => "cache",
            Strategy::Retry => "retry",
            Strategy::Notify => "notify",
            Strategy::Throw => "throw",
        }
    }
}

/// Where resolved data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Network,
    Cache,
    Retry,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub data: serde_json::Value,
    pub source: Source,
}

impl Resolved {
    pub fn network(data: serde_json::Value) -> Self {
        Self {
            data,
            source: Source::Network,
        }
    }
}

pub struct FallbackEngine {
    cache: Arc<dyn QueryCache>,
    retries: Arc<RetryStore>,
    notifier: Arc<dyn Notifier>,
    policy: RetryPolicy,
}

impl FallbackEngine {
    pub fn new(ctx: &ClientContext) -> Self {
        Self {
            cache: ctx.cache.clone(),
            retries: ctx.retries.clone(),
            notifier: ctx.notifier.clone(),
            policy: ctx.config.retry_policy(),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn handle(
        &self,
        error: TransportError,
        request: &ApiRequest,
        strategies: &[Strategy],
        call: Call,
    ) -> Result<Resolved> {
        let signature = request.signature();
        self.handle_keyed(error, request, &signature, strategies, call)
            .await
    }

    /// `handle` with the `Cache` strategy reading `cache_key`.
    pub async fn handle_keyed(
        &self,
        error: TransportError,
        request: &ApiRequest,
        cache_key: &str,
        strategies: &[Strategy],
        call: Call,
    ) -> Result<Resolved> {
        let classified = classify(&error);
        warn!(
            kind = %classified.kind,
            status = ?classified.http_status,
            method = %request.method,
            endpoint = %request.endpoint,
            retryable = classified.retryable,
            error = %classified.message,
            "request failed"
        );
        metrics::record_error(classified.kind);

        for &strategy in strategies {
            match strategy {
                Strategy::Cache => {
                    if request.is_mutation() {
                        continue;
                    }
                    if let Some(data) = self.cache.get(cache_key) {
                        debug!(key = cache_key, "serving cached data after failure");
                        metrics::record_fallback(strategy, "resolved");
                        return Ok(Resolved {
                            data,
                            source: Source::Cache,
                        });
                    }
                    metrics::record_fallback(strategy, "skipped");
                }
                Strategy::Retry => {
                    if !classified.retryable {
                        metrics::record_fallback(strategy, "skipped");
                        continue;
                    }
                    if let Some(data) = self.retry(request, &call).await {
                        metrics::record_fallback(strategy, "resolved");
                        return Ok(Resolved {
                            data,
                            source: Source::Retry,
                        });
                    }
                    metrics::record_fallback(strategy, "exhausted");
                }
                Strategy::Notify => {
                    self.notify(&classified, &call);
                    metrics::record_fallback(strategy, "resolved");
                }
                Strategy::Throw => {
                    metrics::record_fallback(strategy, "resolved");
                    return Err(Error::Thrown(classified));
                }
            }
        }

        Err(Error::Unresolved(classified))
    }

    /// Re-issue until success or the budget runs out. The n-th retry waits
    /// `delay_for(n - 1)` after the previous attempt.
    ///
    /// The budget belongs to this call. Concurrent failures on the same
    /// signature each get their own `max_retries`; the shared store only
    /// records the latest attempt.
    async fn retry(&self, request: &ApiRequest, call: &Call) -> Option<serde_json::Value> {
        let signature = request.signature();
        self.retries.begin(&signature);
        let mut last_attempt_at = Instant::now();

        for attempt in 0..self.policy.max_retries {
            let delay = self.policy.delay_for(attempt);
            tokio::time::sleep_until(last_attempt_at + delay).await;
            debug!(
                signature = %signature,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "retrying"
            );

            match call().await {
                Ok(data) => {
                    self.retries.clear(&signature);
                    info!(signature = %signature, attempt = attempt + 1, "retry succeeded");
                    return Some(data);
                }
                Err(e) => {
                    debug!(signature = %signature, error = %e, "retry attempt failed");
                    last_attempt_at = Instant::now();
                    self.retries.record_failure(&signature);
                }
            }
        }

        self.retries.clear(&signature);
        warn!(signature = %signature, max_retries = self.policy.max_retries, "retries exhausted");
        None
    }

    fn notify(&self, classified: &ClassifiedError, call: &Call) {
        let (level, action) = if classified.retryable {
            (
                NotificationLevel::Warning,
                Some(NotificationAction::new("Retry", call.clone())),
            )
        } else {
            (NotificationLevel::Error, None)
        };
        self.notifier.notify(Notification {
            message: classified.kind.user_message().to_string(),
            level,
            action,
        });
    }
}
