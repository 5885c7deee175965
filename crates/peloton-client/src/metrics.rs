//! Client-side counters
//!
//! - `api_requests_total` (counter): labels `method`, `status`
//! - `api_errors_total` (counter): label `kind`
//! - `api_token_refresh_total` (counter): label `outcome`
//! - `api_fallback_total` (counter): labels `strategy`, `outcome`
//! - `api_optimistic_rollbacks_total` (counter)
//!
//! The library never installs a recorder; without one these are no-ops.

use crate::classify::ErrorKind;
use crate::fallback::Strategy;

/// Record an HTTP exchange that produced a status code.
pub fn record_request(method: &str, status: u16) {
    metrics::counter!("api_requests_total", "method" => method.to_string(), "status" => status.to_string())
        .increment(1);
}

pub fn record_error(kind: ErrorKind) {
    metrics::counter!("api_errors_total", "kind" => kind.as_str()).increment(1);
}

/// `outcome` is `success` or `failure`.
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("api_token_refresh_total", "outcome" => outcome).increment(1);
}

/// `outcome` is `resolved`, `skipped` or `exhausted`.
pub fn record_fallback(strategy: Strategy, outcome: &'static str) {
    metrics::counter!("api_fallback_total", "strategy" => strategy.as_str(), "outcome" => outcome)
        .increment(1);
}

pub fn record_rollback() {
    metrics::counter!("api_optimistic_rollbacks_total").increment(1);
}
