//! Exponential backoff policy and per-signature retry bookkeeping
//!
//! The `RetryStore` is injectable (see `ClientContext`) so two clients, or two
//! tests, never share attempt counters by accident.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `attempt + 1`: `base * 2^attempt`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    pub signature: String,
    pub attempt_count: u32,
    pub last_attempt_at: Instant,
}

/// Attempt counters keyed by request signature.
#[derive(Debug, Default)]
pub struct RetryStore {
    states: Mutex<HashMap<String, RetryState>>,
}

impl RetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RetryState>> {
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, signature: &str) -> Option<RetryState> {
        self.lock().get(signature).cloned()
    }

    /// Return the state for `signature`, creating it with zero attempts if
    /// absent. A fresh state counts the original failure as "now".
    pub fn begin(&self, signature: &str) -> RetryState {
        self.lock()
            .entry(signature.to_string())
            .or_insert_with(|| RetryState {
                signature: signature.to_string(),
                attempt_count: 0,
                last_attempt_at: Instant::now(),
            })
            .clone()
    }

    /// Stamp a failed retry on the shared state. An entry that was already
    /// cleared stays cleared; the caller's own attempt budget decides when to
    /// stop.
    pub fn record_failure(&self, signature: &str) -> Option<RetryState> {
        let mut states = self.lock();
        let state = states.get_mut(signature)?;
        state.attempt_count += 1;
        state.last_attempt_at = Instant::now();
        Some(state.clone())
    }

    pub fn clear(&self, signature: &str) {
        self.lock().remove(signature);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
