//! Coordinated token refresh after a 401
//!
//! The first request to hit a 401 becomes the leader: it flips the state to
//! `Refreshing` and spawns the refresh. Every later 401 joins the waiter list
//! instead of starting another refresh. When the refresh settles, the waiter
//! list is swapped out under the lock and every waiter is woken, in join order,
//! with the same outcome.
//!
//! A 401 for a token that is no longer current (the refresh settled while the
//! request was in flight) replays with the current token and starts nothing.
//!
//! On failure the token is cleared, the persisted credential is forgotten and
//! the session is terminated before any waiter wakes, so callers observe the
//! terminated state as soon as they get their error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use peloton_auth::TokenProvider;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::session::SessionHandle;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("token refresh failed: {0}")]
pub struct RefreshError(pub String);

type Waiter = oneshot::Sender<Result<String, RefreshError>>;

enum RefreshState {
    Idle,
    Refreshing { waiters: Vec<Waiter> },
}

struct Inner {
    tokens: Arc<TokenProvider>,
    session: SessionHandle,
    state: Mutex<RefreshState>,
    refreshes: AtomicU64,
}

#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(tokens: Arc<TokenProvider>, session: SessionHandle) -> Self {
        Self {
            inner: Arc::new(Inner {
                tokens,
                session,
                state: Mutex::new(RefreshState::Idle),
                refreshes: AtomicU64::new(0),
            }),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.inner.lock_state(), RefreshState::Refreshing { .. })
    }

    /// Number of refreshes started since construction.
    pub fn refresh_count(&self) -> u64 {
        self.inner.refreshes.load(Ordering::SeqCst)
    }

    /// Whether both handles drive the same refresh state.
    pub fn same_as(&self, other: &RefreshCoordinator) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Wait for a fresh token, starting a refresh if none is in flight.
    ///
    /// `rejected` is the token the server just refused, if known. When the
    /// provider already holds a different valid token it is returned as is.
    pub async fn token_after_unauthorized(
        &self,
        rejected: Option<&str>,
    ) -> Result<String, RefreshError> {
        if let Some(rejected) = rejected
            && !self.is_refreshing()
            && let Some(current) = self.inner.tokens.current_token()
            && current != rejected
        {
            debug!("token rotated since the request went out, replaying without refresh");
            return Ok(current);
        }

        let (tx, rx) = oneshot::channel();
        let lead = {
            let mut state = self.inner.lock_state();
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    waiters.push(tx);
                    false
                }
                RefreshState::Idle => {
                    *state = RefreshState::Refreshing { waiters: vec![tx] };
                    true
                }
            }
        };

        if lead {
            // Spawned so a cancelled leader cannot strand the waiters
            let inner = self.inner.clone();
            tokio::spawn(async move { inner.run_refresh().await });
        } else {
            debug!("refresh in flight, queued behind it");
        }

        rx.await
            .map_err(|_| RefreshError("refresh task ended without a result".into()))?
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_waiters(&self) -> Vec<Waiter> {
        let mut state = self.lock_state();
        match std::mem::replace(&mut *state, RefreshState::Idle) {
            RefreshState::Refreshing { waiters } => waiters,
            RefreshState::Idle => Vec::new(),
        }
    }

    async fn run_refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);

        match self.tokens.refresh().await {
            Ok(token) => {
                metrics::record_refresh("success");
                let waiters = self.take_waiters();
                info!(waiters = waiters.len(), "token refreshed, replaying queued requests");
                for waiter in waiters {
                    let _ = waiter.send(Ok(token.clone()));
                }
            }
            Err(e) => {
                metrics::record_refresh("failure");
                warn!(error = %e, "token refresh failed, ending session");
                self.tokens.forget().await;
                self.session.terminate(format!("token refresh failed: {e}"));

                let err = RefreshError(e.to_string());
                let waiters = self.take_waiters();
                for waiter in waiters {
                    let _ = waiter.send(Err(err.clone()));
                }
            }
        }
    }
}
