//! Observable session status
//!
//! The refresh path flips the session to `Terminated` when a refresh fails.
//! Whatever owns navigation subscribes and reacts (redirect to sign-in, etc.).

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Terminated { reason: String },
}

#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: Arc<watch::Sender<SessionStatus>>,
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionStatus::Active);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.tx.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.tx.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        matches!(*self.tx.borrow(), SessionStatus::Active)
    }

    pub fn terminate(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(reason = %reason, "session terminated");
        self.tx.send_replace(SessionStatus::Terminated { reason });
    }

    /// Mark the session usable again, after a fresh sign-in.
    pub fn activate(&self) {
        if !self.is_active() {
            info!("session reactivated");
        }
        self.tx.send_replace(SessionStatus::Active);
    }
}
