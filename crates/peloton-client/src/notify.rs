//! User-facing notification sink
//!
//! The fallback engine emits at most one `Notification` per failed call.
//! Presentation is the caller's business; `TracingNotifier` just logs and
//! `RecordingNotifier` keeps everything in memory.

use std::fmt;
use std::sync::Mutex;

use tracing::{error, info, warn};

use crate::request::{Call, CallFuture};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// Re-invokes the original call when the user asks for it.
#[derive(Clone)]
pub struct NotificationAction {
    pub label: String,
    on_action: Call,
}

impl NotificationAction {
    pub fn new(label: impl Into<String>, on_action: Call) -> Self {
        Self {
            label: label.into(),
            on_action,
        }
    }

    pub fn invoke(&self) -> CallFuture {
        (self.on_action)()
    }
}

impl fmt::Debug for NotificationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationAction")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub message: String,
    pub level: NotificationLevel,
    pub action: Option<NotificationAction>,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Logs notifications. The default sink.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        let retry = notification.action.is_some();
        match notification.level {
            NotificationLevel::Info => info!(retry, "{}", notification.message),
            NotificationLevel::Warning => warn!(retry, "{}", notification.message),
            NotificationLevel::Error => error!(retry, "{}", notification.message),
        }
    }
}

/// Keeps every notification, for callers that render them later and for tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    items: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.items.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification);
    }
}
