//! Resilient HTTP client for the Peloton API
//!
//! Layers, bottom to top:
//! - `ApiClient` dispatches with interceptors and a per-request timeout, and
//!   turns a 401 into one coordinated token refresh plus a single replay
//! - `classify` maps any failure to an `ErrorKind` with a retryable flag
//! - `FallbackEngine` walks an ordered strategy list (cache, retry, notify,
//!   throw) when a call fails
//! - `MutationController` applies optimistic cache writes and rolls them back
//!   on failure
//! - `ResilientClient` is the facade callers use
//!
//! All shared state hangs off an explicit `ClientContext`.

pub mod cache;
pub mod classify;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod fallback;
pub mod metrics;
pub mod notify;
pub mod optimistic;
pub mod refresh;
pub mod request;
pub mod resilient;
pub mod retry;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

pub use cache::{CacheEvent, FetchTicket, MemoryCache, QueryCache};
pub use classify::{ClassifiedError, ErrorKind, classify};
pub use client::ApiClient;
pub use config::ClientConfig;
pub use context::ClientContext;
pub use error::{Error, Result};
pub use fallback::{FallbackEngine, Resolved, Source, Strategy};
pub use notify::{
    Notification, NotificationAction, NotificationLevel, Notifier, RecordingNotifier,
    TracingNotifier,
};
pub use optimistic::{CacheSnapshot, MutationController, MutationDescriptor, OptimisticWrite};
pub use refresh::{RefreshCoordinator, RefreshError};
pub use request::{ApiRequest, Call, CallFuture, make_call};
pub use resilient::ResilientClient;
pub use retry::{RetryPolicy, RetryState, RetryStore};
pub use session::{SessionHandle, SessionStatus};
pub use transport::TransportError;
