//! Shared fixtures for unit tests in this crate

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use peloton_auth::{Credential, CredentialStore, Error, Result, TokenProvider, TokenSource, now_millis};

use crate::cache::MemoryCache;
use crate::config::ClientConfig;
use crate::context::ClientContext;
use crate::notify::RecordingNotifier;

/// Hands out `at_1`, `at_2`, ... or always fails.
pub struct SequenceSource {
    calls: AtomicUsize,
    delay: Duration,
    fail: bool,
}

impl SequenceSource {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TokenSource for SequenceSource {
    fn id(&self) -> &str {
        "sequence"
    }

    fn fetch(&self) -> Pin<Box<dyn Future<Output = Result<Credential>> + Send + '_>> {
        Box::pin(async move {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(Error::Rejected("refresh token revoked".into()));
            }
            Ok(Credential::new(
                format!("at_{n}"),
                Some("rt".into()),
                now_millis() + 3_600_000,
            ))
        })
    }
}

pub async fn serve(app: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    addr
}

pub struct Fixture {
    pub ctx: ClientContext,
    pub source: Arc<SequenceSource>,
    pub cache: Arc<MemoryCache>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Context pointed at `addr`, signed in with `at_0`, with fast retries.
pub async fn fixture(addr: SocketAddr, source: SequenceSource) -> Fixture {
    let mut config = ClientConfig::new(format!("http://{addr}"));
    config.retry.base_delay_ms = 10;
    config.retry.max_delay_ms = 40;

    let source = Arc::new(source);
    let tokens = Arc::new(TokenProvider::new(
        source.clone(),
        Arc::new(CredentialStore::in_memory()),
    ));
    tokens
        .sign_in(Credential::new("at_0", Some("rt".into()), now_millis() + 3_600_000))
        .await
        .unwrap();

    let cache = Arc::new(MemoryCache::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let ctx = ClientContext::new(config, tokens)
        .unwrap()
        .with_cache(cache.clone())
        .with_notifier(notifier.clone());

    Fixture {
        ctx,
        source,
        cache,
        notifier,
    }
}
