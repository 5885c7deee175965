//! Token provider: cached bearer token with single-flight fetch
//!
//! `get_token()` is on every request's path, so the common case is a lock-free
//! clone of the cached token. Only when the cache is empty or inside the skew
//! window does a caller take the fetch gate; callers queued behind it re-check
//! the cache and reuse the result instead of fetching again.
//!
//! `clear_token()` must be synchronous (it runs from logout paths that cannot
//! await), so the cache sits behind a `std::sync::Mutex` that is never held
//! across an await. An epoch counter bumped on every clear stops a fetch that
//! was already in flight from resurrecting a discarded credential.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use common::Secret;
use tracing::{debug, info, warn};

use crate::constants::DEFAULT_REFRESH_SKEW;
use crate::credentials::{Credential, CredentialStore, now_millis};
use crate::error::{Error, Result};
use crate::source::TokenSource;

struct CachedToken {
    token: Secret<String>,
    expires_at: u64,
}

pub struct TokenProvider {
    source: Arc<dyn TokenSource>,
    store: Arc<CredentialStore>,
    skew: Duration,
    cached: Mutex<Option<CachedToken>>,
    epoch: AtomicU64,
    fetch_gate: tokio::sync::Mutex<()>,
}

impl TokenProvider {
    pub fn new(source: Arc<dyn TokenSource>, store: Arc<CredentialStore>) -> Self {
        Self {
            source,
            store,
            skew: DEFAULT_REFRESH_SKEW,
            cached: Mutex::new(None),
            epoch: AtomicU64::new(0),
            fetch_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    pub fn skew(&self) -> Duration {
        self.skew
    }

    /// Current bearer token, fetching one if needed.
    ///
    /// Never fails: any error obtaining a token is logged and reported as
    /// `None`, so the request goes out unauthenticated and the server answers
    /// 401 (which the refresh path handles).
    pub async fn get_token(&self) -> Option<String> {
        if let Some(token) = self.cached_valid() {
            return Some(token);
        }

        let _gate = self.fetch_gate.lock().await;
        if let Some(token) = self.cached_valid() {
            return Some(token);
        }

        let epoch = self.epoch.load(Ordering::SeqCst);

        // Cold start: resume a persisted session when it is still valid
        if let Some(stored) = self.store.get().await
            && !stored.is_expired(now_millis(), self.skew)
            && self.install(epoch, &stored)
        {
            debug!("adopted stored credential");
            return Some(stored.token);
        }

        match self.fetch_and_store(epoch).await {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(source = self.source.id(), error = %e, "token unavailable, continuing unauthenticated");
                None
            }
        }
    }

    /// Force a fetch, bypassing the cache. Errors are reported, not swallowed.
    pub async fn refresh(&self) -> Result<String> {
        let _gate = self.fetch_gate.lock().await;
        let epoch = self.epoch.load(Ordering::SeqCst);
        let token = self.fetch_and_store(epoch).await?;
        info!(source = self.source.id(), "token refreshed");
        Ok(token)
    }

    /// Cached token if still valid. Never fetches.
    pub fn current_token(&self) -> Option<String> {
        self.cached_valid()
    }

    /// Discard the cached token. Idempotent.
    pub fn clear_token(&self) {
        let mut cached = self.lock_cache();
        *cached = None;
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Whether there is no cached token or it is inside the skew window.
    pub fn is_expired(&self) -> bool {
        let now = now_millis();
        self.lock_cache()
            .as_ref()
            .is_none_or(|c| is_due(c.expires_at, now, self.skew))
    }

    /// Absolute expiry (unix ms) of the cached token, if any.
    pub fn expires_at(&self) -> Option<u64> {
        self.lock_cache().as_ref().map(|c| c.expires_at)
    }

    /// Seed the provider with a credential obtained by interactive login.
    pub async fn sign_in(&self, credential: Credential) -> Result<()> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        self.install(epoch, &credential);
        info!("signed in");
        self.store.save(credential).await
    }

    /// Clear the cached token and the persisted credential.
    pub async fn forget(&self) {
        self.clear_token();
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "failed to clear persisted credential");
        }
    }

    async fn fetch_and_store(&self, epoch: u64) -> Result<String> {
        let credential = self.source.fetch().await?;

        if !self.install(epoch, &credential) {
            debug!("token cleared while fetch was in flight, discarding result");
            return Err(Error::Rejected(
                "credential cleared during fetch".into(),
            ));
        }

        let token = credential.token.clone();
        if let Err(e) = self.store.save(credential).await {
            warn!(error = %e, "failed to persist credential");
        }
        Ok(token)
    }

    /// Cache the credential unless a clear happened since `epoch` was read.
    fn install(&self, epoch: u64, credential: &Credential) -> bool {
        let mut cached = self.lock_cache();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return false;
        }
        *cached = Some(CachedToken {
            token: Secret::new(credential.token.clone()),
            expires_at: credential.expires_at,
        });
        true
    }

    fn cached_valid(&self) -> Option<String> {
        let now = now_millis();
        self.lock_cache()
            .as_ref()
            .filter(|c| !is_due(c.expires_at, now, self.skew))
            .map(|c| c.token.expose().clone())
    }

    fn lock_cache(&self) -> MutexGuard<'_, Option<CachedToken>> {
        self.cached.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn is_due(expires_at: u64, now_ms: u64, skew: Duration) -> bool {
    now_ms.saturating_add(skew.as_millis() as u64) >= expires_at
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::AtomicUsize;

    /// Source that counts fetches and hands out `at_<n>` tokens.
    struct CountingSource {
        calls: AtomicUsize,
        lifetime_ms: u64,
        delay: Duration,
        fail: bool,
    }

    impl CountingSource {
        fn new(lifetime_ms: u64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                lifetime_ms,
                delay: Duration::ZERO,
                fail: false,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TokenSource for CountingSource {
        fn id(&self) -> &str {
            "counting"
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
                    now_millis() + self.lifetime_ms,
                ))
            })
        }
    }

    fn provider(source: Arc<CountingSource>) -> TokenProvider {
        TokenProvider::new(source, Arc::new(CredentialStore::in_memory()))
    }

    #[tokio::test]
    async fn cached_token_is_reused_without_fetch() {
        let source = Arc::new(CountingSource::new(3_600_000));
        let tokens = provider(source.clone());

        assert_eq!(tokens.get_token().await.as_deref(), Some("at_1"));
        assert_eq!(tokens.get_token().await.as_deref(), Some("at_1"));
        assert_eq!(source.calls(), 1);
        assert!(!tokens.is_expired());
    }

    #[tokio::test]
    async fn current_token_reads_cache_only() {
        let source = Arc::new(CountingSource::new(3_600_000));
        let tokens = provider(source.clone());
        assert_eq!(tokens.current_token(), None);
        assert_eq!(source.calls(), 0);

        tokens.get_token().await;
        assert_eq!(tokens.current_token().as_deref(), Some("at_1"));
        tokens.clear_token();
        assert_eq!(tokens.current_token(), None);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn token_inside_skew_window_is_refetched() {
        // Lifetime shorter than the 60s skew: every read is due for renewal
        let source = Arc::new(CountingSource::new(30_000));
        let tokens = provider(source.clone());

        assert_eq!(tokens.get_token().await.as_deref(), Some("at_1"));
        assert!(tokens.is_expired());
        assert_eq!(tokens.get_token().await.as_deref(), Some("at_2"));
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let source = Arc::new(CountingSource {
            delay: Duration::from_millis(50),
            ..CountingSource::new(3_600_000)
        });
        let tokens = Arc::new(provider(source.clone()));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let tokens = tokens.clone();
                tokio::spawn(async move { tokens.get_token().await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().as_deref(), Some("at_1"));
        }
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn fetch_failure_is_reported_as_none() {
        let source = Arc::new(CountingSource {
            fail: true,
            ..CountingSource::new(3_600_000)
        });
        let tokens = provider(source);
        assert_eq!(tokens.get_token().await, None);
        assert!(tokens.is_expired());
    }

    #[tokio::test]
    async fn refresh_bypasses_cache_and_reports_errors() {
        let source = Arc::new(CountingSource::new(3_600_000));
        let tokens = provider(source.clone());
        tokens.get_token().await;

        assert_eq!(tokens.refresh().await.unwrap(), "at_2");
        assert_eq!(tokens.get_token().await.as_deref(), Some("at_2"));

        let failing = provider(Arc::new(CountingSource {
            fail: true,
            ..CountingSource::new(3_600_000)
        }));
        assert!(failing.refresh().await.is_err());
    }

    #[tokio::test]
    async fn clear_is_idempotent_and_forces_fetch() {
        let source = Arc::new(CountingSource::new(3_600_000));
        let tokens = provider(source.clone());
        tokens.get_token().await;

        tokens.clear_token();
        tokens.clear_token();
        assert!(tokens.is_expired());
        assert_eq!(tokens.expires_at(), None);
        assert_eq!(tokens.get_token().await.as_deref(), Some("at_2"));
    }

    #[tokio::test]
    async fn clear_during_fetch_discards_result() {
        let source = Arc::new(CountingSource {
            delay: Duration::from_millis(100),
            ..CountingSource::new(3_600_000)
        });
        let tokens = Arc::new(provider(source));

        let pending = {
            let tokens = tokens.clone();
            tokio::spawn(async move { tokens.refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        tokens.clear_token();

        assert!(pending.await.unwrap().is_err());
        assert!(tokens.is_expired());
    }

    #[tokio::test]
    async fn valid_stored_credential_is_adopted_on_cold_start() {
        let store = Arc::new(CredentialStore::in_memory());
        store
            .save(Credential::new("at_stored", None, now_millis() + 3_600_000))
            .await
            .unwrap();
        let source = Arc::new(CountingSource::new(3_600_000));
        let tokens = TokenProvider::new(source.clone(), store);

        assert_eq!(tokens.get_token().await.as_deref(), Some("at_stored"));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn expired_stored_credential_triggers_fetch_and_persists() {
        let store = Arc::new(CredentialStore::in_memory());
        store
            .save(Credential::new("at_stale", Some("rt".into()), 1))
            .await
            .unwrap();
        let source = Arc::new(CountingSource::new(3_600_000));
        let tokens = TokenProvider::new(source.clone(), store.clone());

        assert_eq!(tokens.get_token().await.as_deref(), Some("at_1"));
        assert_eq!(store.get().await.unwrap().token, "at_1");
    }

    #[tokio::test]
    async fn sign_in_and_forget() {
        let store = Arc::new(CredentialStore::in_memory());
        let source = Arc::new(CountingSource {
            fail: true,
            ..CountingSource::new(0)
        });
        let tokens = TokenProvider::new(source, store.clone());

        tokens
            .sign_in(Credential::new("at_login", Some("rt".into()), now_millis() + 3_600_000))
            .await
            .unwrap();
        assert_eq!(tokens.get_token().await.as_deref(), Some("at_login"));

        tokens.forget().await;
        assert!(store.get().await.is_none());
        assert_eq!(tokens.get_token().await, None);
    }
}
