//! Explicit wiring for one client instance
//!
//! Everything the resilient layer shares (token provider, refresh coordinator,
//! cache, retry store, notifier, session) is owned here and handed to
//! components at construction, so two contexts never see each other's state.
//! Every `ApiClient` built from one context (or its clones) shares a single
//! refresh coordinator.

use std::sync::Arc;

use peloton_auth::{CredentialStore, RefreshGrant, TokenProvider};
use tracing::info;

use crate::cache::{MemoryCache, QueryCache};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::notify::{Notifier, TracingNotifier};
use crate::refresh::RefreshCoordinator;
use crate::retry::RetryStore;
use crate::session::SessionHandle;

#[derive(Clone)]
pub struct ClientContext {
    pub config: ClientConfig,
    pub http: reqwest::Client,
    pub tokens: Arc<TokenProvider>,
    pub cache: Arc<dyn QueryCache>,
    pub retries: Arc<RetryStore>,
    pub notifier: Arc<dyn Notifier>,
    pub session: SessionHandle,
    pub refresh: RefreshCoordinator,
}

impl ClientContext {
    /// Context around an existing token provider, with in-memory defaults for
    /// everything else. Build one context per provider: a second context over
    /// the same provider gets its own refresh coordinator.
    pub fn new(config: ClientConfig, tokens: Arc<TokenProvider>) -> Result<Self> {
        let http = build_http(&config)?;
        Ok(Self::assemble(config, http, tokens))
    }

    fn assemble(config: ClientConfig, http: reqwest::Client, tokens: Arc<TokenProvider>) -> Self {
        let session = SessionHandle::new();
        Self {
            refresh: RefreshCoordinator::new(tokens.clone(), session.clone()),
            config,
            http,
            tokens,
            cache: Arc::new(MemoryCache::new()),
            retries: Arc::new(RetryStore::new()),
            notifier: Arc::new(TracingNotifier),
            session,
        }
    }

    /// Full wiring from configuration: credential store (file-backed when
    /// `auth.credential_file` is set), refresh grant and token provider.
    pub async fn from_config(config: ClientConfig) -> Result<Self> {
        let http = build_http(&config)?;

        let store = match &config.auth.credential_file {
            Some(path) => CredentialStore::open(path.clone()).await,
            None => CredentialStore::in_memory(),
        };
        let store = Arc::new(store);

        let grant = RefreshGrant::new(http.clone(), config.token_endpoint(), store.clone())
            .with_client_id(config.auth.client_id.clone());
        let tokens = Arc::new(
            TokenProvider::new(Arc::new(grant), store.clone()).with_skew(config.refresh_skew()),
        );

        info!(
            base_url = %config.api.base_url,
            persistent = store.is_persistent(),
            "client context ready"
        );

        Ok(Self::assemble(config, http, tokens))
    }

    pub fn with_cache(mut self, cache: Arc<dyn QueryCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_retry_store(mut self, retries: Arc<RetryStore>) -> Self {
        self.retries = retries;
        self
    }
}

fn build_http(config: &ClientConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.timeout())
        .build()
        .map_err(|e| Error::Setup(e.to_string()))
}
