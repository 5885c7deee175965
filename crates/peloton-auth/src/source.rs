//! Underlying credential sources for the token provider
//!
//! A `TokenSource` performs the actual network fetch; `TokenProvider` decides
//! when to call it. Returns `Pin<Box<dyn Future>>` so sources can be held as
//! `Arc<dyn TokenSource>`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::constants::DEFAULT_CLIENT_ID;
use crate::credentials::{Credential, CredentialStore, now_millis};
use crate::error::{Error, Result};
use crate::token::refresh_token;

pub trait TokenSource: Send + Sync {
    /// Identifier for logging (e.g. "refresh_grant")
    fn id(&self) -> &str;

    /// Obtain a fresh credential.
    fn fetch(&self) -> Pin<Box<dyn Future<Output = Result<Credential>> + Send + '_>>;
}

/// Refresh-token grant against the platform token endpoint.
///
/// Reads the refresh token from the credential store at fetch time, so a
/// rotated refresh token saved by the provider is picked up on the next call.
pub struct RefreshGrant {
    client: reqwest::Client,
    endpoint: String,
    client_id: String,
    store: Arc<CredentialStore>,
}

impl RefreshGrant {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, store: Arc<CredentialStore>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            store,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }
}

impl TokenSource for RefreshGrant {
    fn id(&self) -> &str {
        "refresh_grant"
    }

    fn fetch(&self) -> Pin<Box<dyn Future<Output = Result<Credential>> + Send + '_>> {
        Box::pin(async move {
            let refresh = self
                .store
                .get()
                .await
                .and_then(|c| c.refresh)
                .ok_or_else(|| Error::Rejected("no refresh token stored".into()))?;

            debug!(endpoint = %self.endpoint, "requesting token via refresh grant");
            let response =
                refresh_token(&self.client, &self.endpoint, &self.client_id, &refresh).await?;
            Ok(response.into_credential(Some(refresh), now_millis()))
        })
    }
}

/// Serves a fixed credential. Useful for service accounts with long-lived
/// tokens and for wiring tests.
pub struct StaticTokenSource {
    credential: Credential,
}

impl StaticTokenSource {
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }
}

impl TokenSource for StaticTokenSource {
    fn id(&self) -> &str {
        "static"
    }

    fn fetch(&self) -> Pin<Box<dyn Future<Output = Result<Credential>> + Send + '_>> {
        let credential = self.credential.clone();
        Box::pin(async move { Ok(credential) })
    }
}
