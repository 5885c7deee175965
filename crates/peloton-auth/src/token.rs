//! Token endpoint interaction and expiry derivation
//!
//! The platform issues JWT access tokens. Expiry is read from the token's own
//! `exp` claim when present; otherwise the endpoint's `expires_in` delta is
//! used, and opaque tokens without either get `DEFAULT_TOKEN_LIFETIME`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_TOKEN_LIFETIME;
use crate::credentials::Credential;
use crate::error::{Error, Result};

/// Response from the token endpoint.
///
/// `expires_in` is a delta in seconds from the response time. Some deployments
/// rotate refresh tokens and some do not, so `refresh_token` is optional.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl TokenResponse {
    /// Convert to a credential, keeping `previous_refresh` when the endpoint
    /// did not rotate the refresh token.
    pub fn into_credential(self, previous_refresh: Option<String>, now_ms: u64) -> Credential {
        let expires_at = expiry_for(&self.access_token, self.expires_in, now_ms);
        Credential {
            token: self.access_token,
            refresh: self.refresh_token.or(previous_refresh),
            expires_at,
        }
    }
}

#[derive(Deserialize)]
struct Claims {
    exp: Option<u64>,
}

/// Read the `exp` claim (seconds) from a JWT and return it as unix millis.
///
/// Returns `None` for anything that is not a three-part JWT with a decodable
/// JSON payload carrying a numeric `exp`.
pub fn jwt_expiry_millis(token: &str) -> Option<u64> {
    let mut parts = token.split('.');
    let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    claims.exp.map(|secs| secs.saturating_mul(1000))
}

/// Absolute expiry for a freshly issued token.
pub fn expiry_for(token: &str, expires_in: Option<u64>, now_ms: u64) -> u64 {
    if let Some(exp) = jwt_expiry_millis(token) {
        return exp;
    }
    let lifetime_ms = expires_in
        .map(|secs| secs.saturating_mul(1000))
        .unwrap_or(DEFAULT_TOKEN_LIFETIME.as_millis() as u64);
    now_ms.saturating_add(lifetime_ms)
}

/// Exchange a refresh token for a new access token.
///
/// 400/401/403 mean the refresh token itself was rejected and map to
/// `Rejected`; anything else non-2xx is a `TokenEndpoint` failure.
pub async fn refresh_token(
    client: &reqwest::Client,
    endpoint: &str,
    client_id: &str,
    refresh: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(endpoint)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh),
            ("client_id", client_id),
        ])
        .send()
        .await
        .map_err(|e| Error::Unreachable(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if matches!(status.as_u16(), 400 | 401 | 403) {
            return Err(Error::Rejected(format!(
                "refresh token rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenEndpoint(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenEndpoint(format!("invalid refresh response: {e}")))
}
