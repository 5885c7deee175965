//! Token lifecycle defaults
//!
//! These apply when the embedding application does not override them through
//! `ClientConfig`.

use std::time::Duration;

/// Public client identifier sent with refresh grants.
pub const DEFAULT_CLIENT_ID: &str = "peloton-web";

/// A token is treated as due for renewal this long before its literal expiry.
pub const DEFAULT_REFRESH_SKEW: Duration = Duration::from_secs(60);

/// Lifetime assumed for opaque tokens that carry no `exp` claim and arrive
/// without `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Bearer scheme prefix for the Authorization header.
pub const BEARER_PREFIX: &str = "Bearer ";
