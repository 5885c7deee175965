//! Bearer credential lifecycle for the Peloton API client
//!
//! Owns everything about the access token: where it comes from, how long it
//! lives, where it is persisted between runs, and how concurrent callers share
//! a single fetch. This crate has no knowledge of API requests; the
//! interceptor and client crates build on it.
//!
//! Credential flow:
//! 1. Interactive login hands a `Credential` to `TokenProvider::sign_in()`
//! 2. `TokenProvider::get_token()` serves it until it is within the skew window
//! 3. Near expiry, the provider calls its `TokenSource` once (e.g. `RefreshGrant`,
//!    which posts the stored refresh token to the token endpoint)
//! 4. The new credential is cached in memory and persisted via `CredentialStore`
//! 5. On a rejected refresh, the client clears the provider and calls `forget()`

pub mod constants;
pub mod credentials;
pub mod error;
pub mod provider;
pub mod source;
pub mod token;

pub use constants::*;
pub use credentials::{Credential, CredentialStore, now_millis};
pub use error::{Error, Result};
pub use provider::TokenProvider;
pub use source::{RefreshGrant, StaticTokenSource, TokenSource};
pub use token::{TokenResponse, jwt_expiry_millis, refresh_token};
