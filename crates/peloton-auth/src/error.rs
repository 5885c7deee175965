//! Credential errors

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The token endpoint could not be reached or did not answer.
    #[error("token endpoint unreachable: {0}")]
    Unreachable(String),

    /// The token endpoint answered with an unexpected status or body.
    #[error("token endpoint error: {0}")]
    TokenEndpoint(String),

    /// The refresh token (or the absence of one) cannot produce a new
    /// access token. The session is over.
    #[error("refresh rejected: {0}")]
    Rejected(String),

    #[error("malformed credential: {0}")]
    Malformed(String),

    #[error("credential storage failed: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, Error>;
