use crate::classify::{ClassifiedError, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The `Throw` strategy surfaced the failure to the caller.
    #[error("{0}")]
    Thrown(ClassifiedError),

    /// Every strategy in the list was tried and none produced data.
    #[error("unresolved failure: {0}")]
    Unresolved(ClassifiedError),

    /// A response arrived but did not match the expected shape.
    #[error("response decode failed: {0}")]
    Decode(String),

    #[error("client setup failed: {0}")]
    Setup(String),

    #[error(transparent)]
    Config(#[from] common::Error),
}

impl Error {
    pub fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            Error::Thrown(c) | Error::Unresolved(c) => Some(c),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        self.classified().map(|c| c.kind)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
