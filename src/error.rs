use std::{sync::Arc, time::Duration};

use thiserror::Error;

/// Result type used by synchronization and client lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the synchronization subsystem and the client lifecycle.
///
/// Evaluation never returns this type: evaluation calls always produce a treatment.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Invalid `sdk_url` configuration.
    #[error("invalid sdk_url configuration")]
    InvalidSdkUrl(#[source] url::ParseError),

    /// The request was unauthorized, the api key is likely invalid.
    #[error("unauthorized, api_key is likely invalid")]
    Unauthorized,

    /// The request URI exceeded the server limit (usually caused by a large flag-set filter).
    #[error("request uri is too long, consider reducing the flag sets filter")]
    UriTooLong,

    /// The server answered with a non-success status code.
    #[error("received non-success response status {0}")]
    HttpStatus(u16),

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),

    /// A background synchronization thread panicked. This should normally never happen.
    #[error("synchronization thread panicked")]
    ThreadPanicked,

    /// The client did not become ready within the requested time.
    #[error("client was not ready in {0:?}")]
    Timeout(Duration),

    /// The client was destroyed and cannot be used anymore.
    #[error("client has been destroyed")]
    ClientDestroyed,

    /// An argument passed to the client is not acceptable.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}

/// A fault raised while interpreting a flag definition.
///
/// The client maps every evaluation fault to the `control` treatment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EvaluationError {
    /// Flag dependencies (`IN_SPLIT_TREATMENT` matchers) nest deeper than allowed, which usually
    /// means a dependency cycle.
    #[error("flag dependency chain starting at {flag_name:?} is too deep")]
    DependencyDepthExceeded {
        /// The flag whose evaluation failed.
        flag_name: String,
        /// Change number of the flag whose evaluation failed.
        change_number: i64,
    },

    /// The bucketing key could not be hashed.
    #[error("failed to hash bucketing key for flag {flag_name:?}: {kind}")]
    Hashing {
        /// The flag whose evaluation failed.
        flag_name: String,
        /// Change number of the flag whose evaluation failed.
        change_number: i64,
        /// Kind of the underlying I/O error.
        kind: std::io::ErrorKind,
    },
}

impl EvaluationError {
    /// Change number of the flag being evaluated when the fault occurred.
    pub fn change_number(&self) -> i64 {
        match self {
            EvaluationError::DependencyDepthExceeded { change_number, .. }
            | EvaluationError::Hashing { change_number, .. } => *change_number,
        }
    }

    /// Re-attribute the fault to the enclosing flag as it propagates out of a dependency.
    pub(crate) fn within(self, flag_name: &str, change_number: i64) -> Self {
        match self {
            EvaluationError::DependencyDepthExceeded { .. } => {
                EvaluationError::DependencyDepthExceeded {
                    flag_name: flag_name.to_owned(),
                    change_number,
                }
            }
            EvaluationError::Hashing { kind, .. } => EvaluationError::Hashing {
                flag_name: flag_name.to_owned(),
                change_number,
                kind,
            },
        }
    }
}
