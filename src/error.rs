//! Error types for the wraith crate.

use std::io;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building requests, driving connections,
/// or running authentication exchanges.
///
/// Conditions that are part of normal protocol life (truncated bodies,
/// timed-out reads, exhausted auth legs) are not errors: they surface as
/// data on [`Response`](crate::Response) or as a `None` response.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A configuration write was rejected by the option schema.
    #[error("invalid value {value:?} for option {name} (allowed: {allowed:?})")]
    InvalidOption {
        name: String,
        value: String,
        allowed: &'static [&'static str],
    },

    /// The socket factory failed to produce a connection.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// A field that must serialize as ASCII contained bytes that cannot.
    #[error("encode error: {0}")]
    Encode(String),

    /// The request specification contradicts itself.
    #[error("inconsistent request: {0}")]
    InconsistentRequest(String),

    /// An external authentication provider failed to produce a token.
    #[error("auth provider error: {0}")]
    AuthProvider(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create a connect failure.
    pub fn connect(message: impl Into<String>) -> Self {
        Self::ConnectFailed(message.into())
    }

    /// Create an encode error.
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode(message.into())
    }

    /// Create an inconsistent-request error.
    pub fn inconsistent(message: impl Into<String>) -> Self {
        Self::InconsistentRequest(message.into())
    }

    /// Create an auth provider error.
    pub fn auth_provider(message: impl Into<String>) -> Self {
        Self::AuthProvider(message.into())
    }
}
