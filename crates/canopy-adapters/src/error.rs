//! Error types for outbound requests and session material.

use thiserror::Error;

/// Errors raised by a [`Transport`](crate::transport::Transport) before an
/// HTTP status is available.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportFailure {
    /// The request timed out
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The connection could not be established or was reset
    #[error("connection failed: {0}")]
    Connect(String),

    /// The proxy refused or dropped the request
    #[error("proxy failure: {0}")]
    Proxy(String),

    /// The request could not be built
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Any other failure while sending or reading the body
    #[error("request failed: {0}")]
    Request(String),
}

impl TransportFailure {
    /// Whether the failure pattern suggests the outbound identity is blocked.
    #[must_use]
    pub fn likely_blocking(&self) -> bool {
        match self {
            Self::Proxy(_) => true,
            Self::Connect(reason) => {
                let reason = reason.to_ascii_lowercase();
                reason.contains("reset") || reason.contains("closed")
            }
            Self::Timeout(_) | Self::InvalidRequest(_) | Self::Request(_) => false,
        }
    }
}

/// Errors loading stored session material.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No session material exists for the reference
    #[error("session material not found: {reference}")]
    NotFound {
        /// Session reference from the target
        reference: String,
    },

    /// Every stored cookie has expired
    #[error("session material expired: {reference} ({expired} cookies)")]
    Expired {
        /// Session reference from the target
        reference: String,
        /// Number of expired cookies
        expired: usize,
    },

    /// The session file is not a cookie list
    #[error("invalid session file {reference}: {source}")]
    Parse {
        /// Session reference from the target
        reference: String,
        /// JSON error
        #[source]
        source: serde_json::Error,
    },

    /// I/O error reading the session file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
