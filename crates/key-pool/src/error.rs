//! Error types for pool construction and dispatch

use std::time::Duration;

/// Errors from pool operations and dispatched requests.
///
/// Quota exhaustion of a single key is not an error: it is handled inside
/// the dispatch loop. Only `PoolExhausted` reports quota to callers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("credential pool requires at least one API key")]
    EmptyPool,

    #[error("API key at position {0} is empty")]
    EmptyToken(usize),

    #[error("duplicate API key: {0} repeats an earlier key")]
    DuplicateCredential(String),

    #[error("credential not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("all API keys exhausted after {attempts} attempts: {last_message}")]
    PoolExhausted {
        attempts: usize,
        last_message: String,
    },

    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("upstream request timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),
}

impl Error {
    /// Stable label for metrics and JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::EmptyPool | Error::EmptyToken(_) | Error::DuplicateCredential(_) => {
                "pool_config"
            }
            Error::NotFound(_) => "not_found",
            Error::InvalidRequest(_) => "invalid_request",
            Error::PoolExhausted { .. } => "pool_exhausted",
            Error::Upstream { .. } => "upstream_error",
            Error::Timeout(_) => "timeout",
            Error::Transport(_) => "transport_error",
            Error::MalformedResponse(_) => "malformed_response",
        }
    }
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
