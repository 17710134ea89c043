//! Gateway request errors and their HTTP mapping

use axum::http::StatusCode;
use thiserror::Error;

/// Reason a gateway request failed, before or during dispatch.
///
/// Startup failures are `anyhow` errors in main; these only ever become
/// HTTP responses.
#[derive(Error, Debug)]
pub enum Error {
    #[error("missing required query parameter: endpoint")]
    MissingEndpoint,

    #[error(transparent)]
    Dispatch(#[from] key_pool::Error),
}

impl Error {
    /// HTTP status returned to the caller.
    ///
    /// Remote service errors keep their original status; exhaustion of every
    /// key is reported as 429 so clients back off.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::MissingEndpoint => StatusCode::BAD_REQUEST,
            Error::Dispatch(e) => match e {
                key_pool::Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                key_pool::Error::PoolExhausted { .. } => StatusCode::TOO_MANY_REQUESTS,
                key_pool::Error::Upstream { status, .. } => {
                    StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
                }
                key_pool::Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                key_pool::Error::Transport(_) | key_pool::Error::MalformedResponse(_) => {
                    StatusCode::BAD_GATEWAY
                }
                key_pool::Error::EmptyPool
                | key_pool::Error::EmptyToken(_)
                | key_pool::Error::DuplicateCredential(_)
                | key_pool::Error::NotFound(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Stable label for the JSON `type` field and the error metric.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::MissingEndpoint => "invalid_request",
            Error::Dispatch(e) => e.kind(),
        }
    }

    /// Message safe to show to API clients.
    pub fn client_message(&self) -> String {
        match self {
            Error::Dispatch(key_pool::Error::PoolExhausted { .. }) => {
                "YouTube API quota exceeded. Please try again later.".to_string()
            }
            Error::Dispatch(key_pool::Error::Timeout(_)) => {
                "Request timed out. Please try again.".to_string()
            }
            Error::Dispatch(key_pool::Error::Upstream { message, .. }) => message.clone(),
            other => other.to_string(),
        }
    }
}
