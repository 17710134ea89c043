//! Quota detection and attempt classification
//!
//! Quota exhaustion is the only failure where switching to another key can
//! help. Everything else (bad parameters, backend outages, garbage bodies)
//! would recur identically on every key, so it is surfaced immediately.

use upstream::{ErrorEnvelope, RawResponse};

use crate::error::Error;

/// Substring that marks an error as quota-related, matched case-insensitively
/// against the envelope message and every reason code.
const QUOTA_MARKER: &str = "quota";

/// Result of a single physical attempt against the remote service.
#[derive(Debug)]
pub enum Outcome {
    /// 2xx with a JSON body.
    Success(serde_json::Value),
    /// The key used for this attempt is out of quota; try another.
    QuotaExceeded(String),
    /// Any failure switching keys cannot fix.
    Failed(Error),
}

/// Whether an error body reports quota exhaustion for the key used.
///
/// Bodies that don't parse as a Google-style error envelope are never
/// quota-related.
pub fn is_quota_exceeded(body: &str) -> bool {
    let Some(envelope) = ErrorEnvelope::parse(body) else {
        return false;
    };
    let message_hit = envelope
        .message()
        .is_some_and(|m| m.to_ascii_lowercase().contains(QUOTA_MARKER));
    message_hit
        || envelope
            .reasons()
            .any(|r| r.to_ascii_lowercase().contains(QUOTA_MARKER))
}

/// Classify a completed HTTP exchange.
///
/// - 2xx: the body must be valid, non-empty JSON, otherwise `MalformedResponse`
/// - non-2xx with a quota marker: `QuotaExceeded`
/// - any other non-2xx: `Upstream` carrying the envelope message, or the
///   canonical status text when the body has none
pub fn classify_response(response: &RawResponse) -> Outcome {
    if response.is_success() {
        if response.body.trim().is_empty() {
            return Outcome::Failed(Error::MalformedResponse(
                "empty response body".to_string(),
            ));
        }
        return match serde_json::from_str(&response.body) {
            Ok(value) => Outcome::Success(value),
            Err(e) => Outcome::Failed(Error::MalformedResponse(e.to_string())),
        };
    }

    if is_quota_exceeded(&response.body) {
        return Outcome::QuotaExceeded(error_message(response));
    }

    Outcome::Failed(Error::Upstream {
        status: response.status,
        message: error_message(response),
    })
}

/// Human-readable message for a failed response.
fn error_message(response: &RawResponse) -> String {
    ErrorEnvelope::parse(&response.body)
        .and_then(|envelope| envelope.message().map(str::to_string))
        .unwrap_or_else(|| status_text(response.status))
}

fn status_text(status: u16) -> String {
    let reason = match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => return format!("API request failed with status {status}"),
    };
    format!("Status {status}: {reason}")
}
