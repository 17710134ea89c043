//! Google API error envelope
//!
//! Failed responses from the remote service carry
//! `{"error": {"code": 403, "message": "...", "errors": [{"reason": "..."}]}}`.
//! Every field is optional and a field of the wrong type reads as absent, so
//! partially matching bodies still parse. Bodies without an `error` object
//! yield `None` and are treated by callers as generic failures.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default, deserialize_with = "lenient")]
    pub code: Option<u16>,
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorDetail {
    #[serde(default, deserialize_with = "lenient")]
    pub reason: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub domain: Option<String>,
}

/// Deserialize a field, falling back to its default when the value has the
/// wrong shape.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

impl ErrorEnvelope {
    /// Parse a response body, returning `None` if it isn't an error envelope.
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }

    /// Top-level error message, if present and non-empty.
    pub fn message(&self) -> Option<&str> {
        self.error.message.as_deref().filter(|m| !m.is_empty())
    }

    /// Reason codes of the nested errors, skipping entries without one.
    pub fn reasons(&self) -> impl Iterator<Item = &str> {
        self.error
            .errors
            .iter()
            .filter_map(|detail| detail.reason.as_deref())
    }
}
