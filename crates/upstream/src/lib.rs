//! Boundary to the remote video-metadata service
//!
//! Defines the `Transport` trait that decouples the credential pool from the
//! HTTP client, the Google-style error envelope the service returns on
//! failure, and URL construction for `<base>/<endpoint>?<params>&key=<key>`.
//! `HttpTransport` is the reqwest-backed implementation used in production;
//! tests substitute scripted transports.

pub mod envelope;
pub mod http;

pub use envelope::{ErrorBody, ErrorDetail, ErrorEnvelope};
pub use http::{HeaderInjection, HttpTransport};

pub use reqwest::Url;

use std::future::Future;
use std::pin::Pin;

/// Default base URL of the remote service.
pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Query parameter carrying the API key on every outbound request.
pub const KEY_PARAM: &str = "key";

/// Errors from issuing a request to the remote service.
///
/// Messages never contain the request URL, since it carries the API key.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid upstream URL: {0}")]
    InvalidUrl(String),

    #[error("upstream request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to read response body: {0}")]
    Body(String),
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A completed HTTP exchange: status code and the raw body text.
///
/// Non-2xx statuses are not errors at this layer; classification happens in
/// the pool's quota module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Abstraction over the outbound HTTP GET.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Transport>`).
pub trait Transport: Send + Sync {
    /// Issue a GET to `url` and return the status and body.
    fn get<'a>(
        &'a self,
        url: &'a Url,
    ) -> Pin<Box<dyn Future<Output = Result<RawResponse>> + Send + 'a>>;
}

/// Parse and validate a base URL for the remote service.
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| Error::InvalidUrl(format!("{raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::InvalidUrl(format!(
            "{raw}: scheme must be http or https"
        )));
    }
    if url.cannot_be_a_base() {
        return Err(Error::InvalidUrl(format!("{raw}: cannot be a base URL")));
    }
    Ok(url)
}

/// Build `<base>/<endpoint>?<params>&key=<key>`.
///
/// The endpoint is appended as a single percent-encoded path segment. Params
/// keep their order; the key always comes last.
pub fn build_url(
    base: &Url,
    endpoint: &str,
    params: &[(String, String)],
    key: &str,
) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| Error::InvalidUrl(format!("{base}: cannot be a base URL")))?
        .pop_if_empty()
        .push(endpoint);
    url.query_pairs_mut()
        .extend_pairs(params)
        .append_pair(KEY_PARAM, key);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn build_url_appends_endpoint_params_and_key() {
        let base = parse_base_url(DEFAULT_BASE_URL).unwrap();
        let url = build_url(
            &base,
            "videos",
            &params(&[("part", "snippet"), ("chart", "mostPopular")]),
            "K1",
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/youtube/v3/videos?part=snippet&chart=mostPopular&key=K1"
        );
    }

    #[test]
    fn build_url_handles_trailing_slash_on_base() {
        let base = parse_base_url("http://127.0.0.1:9000/v3/").unwrap();
        let url = build_url(&base, "search", &[], "K2").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/v3/search?key=K2");
    }

    #[test]
    fn build_url_encodes_param_values() {
        let base = parse_base_url("http://localhost/v3").unwrap();
        let url = build_url(&base, "search", &params(&[("q", "rust & tokio")]), "K").unwrap();
        assert_eq!(url.query(), Some("q=rust+%26+tokio&key=K"));
    }

    #[test]
    fn build_url_keeps_endpoint_in_one_segment() {
        let base = parse_base_url("http://localhost/v3").unwrap();
        let url = build_url(&base, "a/b", &[], "K").unwrap();
        assert_eq!(url.path(), "/v3/a%2Fb");
    }

    #[test]
    fn parse_base_url_rejects_non_http_scheme() {
        let err = parse_base_url("ftp://example.com/v3").unwrap_err();
        assert!(err.to_string().contains("scheme"), "got: {err}");
    }

    #[test]
    fn parse_base_url_rejects_garbage() {
        assert!(parse_base_url("not a url").is_err());
    }

    #[test]
    fn raw_response_success_range() {
        assert!(RawResponse::new(200, "{}").is_success());
        assert!(RawResponse::new(204, "").is_success());
        assert!(!RawResponse::new(403, "{}").is_success());
        assert!(!RawResponse::new(500, "").is_success());
    }
}
