//! reqwest-backed transport with static header injection
//!
//! The remote service accepts browser-style `Referer`/`Origin` headers for
//! key restrictions, so configured headers are attached to every request as
//! client defaults.

use crate::{Error, RawResponse, Result, Transport};
use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use tracing::warn;

/// Header to attach to every outbound request (name + value pair from config).
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderInjection {
    pub name: String,
    pub value: String,
}

/// Production transport over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build a client carrying the given headers on every request.
    ///
    /// Invalid header names or values are skipped with a warning rather than
    /// failing startup.
    pub fn with_headers(injections: &[HeaderInjection]) -> Result<Self> {
        let client = reqwest::Client::builder()
            .default_headers(header_map(injections))
            .build()
            .map_err(|e| Error::Request(format!("building HTTP client: {e}")))?;
        Ok(Self::new(client))
    }
}

impl Transport for HttpTransport {
    fn get<'a>(
        &'a self,
        url: &'a Url,
    ) -> Pin<Box<dyn Future<Output = Result<RawResponse>> + Send + 'a>> {
        Box::pin(async move {
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(map_send_error)?;

            let status = response.status().as_u16();
            let body = response.text().await.map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout
                } else {
                    Error::Body(e.without_url().to_string())
                }
            })?;

            Ok(RawResponse { status, body })
        })
    }
}

/// Map a send failure, dropping the URL so the key never reaches error text.
fn map_send_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout
    } else if e.is_connect() {
        Error::Connect(e.without_url().to_string())
    } else {
        Error::Request(e.without_url().to_string())
    }
}

fn header_map(injections: &[HeaderInjection]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for injection in injections {
        let name = match HeaderName::from_str(&injection.name) {
            Ok(n) => n,
            Err(e) => {
                warn!(header = %injection.name, error = %e, "skipping invalid header name");
                continue;
            }
        };
        let value = match HeaderValue::from_str(&injection.value) {
            Ok(v) => v,
            Err(e) => {
                warn!(header = %injection.name, error = %e, "skipping invalid header value");
                continue;
            }
        };
        headers.insert(name, value);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use tokio::net::TcpListener;

    /// Start a local server that echoes the query string and referer header,
    /// or returns a quota error when `fail=quota` is present.
    async fn start_echo_server() -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let url = format!("http://{addr}/v3");

        let handle = tokio::spawn(async move {
            let app = axum::Router::new().fallback(
                |request: axum::http::Request<axum::body::Body>| async move {
                    let query = request.uri().query().unwrap_or("").to_string();
                    if query.contains("fail=quota") {
                        return (
                            StatusCode::FORBIDDEN,
                            r#"{"error":{"message":"Quota exceeded"}}"#.to_string(),
                        );
                    }
                    let referer = request
                        .headers()
                        .get("referer")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    let body = serde_json::json!({
                        "path": request.uri().path(),
                        "query": query,
                        "referer": referer,
                    });
                    (StatusCode::OK, body.to_string())
                },
            );
            axum::serve(listener, app).await.unwrap();
        });

        (url, handle)
    }

    #[tokio::test]
    async fn get_returns_status_and_body() {
        let (base, _server) = start_echo_server().await;
        let transport = HttpTransport::with_headers(&[HeaderInjection {
            name: "referer".into(),
            value: "https://mytube.example/".into(),
        }])
        .unwrap();

        let base = crate::parse_base_url(&base).unwrap();
        let url = crate::build_url(
            &base,
            "videos",
            &[("part".to_string(), "snippet".to_string())],
            "K1",
        )
        .unwrap();
        let response = transport.get(&url).await.unwrap();

        assert_eq!(response.status, 200);
        let json: serde_json::Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(json["path"], "/v3/videos");
        assert_eq!(json["query"], "part=snippet&key=K1");
        assert_eq!(json["referer"], "https://mytube.example/");
    }

    #[tokio::test]
    async fn non_2xx_is_returned_not_raised() {
        let (base, _server) = start_echo_server().await;
        let transport = HttpTransport::new(reqwest::Client::new());

        let base = crate::parse_base_url(&base).unwrap();
        let url = crate::build_url(
            &base,
            "videos",
            &[("fail".to_string(), "quota".to_string())],
            "K1",
        )
        .unwrap();
        let response = transport.get(&url).await.unwrap();

        assert_eq!(response.status, 403);
        assert!(response.body.contains("Quota exceeded"));
    }

    #[tokio::test]
    async fn connection_refused_maps_to_connect_without_key() {
        let transport = HttpTransport::new(reqwest::Client::new());
        let base = crate::parse_base_url("http://127.0.0.1:1/v3").unwrap();
        let url = crate::build_url(&base, "videos", &[], "SECRET-KEY-VALUE").unwrap();

        let err = transport.get(&url).await.unwrap_err();
        assert!(matches!(err, Error::Connect(_)), "got: {err:?}");
        assert!(
            !err.to_string().contains("SECRET-KEY-VALUE"),
            "error text must not leak the key: {err}"
        );
    }

    #[test]
    fn header_map_skips_invalid_entries() {
        let headers = header_map(&[
            HeaderInjection {
                name: "invalid header name".into(),
                value: "value".into(),
            },
            HeaderInjection {
                name: "origin".into(),
                value: "https://mytube.example".into(),
            },
            HeaderInjection {
                name: "x-bad-value".into(),
                value: "line\nbreak".into(),
            },
        ]);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("origin").unwrap(), "https://mytube.example");
    }

    #[test]
    fn later_injection_replaces_earlier_value() {
        let headers = header_map(&[
            HeaderInjection {
                name: "referer".into(),
                value: "https://old.example/".into(),
            },
            HeaderInjection {
                name: "referer".into(),
                value: "https://new.example/".into(),
            },
        ]);
        assert_eq!(headers.get("referer").unwrap(), "https://new.example/");
    }
}
