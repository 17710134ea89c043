//! Local mock of the remote service for router tests

use axum::extract::{Path, RawQuery};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use key_pool::{CredentialPool, Dispatcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use upstream::HttpTransport;

/// Keys the mock treats as out of quota.
#[derive(Clone, Default)]
pub struct MockBehavior {
    pub quota_keys: Vec<&'static str>,
    /// Respond 500 to every request for this endpoint.
    pub failing_endpoint: Option<&'static str>,
}

/// Start a mock upstream on an ephemeral port and return its base URL.
///
/// Success bodies echo the endpoint and key so tests can see which key
/// served the request.
pub async fn start_mock_upstream(behavior: MockBehavior) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = axum::Router::new().route(
        "/youtube/v3/{endpoint}",
        axum::routing::get(
            move |Path(endpoint): Path<String>, RawQuery(query): RawQuery| {
                let behavior = behavior.clone();
                async move {
                    let query = query.unwrap_or_default();
                    let key = query
                        .split('&')
                        .find_map(|pair| pair.strip_prefix("key="))
                        .unwrap_or("")
                        .to_string();

                    if behavior.failing_endpoint == Some(endpoint.as_str()) {
                        return (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            r#"{"error":{"code":500,"message":"Backend Error"}}"#.to_string(),
                        )
                            .into_response();
                    }
                    if behavior.quota_keys.contains(&key.as_str()) {
                        return (
                            StatusCode::FORBIDDEN,
                            r#"{"error":{"code":403,"message":"Quota exceeded","errors":[{"reason":"quotaExceeded"}]}}"#
                                .to_string(),
                        )
                            .into_response();
                    }
                    axum::Json(serde_json::json!({
                        "items": [{ "id": "abc" }],
                        "endpoint": endpoint,
                        "query": query,
                        "served_by": key,
                    }))
                    .into_response()
                }
            },
        ),
    );

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}/youtube/v3")
}

/// Dispatcher over real HTTP to `base_url` with the given keys.
pub fn dispatcher(base_url: &str, keys: &[&str]) -> Arc<Dispatcher> {
    let pool = CredentialPool::new(keys.iter().map(|k| (*k).into()).collect(), None).unwrap();
    Arc::new(Dispatcher::new(
        Arc::new(pool),
        Arc::new(HttpTransport::with_headers(&[]).unwrap()),
        upstream::parse_base_url(base_url).unwrap(),
        Duration::from_secs(5),
    ))
}
