//! Gateway request handling
//!
//! Translates `GET /api/youtube?endpoint=<e>&<params>` into a dispatched
//! call against the key pool and maps the outcome to an HTTP response.
//! Callers never see or supply API keys.

use crate::error::Error;
use crate::metrics;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use key_pool::Dispatcher;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Query parameter naming the remote endpoint.
const ENDPOINT_PARAM: &str = "endpoint";

/// Client-side cache buster; never forwarded.
const CACHE_BUSTER_PARAM: &str = "_t";

/// Metric label for requests that were not served, so caller-typed endpoint
/// names never become metric series.
const UNSERVED_ENDPOINT_LABEL: &str = "other";

/// Shared state passed to the gateway handler via axum State extractor
#[derive(Clone)]
pub struct ProxyState {
    pub dispatcher: Arc<Dispatcher>,
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    pub in_flight: Arc<AtomicU64>,
}

/// Decrements the in-flight counter on every exit path.
struct InFlight<'a>(&'a AtomicU64);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicU64) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// JSON error response: {"error":{"type":"...","message":"...","request_id":"req_..."}}
pub fn error_response(status: StatusCode, kind: &str, message: &str, request_id: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": kind,
            "message": message,
            "request_id": request_id,
        }
    });
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Split the inbound query into the endpoint and the params to forward.
///
/// The first `endpoint` wins; `endpoint` and `_t` are never forwarded.
pub fn split_query(query: Vec<(String, String)>) -> (Option<String>, Vec<(String, String)>) {
    let mut endpoint = None;
    let mut params = Vec::with_capacity(query.len());
    for (name, value) in query {
        match name.as_str() {
            ENDPOINT_PARAM => {
                if endpoint.is_none() && !value.is_empty() {
                    endpoint = Some(value);
                }
            }
            CACHE_BUSTER_PARAM => {}
            _ => params.push((name, value)),
        }
    }
    (endpoint, params)
}

/// Dispatch one gateway request.
#[instrument(skip_all, fields(request_id = %request_id))]
pub async fn handle_request(
    state: &ProxyState,
    query: Vec<(String, String)>,
    request_id: String,
) -> Response {
    state.requests_total.fetch_add(1, Ordering::Relaxed);
    let _in_flight = InFlight::enter(&state.in_flight);
    let start = Instant::now();

    let (endpoint, params) = split_query(query);
    let endpoint = endpoint.as_deref();

    let result = match endpoint {
        Some(endpoint) => state
            .dispatcher
            .dispatch(endpoint, &params)
            .await
            .map_err(Error::from),
        None => Err(Error::MissingEndpoint),
    };

    // Only endpoints the upstream actually served are used as labels
    let (response, endpoint_label) = match result {
        Ok(body) => {
            let endpoint = endpoint.unwrap_or(UNSERVED_ENDPOINT_LABEL);
            info!(endpoint, "request served");
            ((StatusCode::OK, axum::Json(body)).into_response(), endpoint)
        }
        Err(e) => {
            state.errors_total.fetch_add(1, Ordering::Relaxed);
            metrics::record_dispatch_error(e.kind());
            warn!(endpoint = ?endpoint, kind = e.kind(), error = %e, "request failed");
            let message = e.client_message();
            let response = error_response(e.status(), e.kind(), &message, &request_id);
            (response, UNSERVED_ENDPOINT_LABEL)
        }
    };

    metrics::record_request(
        response.status().as_u16(),
        endpoint_label,
        start.elapsed().as_secs_f64(),
    );
    response
}
