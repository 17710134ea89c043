//! Admin API for key pool inspection
//!
//! Runs on a separate listener (`admin_addr`) and is never exposed on the
//! public port. Tokens never leave the process; keys are shown as a hint
//! of their last four characters.
//!
//! Endpoints:
//! - `GET /admin/keys`: per-key status, hint and cooldown
//! - `GET /admin/pool`: pool health summary
//! - `POST /admin/keys/probe`: test every key once, marking exhausted ones

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use key_pool::{Dispatcher, ProbeOutcome};
use tracing::info;

/// Shared state for admin API handlers.
#[derive(Clone)]
pub struct AdminState {
    dispatcher: Arc<Dispatcher>,
}

impl AdminState {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

/// Build the admin axum router.
pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/keys", get(list_keys))
        .route("/admin/keys/probe", post(probe_keys))
        .route("/admin/pool", get(pool_status))
        .with_state(state)
}

fn json_ok(body: serde_json::Value) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// GET /admin/keys: list every key with its state.
async fn list_keys(State(state): State<AdminState>) -> impl IntoResponse {
    let keys = state.dispatcher.pool().snapshot().await;
    json_ok(serde_json::json!({ "keys": keys }))
}

/// GET /admin/pool: same object as the health endpoint's pool summary.
async fn pool_status(State(state): State<AdminState>) -> impl IntoResponse {
    json_ok(state.dispatcher.pool().health().await)
}

/// POST /admin/keys/probe: one minimal request per key, no failover.
async fn probe_keys(State(state): State<AdminState>) -> impl IntoResponse {
    let reports = state.dispatcher.probe().await;
    let count = |outcome| reports.iter().filter(|r| r.outcome == outcome).count();
    info!(
        ok = count(ProbeOutcome::Ok),
        quota_exceeded = count(ProbeOutcome::QuotaExceeded),
        errors = count(ProbeOutcome::Error),
        "key probe complete"
    );
    json_ok(serde_json::json!({ "results": reports }))
}
