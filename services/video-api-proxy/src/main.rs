//! Video API proxy
//!
//! Single-binary Rust service that:
//! 1. Loads a pool of API keys for the remote video-metadata service
//! 2. Listens for `GET /api/youtube?endpoint=...` requests
//! 3. Dispatches each one with key rotation and quota failover
//! 4. Serves health, Prometheus metrics and an optional admin API

mod admin;
mod config;
mod error;
mod metrics;
mod proxy;
mod service;
#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use key_pool::{CredentialPool, Dispatcher};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use upstream::HttpTransport;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::admin::{AdminState, build_admin_router};
use crate::config::Config;
use crate::proxy::ProxyState;
use crate::service::{ServiceAction, ServiceEvent, ServiceMetrics, ServiceState, handle_event};

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    proxy: ProxyState,
    metrics: ServiceMetrics,
    prometheus: PrometheusHandle,
}

/// Build the public axum router with all routes and shared state.
///
/// Applies a concurrency limit layer based on `max_connections`.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/api/youtube", get(api_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting video-api-proxy");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder()?;

    let state = ServiceState::Initializing;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let base_url = upstream::parse_base_url(&config.proxy.upstream_url)
        .context("invalid upstream_url")?;
    let pool = CredentialPool::new(config.pool.keys.clone(), config.pool.cooldown())
        .context("failed to build key pool")?;
    let transport =
        HttpTransport::with_headers(&config.headers).context("failed to build HTTP client")?;
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(pool),
        Arc::new(transport),
        base_url,
        Duration::from_secs(config.proxy.timeout_secs),
    ));

    info!(
        listen_addr = %config.proxy.listen_addr,
        admin_addr = ?config.proxy.admin_addr,
        upstream_url = %config.proxy.upstream_url,
        keys = config.pool.keys.len(),
        cooldown_secs = config.pool.cooldown_secs,
        headers = config.headers.len(),
        "configuration loaded"
    );

    // Transition: Initializing -> Starting
    let (state, action) = handle_event(
        state,
        ServiceEvent::ConfigLoaded {
            listen_addr: config.proxy.listen_addr,
        },
    );
    let listen_addr = match action {
        ServiceAction::StartListener { addr } => addr,
        _ => anyhow::bail!("unexpected action after ConfigLoaded: {action:?}"),
    };

    let listener = match TcpListener::bind(listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %listen_addr, error = %e, "failed to bind listener");
            let _ = handle_event(state, ServiceEvent::StartupFailed);
            return Err(e).with_context(|| format!("failed to bind to {listen_addr}"));
        }
    };

    let metrics = ServiceMetrics::new();
    let app_state = AppState {
        proxy: ProxyState {
            dispatcher: dispatcher.clone(),
            requests_total: metrics.requests_total.clone(),
            errors_total: metrics.errors_total.clone(),
            in_flight: metrics.in_flight.clone(),
        },
        metrics: metrics.clone(),
        prometheus: prometheus_handle,
    };
    let app = build_router(app_state, config.proxy.max_connections);

    // Admin API runs on its own listener and is never drained: it holds no
    // caller work worth waiting for.
    if let Some(admin_addr) = config.proxy.admin_addr {
        let admin_listener = TcpListener::bind(admin_addr)
            .await
            .with_context(|| format!("failed to bind admin listener to {admin_addr}"))?;
        let admin_app = build_admin_router(AdminState::new(dispatcher.clone()));
        info!(addr = %admin_addr, "admin API listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(admin_listener, admin_app).await {
                error!(error = %e, "admin server error");
            }
        });
    }

    // Transition: Starting -> Running
    let (state, _action) = handle_event(state, ServiceEvent::ListenerReady);
    if let ServiceState::Running { listen_addr } = &state {
        info!(addr = %listen_addr, "state: Running, accepting requests");
    }

    let in_flight = metrics.in_flight.clone();

    // The drain timeout starts when the shutdown signal fires, not when the
    // server starts: notify the server to drain, then race it against the
    // timeout.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;

    // Transition: Running -> Draining
    let (state, action) = handle_event(state, ServiceEvent::ShutdownSignal);
    let drain_timeout = match action {
        ServiceAction::BeginDrain { timeout } => timeout,
        _ => anyhow::bail!("unexpected action after ShutdownSignal: {action:?}"),
    };

    let _ = shutdown_tx.send(());

    let drain_event = match tokio::time::timeout(drain_timeout, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
            ServiceEvent::DrainComplete
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
            ServiceEvent::DrainComplete
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
            ServiceEvent::DrainComplete
        }
        Err(_) => {
            let remaining = in_flight.load(Ordering::Relaxed);
            warn!(
                remaining,
                drain_timeout_secs = drain_timeout.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
            ServiceEvent::DrainTimeout
        }
    };

    // Transition: Draining -> Stopped
    let (state, _action) = handle_event(state, drain_event);
    info!(exit_code = ?state.exit_code(), "shutdown complete");
    Ok(())
}

/// Health endpoint: pool summary plus uptime and request counters.
/// Returns 200 while at least one key is available, 503 otherwise.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut body = state.proxy.dispatcher.pool().health().await;
    let available = body["keys_available"].as_u64().unwrap_or(0);

    body["uptime_seconds"] = state.metrics.started_at.elapsed().as_secs().into();
    body["requests_served"] = state.metrics.requests_total.load(Ordering::Relaxed).into();
    body["errors_total"] = state.metrics.errors_total.load(Ordering::Relaxed).into();

    let status_code = if available > 0 {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint, text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// `GET /api/youtube?endpoint=<e>&...`
async fn api_handler(
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    proxy::handle_request(&state.proxy, query, request_id).await
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
