//! Dispatch loop: one logical request, up to one attempt per pooled key
//!
//! Each attempt selects a key, issues the request under its own timeout and
//! classifies the result. Quota exhaustion marks the key and moves on; any
//! other failure ends the loop immediately. The loop is bounded by the pool
//! size, so it terminates even if every key is perpetually exhausted.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use upstream::{KEY_PARAM, Transport, Url};

use crate::error::{Error, Result};
use crate::pool::{CredentialPool, SelectedCredential};
use crate::quota::{Outcome, classify_response};

/// Endpoint and parameters used to test a single key: the cheapest list call
/// the service offers.
pub const PROBE_ENDPOINT: &str = "videos";
const PROBE_PARAMS: &[(&str, &str)] = &[
    ("part", "snippet"),
    ("chart", "mostPopular"),
    ("maxResults", "1"),
];

/// Result of probing one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeOutcome {
    Ok,
    QuotaExceeded,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub id: String,
    pub outcome: ProbeOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Issues requests to the remote service on behalf of callers that never see
/// keys.
pub struct Dispatcher {
    pool: Arc<CredentialPool>,
    transport: Arc<dyn Transport>,
    base_url: Url,
    timeout: Duration,
}

impl Dispatcher {
    /// `timeout` applies to each attempt unless a call overrides it.
    pub fn new(
        pool: Arc<CredentialPool>,
        transport: Arc<dyn Transport>,
        base_url: Url,
        timeout: Duration,
    ) -> Self {
        Self {
            pool,
            transport,
            base_url,
            timeout,
        }
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    /// Dispatch with the default per-attempt timeout.
    pub async fn dispatch(
        &self,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<serde_json::Value> {
        self.dispatch_with_timeout(endpoint, params, None).await
    }

    /// Execute one logical request, failing over across keys on quota errors.
    ///
    /// Returns the parsed JSON body of the first successful attempt. Fails
    /// with `PoolExhausted` only when every attempt hit quota; any other
    /// failure is returned as soon as it happens.
    #[instrument(skip_all, fields(endpoint = %endpoint))]
    pub async fn dispatch_with_timeout(
        &self,
        endpoint: &str,
        params: &[(String, String)],
        timeout: Option<Duration>,
    ) -> Result<serde_json::Value> {
        validate_request(endpoint, params)?;
        let timeout = timeout.unwrap_or(self.timeout);
        let max_attempts = self.pool.len().await;
        let mut last_message = String::new();

        for attempt in 1..=max_attempts {
            let credential = self.pool.select().await;
            debug!(credential = %credential.id, attempt, "issuing request");

            match self.attempt(&credential, endpoint, params, timeout).await {
                Outcome::Success(body) => {
                    record_attempt("success");
                    return Ok(body);
                }
                Outcome::QuotaExceeded(message) => {
                    record_attempt("quota_exceeded");
                    info!(
                        credential = %credential.id,
                        attempt,
                        max_attempts,
                        "quota exceeded, failing over to next key"
                    );
                    self.pool.mark_exhausted(&credential.id).await?;
                    last_message = message;
                }
                Outcome::Failed(err) => {
                    record_attempt(err.kind());
                    warn!(
                        credential = %credential.id,
                        attempt,
                        error = %err,
                        "upstream request failed"
                    );
                    return Err(err);
                }
            }
        }

        warn!(attempts = max_attempts, "every attempt exceeded quota");
        Err(Error::PoolExhausted {
            attempts: max_attempts,
            last_message,
        })
    }

    /// Test every key once with a minimal request, in pool order.
    ///
    /// No failover: each report reflects exactly one key. Keys reporting
    /// quota exhaustion are marked exhausted in the pool.
    pub async fn probe(&self) -> Vec<ProbeReport> {
        let params: Vec<(String, String)> = PROBE_PARAMS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let mut reports = Vec::new();
        for credential in self.pool.credentials().await {
            let report = match self
                .attempt(&credential, PROBE_ENDPOINT, &params, self.timeout)
                .await
            {
                Outcome::Success(_) => ProbeReport {
                    id: credential.id.clone(),
                    outcome: ProbeOutcome::Ok,
                    message: None,
                },
                Outcome::QuotaExceeded(message) => {
                    if let Err(e) = self.pool.mark_exhausted(&credential.id).await {
                        warn!(credential = %credential.id, error = %e, "failed to mark probed key");
                    }
                    ProbeReport {
                        id: credential.id.clone(),
                        outcome: ProbeOutcome::QuotaExceeded,
                        message: Some(message),
                    }
                }
                Outcome::Failed(err) => {
                    warn!(credential = %credential.id, error = %err, "key probe failed");
                    ProbeReport {
                        id: credential.id.clone(),
                        outcome: ProbeOutcome::Error,
                        message: Some(err.to_string()),
                    }
                }
            };
            reports.push(report);
        }
        reports
    }

    /// One physical request with one key.
    async fn attempt(
        &self,
        credential: &SelectedCredential,
        endpoint: &str,
        params: &[(String, String)],
        timeout: Duration,
    ) -> Outcome {
        let url = match upstream::build_url(
            &self.base_url,
            endpoint,
            params,
            credential.token.expose(),
        ) {
            Ok(url) => url,
            Err(e) => return Outcome::Failed(Error::InvalidRequest(e.to_string())),
        };

        match tokio::time::timeout(timeout, self.transport.get(&url)).await {
            Err(_) | Ok(Err(upstream::Error::Timeout)) => Outcome::Failed(Error::Timeout(timeout)),
            Ok(Err(e)) => Outcome::Failed(Error::Transport(e.to_string())),
            Ok(Ok(response)) => classify_response(&response),
        }
    }
}

/// Reject requests that could never be valid, before any key is spent.
fn validate_request(endpoint: &str, params: &[(String, String)]) -> Result<()> {
    if endpoint.is_empty() {
        return Err(Error::InvalidRequest("endpoint must not be empty".into()));
    }
    if endpoint.contains('/') {
        return Err(Error::InvalidRequest(format!(
            "endpoint must be a single path segment, got: {endpoint}"
        )));
    }
    if params.iter().any(|(name, _)| name == KEY_PARAM) {
        return Err(Error::InvalidRequest(
            "the key parameter is managed by the pool and must not be supplied".into(),
        ));
    }
    Ok(())
}

fn record_attempt(outcome: &'static str) {
    metrics::counter!("upstream_attempts_total", "outcome" => outcome).increment(1);
}
