//! Credential pool state machine and round-robin key selection
//!
//! The pool holds an ordered, fixed set of API keys, each `Available` or
//! `Exhausted`. All state (key states, cursor, reset counter) sits behind a
//! single mutex held only for in-memory work, so each select, mark, reset and
//! cooldown expiry is atomic with respect to concurrent dispatches.
//!
//! Exhaustion policy: an exhausted key becomes available again once the
//! configured cooldown has elapsed (checked lazily during selection). When a
//! selection finds no available key at all, the whole pool is reset in one
//! step so selection never comes back empty. A `None` cooldown leaves keys
//! exhausted until such a reset.

use std::time::Duration;

use common::Secret;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Runtime state of a pooled key.
///
/// Transitions:
/// - Available → Exhausted (quota exceeded)
/// - Exhausted → Available (cooldown elapsed)
/// - all → Available (pool reset on full exhaustion)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    Available,
    Exhausted { since: Instant },
}

impl CredentialState {
    /// Status label for health/logging.
    pub fn label(&self) -> &'static str {
        match self {
            CredentialState::Available => "available",
            CredentialState::Exhausted { .. } => "exhausted",
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, CredentialState::Available)
    }
}

/// A key handed out for one attempt.
#[derive(Debug, Clone)]
pub struct SelectedCredential {
    pub id: String,
    pub index: usize,
    pub token: Secret<String>,
}

/// Point-in-time view of one key, safe to serialize (no token).
#[derive(Debug, Clone, serde::Serialize)]
pub struct CredentialStatus {
    pub id: String,
    pub hint: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exhausted_for_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_secs: Option<u64>,
}

struct Credential {
    id: String,
    token: Secret<String>,
    state: CredentialState,
}

struct PoolState {
    credentials: Vec<Credential>,
    cursor: usize,
    resets: u64,
}

/// Pool of interchangeable API keys for one remote service.
///
/// Constructed once with a non-empty list and shared via `Arc` for the life
/// of the process. Keys are never added or removed afterwards.
pub struct CredentialPool {
    state: Mutex<PoolState>,
    cooldown: Option<Duration>,
}

impl CredentialPool {
    /// Create a pool from keys in the given order.
    ///
    /// Keys get ids `key-1`, `key-2`, ... by position. Fails on an empty
    /// list, an empty key, or a key that repeats an earlier one.
    pub fn new(tokens: Vec<Secret<String>>, cooldown: Option<Duration>) -> Result<Self> {
        if tokens.is_empty() {
            return Err(Error::EmptyPool);
        }

        let mut credentials: Vec<Credential> = Vec::with_capacity(tokens.len());
        for (index, token) in tokens.into_iter().enumerate() {
            if token.is_empty() {
                return Err(Error::EmptyToken(index + 1));
            }
            let id = format!("key-{}", index + 1);
            if credentials
                .iter()
                .any(|c| c.token.expose() == token.expose())
            {
                return Err(Error::DuplicateCredential(id));
            }
            credentials.push(Credential {
                id,
                token,
                state: CredentialState::Available,
            });
        }

        info!(
            credentials = credentials.len(),
            cooldown_secs = cooldown.map(|d| d.as_secs()),
            "credential pool initialized"
        );

        Ok(Self {
            state: Mutex::new(PoolState {
                credentials,
                cursor: 0,
                resets: 0,
            }),
            cooldown,
        })
    }

    /// Select the next key via round-robin.
    ///
    /// Scans at most `len` keys starting at the cursor, expiring elapsed
    /// cooldowns on the way, and returns the first available one. The cursor
    /// moves past the returned key. If none is available the pool is reset
    /// and the key at the cursor is returned.
    pub async fn select(&self) -> SelectedCredential {
        let mut state = self.state.lock().await;
        let n = state.credentials.len();
        let now = Instant::now();
        let start = state.cursor;

        for offset in 0..n {
            let idx = (start + offset) % n;
            let credential = &mut state.credentials[idx];

            if let CredentialState::Exhausted { since } = credential.state
                && self.cooldown_elapsed(since, now)
            {
                info!(credential = %credential.id, "cooldown expired, key available again");
                credential.state = CredentialState::Available;
            }

            if credential.state.is_available() {
                let selected = SelectedCredential {
                    id: credential.id.clone(),
                    index: idx,
                    token: credential.token.clone(),
                };
                state.cursor = (idx + 1) % n;
                debug!(credential = %selected.id, "selected key");
                return selected;
            }
        }

        // Every key exhausted: reset the whole pool rather than lock out callers
        for credential in state.credentials.iter_mut() {
            credential.state = CredentialState::Available;
        }
        state.resets += 1;
        metrics::counter!("credential_pool_resets_total").increment(1);
        warn!(
            credentials = n,
            resets = state.resets,
            "all keys exhausted, resetting pool"
        );

        let idx = state.cursor;
        state.cursor = (idx + 1) % n;
        let credential = &state.credentials[idx];
        SelectedCredential {
            id: credential.id.clone(),
            index: idx,
            token: credential.token.clone(),
        }
    }

    /// Mark a key as out of quota.
    ///
    /// Marking an already exhausted key restarts its cooldown.
    pub async fn mark_exhausted(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let credential = state
            .credentials
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        credential.state = CredentialState::Exhausted {
            since: Instant::now(),
        };
        metrics::counter!("credential_exhaustions_total", "credential" => id.to_string())
            .increment(1);
        info!(
            credential = id,
            cooldown_secs = self.cooldown.map(|d| d.as_secs()),
            "key exhausted (quota exceeded)"
        );
        Ok(())
    }

    /// Current state of a key as last recorded.
    ///
    /// Cooldown expiry is applied during selection, so a key whose cooldown
    /// has elapsed still reads `Exhausted` here until the next `select`.
    pub async fn state_of(&self, id: &str) -> Result<CredentialState> {
        let state = self.state.lock().await;
        state
            .credentials
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.state)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// All keys in pool order, for probing each one directly.
    pub async fn credentials(&self) -> Vec<SelectedCredential> {
        let state = self.state.lock().await;
        state
            .credentials
            .iter()
            .enumerate()
            .map(|(index, c)| SelectedCredential {
                id: c.id.clone(),
                index,
                token: c.token.clone(),
            })
            .collect()
    }

    /// Per-key status for the admin API. Never exposes tokens.
    pub async fn snapshot(&self) -> Vec<CredentialStatus> {
        let state = self.state.lock().await;
        let now = Instant::now();
        state
            .credentials
            .iter()
            .map(|c| match c.state {
                CredentialState::Available => CredentialStatus {
                    id: c.id.clone(),
                    hint: c.token.hint(),
                    status: c.state.label(),
                    exhausted_for_secs: None,
                    cooldown_remaining_secs: None,
                },
                CredentialState::Exhausted { since } => {
                    let elapsed = now.saturating_duration_since(since);
                    let remaining = self
                        .cooldown
                        .map(|cooldown| cooldown.saturating_sub(elapsed).as_secs());
                    CredentialStatus {
                        id: c.id.clone(),
                        hint: c.token.hint(),
                        status: if self.cooldown_elapsed(since, now) {
                            "available"
                        } else {
                            "exhausted"
                        },
                        exhausted_for_secs: Some(elapsed.as_secs()),
                        cooldown_remaining_secs: remaining,
                    }
                }
            })
            .collect()
    }

    /// Pool health summary for the health endpoint.
    ///
    /// Keys whose cooldown has elapsed count as available. Status mapping:
    /// all available → healthy, some → degraded, none → unhealthy.
    pub async fn health(&self) -> serde_json::Value {
        let credentials = self.snapshot().await;
        let total = credentials.len();
        let available = credentials
            .iter()
            .filter(|c| c.status == "available")
            .count();
        let resets = self.resets().await;

        let status = if available == total {
            "healthy"
        } else if available > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        serde_json::json!({
            "status": status,
            "keys_total": total,
            "keys_available": available,
            "keys_exhausted": total - available,
            "pool_resets": resets,
            "keys": credentials,
        })
    }

    /// Number of keys in the pool.
    pub async fn len(&self) -> usize {
        self.state.lock().await.credentials.len()
    }

    /// Always false: construction rejects empty pools.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of full-pool resets since construction.
    pub async fn resets(&self) -> u64 {
        self.state.lock().await.resets
    }

    pub fn cooldown(&self) -> Option<Duration> {
        self.cooldown
    }

    fn cooldown_elapsed(&self, since: Instant, now: Instant) -> bool {
        match self.cooldown {
            Some(cooldown) => now.saturating_duration_since(since) >= cooldown,
            None => false,
        }
    }
}
