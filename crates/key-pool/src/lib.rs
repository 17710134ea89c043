//! Rotating pool of API keys for a quota-limited remote service
//!
//! Every key has a daily quota. The pool hands keys out round-robin, and
//! the dispatcher fails over to the next key whenever the remote service
//! reports quota exhaustion for the current one. Callers of the dispatcher
//! never see keys.
//!
//! Key lifecycle:
//! 1. Loaded at startup, status `Available`, id `key-N` by position
//! 2. Selected round-robin from a shared cursor
//! 3. Response classified as quota exceeded → `Exhausted`
//! 4. Cooldown elapses → `Available` again on the next selection
//! 5. Every key exhausted at selection time → whole pool reset to `Available`

pub mod dispatch;
pub mod error;
pub mod pool;
pub mod quota;

pub use dispatch::{Dispatcher, PROBE_ENDPOINT, ProbeOutcome, ProbeReport};
pub use error::{Error, Result};
pub use pool::{CredentialPool, CredentialState, CredentialStatus, SelectedCredential};
pub use quota::{Outcome, classify_response, is_quota_exceeded};
