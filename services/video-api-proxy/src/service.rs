//! Service state machine
//!
//! Pure state machine: receives events, returns (new_state, action).
//! Caller (main.rs) executes the I/O implied by each action.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::{Duration, Instant};

/// Drain timeout duration (graceful shutdown <5s)
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Runtime counters tracked while the service is running
#[derive(Debug, Clone)]
pub struct ServiceMetrics {
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    /// Number of requests currently being processed. Reported when the
    /// drain deadline expires with work still outstanding.
    pub in_flight: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ServiceState {
    /// Loading config and keys
    Initializing,
    /// Binding the HTTP listener
    Starting { listen_addr: SocketAddr },
    /// Accepting and dispatching requests
    Running { listen_addr: SocketAddr },
    /// Graceful shutdown, finishing in-flight requests
    Draining { deadline: Instant },
    /// Terminal state
    Stopped { exit_code: i32 },
}

impl ServiceState {
    /// Exit code once stopped.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ServiceState::Stopped { exit_code } => Some(*exit_code),
            _ => None,
        }
    }
}

/// Events that drive state transitions.
#[derive(Debug)]
pub enum ServiceEvent {
    /// Configuration parsed and key pool built
    ConfigLoaded { listen_addr: SocketAddr },
    /// HTTP listener bound and ready
    ListenerReady,
    /// Listener could not be bound
    StartupFailed,
    /// SIGTERM/SIGINT received
    ShutdownSignal,
    /// Every in-flight request finished
    DrainComplete,
    /// Drain deadline exceeded
    DrainTimeout,
}

/// Actions the caller should execute after a state transition
#[derive(Debug, PartialEq, Eq)]
pub enum ServiceAction {
    /// Bind HTTP listener on the given address
    StartListener { addr: SocketAddr },
    /// Stop accepting and wait for in-flight requests, at most `timeout`
    BeginDrain { timeout: Duration },
    /// Exit the process
    Shutdown { exit_code: i32 },
    /// No-op
    None,
}

/// Handle a state transition. Pure function: no I/O.
pub fn handle_event(state: ServiceState, event: ServiceEvent) -> (ServiceState, ServiceAction) {
    match (state, event) {
        // --- Initializing ---
        (ServiceState::Initializing, ServiceEvent::ConfigLoaded { listen_addr }) => (
            ServiceState::Starting { listen_addr },
            ServiceAction::StartListener { addr: listen_addr },
        ),

        // --- Starting ---
        (ServiceState::Starting { listen_addr }, ServiceEvent::ListenerReady) => {
            (ServiceState::Running { listen_addr }, ServiceAction::None)
        }

        (ServiceState::Starting { .. }, ServiceEvent::StartupFailed) => (
            ServiceState::Stopped { exit_code: 1 },
            ServiceAction::Shutdown { exit_code: 1 },
        ),

        // --- Running ---
        (ServiceState::Running { .. }, ServiceEvent::ShutdownSignal) => (
            ServiceState::Draining {
                deadline: Instant::now() + DRAIN_TIMEOUT,
            },
            ServiceAction::BeginDrain {
                timeout: DRAIN_TIMEOUT,
            },
        ),

        // --- Draining ---
        (
            ServiceState::Draining { .. },
            ServiceEvent::DrainComplete | ServiceEvent::DrainTimeout,
        ) => (
            ServiceState::Stopped { exit_code: 0 },
            ServiceAction::Shutdown { exit_code: 0 },
        ),

        // --- Repeated signals and terminal state ---
        (ServiceState::Draining { deadline }, ServiceEvent::ShutdownSignal) => {
            (ServiceState::Draining { deadline }, ServiceAction::None)
        }
        (ServiceState::Stopped { exit_code }, _) => {
            (ServiceState::Stopped { exit_code }, ServiceAction::None)
        }

        // --- Any other state + shutdown = stop ---
        (_, ServiceEvent::ShutdownSignal) => (
            ServiceState::Stopped { exit_code: 0 },
            ServiceAction::Shutdown { exit_code: 0 },
        ),

        // --- Invalid/unhandled transition: stay in current state ---
        (state, _event) => (state, ServiceAction::None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn localhost_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    #[test]
    fn init_to_starting_on_config_loaded() {
        let (state, action) = handle_event(
            ServiceState::Initializing,
            ServiceEvent::ConfigLoaded {
                listen_addr: localhost_addr(),
            },
        );
        assert_eq!(
            state,
            ServiceState::Starting {
                listen_addr: localhost_addr()
            }
        );
        assert_eq!(
            action,
            ServiceAction::StartListener {
                addr: localhost_addr()
            }
        );
    }

    #[test]
    fn starting_to_running_on_listener_ready() {
        let (state, action) = handle_event(
            ServiceState::Starting {
                listen_addr: localhost_addr(),
            },
            ServiceEvent::ListenerReady,
        );
        assert!(matches!(state, ServiceState::Running { .. }));
        assert_eq!(action, ServiceAction::None);
    }

    #[test]
    fn bind_failure_stops_with_error_code() {
        let (state, action) = handle_event(
            ServiceState::Starting {
                listen_addr: localhost_addr(),
            },
            ServiceEvent::StartupFailed,
        );
        assert_eq!(state.exit_code(), Some(1));
        assert_eq!(action, ServiceAction::Shutdown { exit_code: 1 });
    }

    #[test]
    fn running_to_draining_on_shutdown() {
        let before = Instant::now();
        let (state, action) = handle_event(
            ServiceState::Running {
                listen_addr: localhost_addr(),
            },
            ServiceEvent::ShutdownSignal,
        );
        match state {
            ServiceState::Draining { deadline } => assert!(deadline >= before + DRAIN_TIMEOUT),
            other => panic!("expected draining, got {other:?}"),
        }
        assert_eq!(
            action,
            ServiceAction::BeginDrain {
                timeout: DRAIN_TIMEOUT
            }
        );
    }

    #[test]
    fn draining_stops_on_complete_or_timeout() {
        for event in [ServiceEvent::DrainComplete, ServiceEvent::DrainTimeout] {
            let (state, action) = handle_event(
                ServiceState::Draining {
                    deadline: Instant::now(),
                },
                event,
            );
            assert_eq!(state.exit_code(), Some(0));
            assert_eq!(action, ServiceAction::Shutdown { exit_code: 0 });
        }
    }

    #[test]
    fn second_signal_while_draining_keeps_draining() {
        let deadline = Instant::now() + DRAIN_TIMEOUT;
        let (state, action) = handle_event(
            ServiceState::Draining { deadline },
            ServiceEvent::ShutdownSignal,
        );
        assert_eq!(state, ServiceState::Draining { deadline });
        assert_eq!(action, ServiceAction::None);
    }

    #[test]
    fn shutdown_before_running_stops_immediately() {
        let (state, action) =
            handle_event(ServiceState::Initializing, ServiceEvent::ShutdownSignal);
        assert_eq!(state, ServiceState::Stopped { exit_code: 0 });
        assert_eq!(action, ServiceAction::Shutdown { exit_code: 0 });
    }

    #[test]
    fn stopped_is_terminal() {
        let (state, action) = handle_event(
            ServiceState::Stopped { exit_code: 1 },
            ServiceEvent::ListenerReady,
        );
        assert_eq!(state, ServiceState::Stopped { exit_code: 1 });
        assert_eq!(action, ServiceAction::None);
    }

    #[test]
    fn unexpected_event_is_ignored() {
        let (state, action) =
            handle_event(ServiceState::Initializing, ServiceEvent::ListenerReady);
        assert_eq!(state, ServiceState::Initializing);
        assert_eq!(action, ServiceAction::None);
    }

    #[test]
    fn service_metrics_start_at_zero() {
        use std::sync::atomic::Ordering;
        let metrics = ServiceMetrics::new();
        assert_eq!(metrics.in_flight.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.requests_total.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.errors_total.load(Ordering::Relaxed), 0);
    }
}
