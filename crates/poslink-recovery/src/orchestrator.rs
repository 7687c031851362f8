//! Terminal reconnect orchestration.
//!
//! The [`ReconnectOrchestrator`] brings the terminal connection up. One
//! *cycle* closes any existing link, tries the preferred port and, when the
//! policy allows, scans for other ports following the terminal naming
//! pattern. A *run* repeats cycles under a [`RetryPolicy`] with a fixed,
//! cancellable delay between them.
//!
//! # States
//!
//! - `Idle`: no cycle in progress
//! - `TryPreferred`: opening the preferred port
//! - `TryFallbackScan`: trying discovered ports
//! - `Connected`: a cycle succeeded
//! - `ExhaustedRetries`: a run used every attempt without success
//! - `Cancelled`: a run was interrupted by shutdown
//!
//! # Valid Transitions
//!
//! - Idle → TryPreferred → Connected | TryFallbackScan | Idle
//! - TryFallbackScan → Connected | Idle
//! - Idle → ExhaustedRetries | Cancelled
//! - Connected | ExhaustedRetries | Cancelled → TryPreferred | Idle

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use poslink_core::{BridgeConfig, Error, Result};
use poslink_terminal::{
    Connection, ConnectionManager, PortDiscovery, PortSignature, TerminalDriver, TerminalSession,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::retry::RetryPolicy;

/// Maximum number of state transitions kept in history.
const MAX_HISTORY_SIZE: usize = 64;

/// Phase of the reconnect procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectState {
    Idle,
    TryPreferred,
    TryFallbackScan,
    Connected,
    ExhaustedRetries,
    Cancelled,
}

impl fmt::Display for ReconnectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReconnectState::Idle => "Idle",
            ReconnectState::TryPreferred => "TryPreferred",
            ReconnectState::TryFallbackScan => "TryFallbackScan",
            ReconnectState::Connected => "Connected",
            ReconnectState::ExhaustedRetries => "ExhaustedRetries",
            ReconnectState::Cancelled => "Cancelled",
        };
        write!(f, "{s}")
    }
}

impl ReconnectState {
    /// Check if transition to `target` is valid from this state.
    ///
    /// # Examples
    ///
    /// ```
    /// use poslink_recovery::ReconnectState;
    ///
    /// assert!(ReconnectState::Idle.can_transition_to(&ReconnectState::TryPreferred));
    /// assert!(!ReconnectState::Idle.can_transition_to(&ReconnectState::Connected));
    /// ```
    pub fn can_transition_to(&self, target: &ReconnectState) -> bool {
        use ReconnectState::*;

        matches!(
            (self, target),
            // From Idle
            (Idle, TryPreferred | ExhaustedRetries | Cancelled)
            // From TryPreferred
            | (TryPreferred, Connected | TryFallbackScan | Idle)
            // From TryFallbackScan
            | (TryFallbackScan, Connected | Idle)
            // From terminal states
            | (Connected | ExhaustedRetries | Cancelled, TryPreferred | Idle)
        )
    }

    /// Returns `true` for states that end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReconnectState::Connected
                | ReconnectState::ExhaustedRetries
                | ReconnectState::Cancelled
        )
    }
}

/// A single state transition with timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: ReconnectState,
    pub to: ReconnectState,
    pub timestamp: Instant,
}

/// Validating state holder with bounded history.
#[derive(Debug)]
struct ReconnectMachine {
    current: ReconnectState,
    history: VecDeque<StateTransition>,
}

impl ReconnectMachine {
    fn new() -> Self {
        Self {
            current: ReconnectState::Idle,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    fn transition_to(&mut self, to: ReconnectState) -> Result<StateTransition> {
        if !self.current.can_transition_to(&to) {
            return Err(Error::invalid_transition(self.current, to));
        }
        let transition = StateTransition {
            from: self.current,
            to,
            timestamp: Instant::now(),
        };
        if self.history.len() == MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(transition);
        self.current = to;
        Ok(transition)
    }
}

/// Final result of a reconnect run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconnectReport {
    /// `Connected`, `ExhaustedRetries` or `Cancelled`.
    pub state: ReconnectState,
    /// Cycles started during the run.
    pub attempts: u32,
    /// Path of the established connection.
    pub path: Option<String>,
}

impl ReconnectReport {
    pub fn is_connected(&self) -> bool {
        self.state == ReconnectState::Connected
    }

    /// Connected path, or the failure as a taxonomy error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionLost`] unless the run connected.
    pub fn into_result(self) -> Result<String> {
        match (self.state, self.path) {
            (ReconnectState::Connected, Some(path)) => Ok(path),
            (ReconnectState::Cancelled, _) => {
                Err(Error::connection_lost("Reconnect cancelled by shutdown"))
            }
            _ => Err(Error::connection_lost(format!(
                "Terminal unreachable after {} attempt(s)",
                self.attempts
            ))),
        }
    }
}

/// Drives connection cycles against a [`ConnectionManager`].
#[derive(Debug)]
pub struct ReconnectOrchestrator<D> {
    manager: Arc<ConnectionManager<D>>,
    discovery: PortDiscovery<D>,
    preferred_port: String,
    policy: RetryPolicy,
    machine: Mutex<ReconnectMachine>,
}

impl<D: TerminalDriver> ReconnectOrchestrator<D> {
    pub fn new(
        manager: Arc<ConnectionManager<D>>,
        discovery: PortDiscovery<D>,
        preferred_port: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            manager,
            discovery,
            preferred_port: preferred_port.into(),
            policy,
            machine: Mutex::new(ReconnectMachine::new()),
        }
    }

    /// Orchestrator using the configured port, signature and retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the configured attempt count is zero.
    pub fn from_config(manager: Arc<ConnectionManager<D>>, config: &BridgeConfig) -> Result<Self> {
        let discovery = PortDiscovery::new(
            Arc::clone(manager.driver()),
            PortSignature::new(&config.port_pattern, &config.vendor_hint),
        );
        Ok(Self::new(
            manager,
            discovery,
            &config.preferred_port,
            RetryPolicy::from_config(config)?,
        ))
    }

    pub fn manager(&self) -> &Arc<ConnectionManager<D>> {
        &self.manager
    }

    pub fn discovery(&self) -> &PortDiscovery<D> {
        &self.discovery
    }

    pub fn preferred_port(&self) -> &str {
        &self.preferred_port
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Current phase.
    pub fn state(&self) -> ReconnectState {
        self.machine().current
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> Vec<StateTransition> {
        self.machine().history.iter().copied().collect()
    }

    /// Run cycles until connected, out of attempts, or cancelled.
    ///
    /// The session lock is held only during a cycle, never across the delay.
    pub async fn run(&self, cancel: &CancellationToken) -> ReconnectReport {
        let mut retry = self.policy.start();
        info!(
            path = %self.preferred_port,
            max_attempts = retry.max_attempts(),
            "Starting terminal connection"
        );

        while let Some(attempt) = retry.next_attempt() {
            if cancel.is_cancelled() {
                return self.cancelled(attempt - 1);
            }

            {
                let mut session = self.manager.session().await;
                if let Some(connection) = self
                    .run_cycle(&mut session, self.policy.fallback_scan())
                    .await
                {
                    info!(path = %connection.path, attempt, "Terminal connection established");
                    return ReconnectReport {
                        state: ReconnectState::Connected,
                        attempts: attempt,
                        path: Some(connection.path),
                    };
                }

                if retry.is_exhausted() {
                    self.advance(ReconnectState::ExhaustedRetries);
                    error!(attempts = attempt, "Terminal unreachable, retries exhausted");
                    return ReconnectReport {
                        state: ReconnectState::ExhaustedRetries,
                        attempts: attempt,
                        path: None,
                    };
                }
            }

            warn!(
                attempt,
                max_attempts = retry.max_attempts(),
                delay_ms = duration_ms(retry.delay()),
                "Connection attempt failed, retrying"
            );
            tokio::select! {
                biased;
                () = cancel.cancelled() => return self.cancelled(attempt),
                () = tokio::time::sleep(retry.delay()) => {}
            }
        }

        // Only reachable if the policy allowed no attempts.
        self.advance(ReconnectState::ExhaustedRetries);
        ReconnectReport {
            state: ReconnectState::ExhaustedRetries,
            attempts: retry.attempt(),
            path: None,
        }
    }

    /// One connection cycle on an already held session.
    ///
    /// Closes any existing link, tries the preferred port, then (with
    /// `fallback_scan`) every discovered port following the naming pattern
    /// other than the preferred one, in discovery order.
    pub async fn run_cycle(
        &self,
        session: &mut TerminalSession<'_, D>,
        fallback_scan: bool,
    ) -> Option<Connection> {
        self.advance(ReconnectState::TryPreferred);
        session.disconnect().await;

        match session.connect(&self.preferred_port).await {
            Ok(connection) => {
                self.advance(ReconnectState::Connected);
                return Some(connection);
            }
            Err(error) => {
                debug!(path = %self.preferred_port, error = %error, "Preferred port unavailable");
            }
        }

        if fallback_scan {
            self.advance(ReconnectState::TryFallbackScan);
            let candidates = self.discovery.fallback_candidates(&self.preferred_port).await;
            debug!(count = candidates.len(), "Trying fallback ports");

            for candidate in candidates {
                match session.connect(&candidate.path).await {
                    Ok(connection) => {
                        info!(
                            path = %connection.path,
                            manufacturer = %candidate.manufacturer,
                            "Connected through fallback port"
                        );
                        self.advance(ReconnectState::Connected);
                        return Some(connection);
                    }
                    Err(error) => {
                        debug!(path = %candidate.path, error = %error, "Fallback port unavailable");
                    }
                }
            }
        }

        self.advance(ReconnectState::Idle);
        None
    }

    fn cancelled(&self, attempts: u32) -> ReconnectReport {
        info!(attempts, "Terminal connection cancelled");
        self.advance(ReconnectState::Cancelled);
        ReconnectReport {
            state: ReconnectState::Cancelled,
            attempts,
            path: None,
        }
    }

    /// Record a phase change. Runs may interleave between cycles, so an
    /// invalid transition is logged and skipped rather than propagated.
    fn advance(&self, to: ReconnectState) {
        let mut machine = self.machine();
        match machine.transition_to(to) {
            Ok(transition) => trace!(from = %transition.from, to = %transition.to, "Reconnect state"),
            Err(error) => debug!(error = %error, "Reconnect state unchanged"),
        }
    }

    fn machine(&self) -> MutexGuard<'_, ReconnectMachine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
