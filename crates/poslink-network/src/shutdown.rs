//! Process shutdown sequencing.
//!
//! A shutdown is triggered by a termination signal, a fatal fault or a
//! failed server task. The sequence runs once per process:
//!
//! 1. cancel the shared token (the server stops accepting connections and
//!    pending reconnect delays end),
//! 2. wait for the server to drain and for attached background tasks (such as
//!    the startup key load) to finish, bounded by the configured timeout,
//! 3. disconnect the terminal,
//! 4. report the exit code: `0` for graceful stops, `1` for fatal ones.
//!
//! Concurrent triggers collapse into that one sequence. The first recorded
//! reason wins and every caller receives the same [`ShutdownOutcome`].

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use poslink_core::Error;
use poslink_terminal::{ConnectionManager, DisconnectOutcome, TerminalDriver};
use serde::Serialize;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::server::ControlServerError;

/// Why the process is stopping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ShutdownReason {
    /// Termination signal such as SIGINT or SIGTERM.
    Signal(String),
    /// Unrecoverable fault, panic or server failure.
    Fatal(String),
}

impl ShutdownReason {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ShutdownReason::Fatal(_))
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_fatal() { 1 } else { 0 }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal(signal) => write!(f, "signal {signal}"),
            ShutdownReason::Fatal(detail) => write!(f, "fatal: {detail}"),
        }
    }
}

/// Result of the shutdown sequence, shared by every caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShutdownOutcome {
    pub reason: ShutdownReason,
    /// `false` when the drain hit the timeout.
    pub drained: bool,
    /// Path of the terminal connection closed during shutdown, if any.
    pub closed_port: Option<String>,
    pub exit_code: u8,
}

type ServerTask = JoinHandle<Result<(), ControlServerError>>;

/// Runs the shutdown sequence exactly once.
#[derive(Debug)]
pub struct ShutdownCoordinator<D> {
    manager: Arc<ConnectionManager<D>>,
    drain_timeout: Duration,
    token: CancellationToken,
    reason: OnceLock<ShutdownReason>,
    server: Mutex<Option<ServerTask>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    outcome: OnceCell<ShutdownOutcome>,
}

impl<D: TerminalDriver> ShutdownCoordinator<D> {
    pub fn new(manager: Arc<ConnectionManager<D>>, drain_timeout: Duration) -> Self {
        Self {
            manager,
            drain_timeout,
            token: CancellationToken::new(),
            reason: OnceLock::new(),
            server: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            outcome: OnceCell::new(),
        }
    }

    /// Token cancelled when shutdown starts. Hand clones to the server and
    /// to reconnect runs.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Register the serving task whose completion marks the end of the
    /// drain.
    pub fn attach_server(&self, task: ServerTask) {
        *self.server.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    /// Register a background task that may hold the terminal. The terminal is
    /// disconnected only after it finishes or the drain times out.
    pub fn attach_task(&self, task: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }

    /// The recorded reason, once triggered.
    pub fn reason(&self) -> Option<&ShutdownReason> {
        self.reason.get()
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Record `reason` (unless one is already recorded) and cancel the token.
    ///
    /// Safe to call from synchronous contexts such as a panic hook. Returns
    /// `true` if this call recorded the reason.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let recorded = self.reason.set(reason.clone()).is_ok();
        if recorded {
            if reason.is_fatal() {
                error!(reason = %reason, "Shutdown triggered");
            } else {
                info!(reason = %reason, "Shutdown triggered");
            }
        } else {
            info!(reason = %reason, "Shutdown already in progress");
        }
        self.token.cancel();
        recorded
    }

    /// Resolves once any caller has triggered shutdown.
    pub async fn triggered(&self) {
        self.token.cancelled().await;
    }

    /// Trigger with `reason` and wait for the sequence to complete.
    pub async fn shutdown(&self, reason: ShutdownReason) -> ShutdownOutcome {
        self.trigger(reason);
        self.complete().await
    }

    /// Run the sequence, or wait for the run already in progress.
    pub async fn complete(&self) -> ShutdownOutcome {
        self.outcome.get_or_init(|| self.run()).await.clone()
    }

    async fn run(&self) -> ShutdownOutcome {
        let reason = self
            .reason
            .get_or_init(|| ShutdownReason::Signal("requested".to_string()))
            .clone();
        self.token.cancel();

        let drained = self.drain().await;

        let closed_port = match self.manager.disconnect().await {
            DisconnectOutcome::Closed { path } => Some(path),
            DisconnectOutcome::NothingToClose => None,
        };

        let outcome = ShutdownOutcome {
            exit_code: reason.exit_code(),
            reason,
            drained,
            closed_port,
        };
        info!(
            reason = %outcome.reason,
            drained = outcome.drained,
            exit_code = outcome.exit_code,
            "Shutdown complete"
        );
        outcome
    }

    async fn drain(&self) -> bool {
        let mut server = self
            .server
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let mut tasks = std::mem::take(
            &mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner),
        );

        let waited = tokio::time::timeout(self.drain_timeout, async {
            if let Some(server) = server.as_mut() {
                match server.await {
                    Ok(Ok(())) => {}
                    Ok(Err(error)) => warn!(error = %error, "Control server stopped with an error"),
                    Err(join_error) => warn!(error = %join_error, "Control server task failed"),
                }
            }
            for task in &mut tasks {
                if let Err(join_error) = task.await {
                    warn!(error = %join_error, "Background task failed");
                }
            }
        })
        .await;

        if waited.is_ok() {
            return true;
        }

        let error = Error::ShutdownTimeout {
            timeout_ms: u64::try_from(self.drain_timeout.as_millis()).unwrap_or(u64::MAX),
        };
        warn!(error = %error, "In-flight work did not drain; continuing shutdown");
        if let Some(server) = server {
            server.abort();
        }
        for task in tasks {
            task.abort();
        }
        false
    }
}
