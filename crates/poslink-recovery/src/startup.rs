//! Startup sequence: bring the terminal up, then load its keys once.

use poslink_terminal::TerminalDriver;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::guard::TransactionGuard;
use crate::orchestrator::ReconnectReport;

/// What the startup sequence achieved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartupReport {
    pub connection: ReconnectReport,
    /// `None` when no connection was made and key loading was skipped.
    pub keys_loaded: Option<bool>,
}

/// Connect with the full retry policy, then load keys through the guard.
///
/// A key load failure is logged and leaves the connection in place. An
/// exhausted or cancelled connection run skips key loading; the control
/// surface keeps serving either way. Key loading is also skipped once
/// `cancel` fires, so a shutdown that already closed the port does not see
/// it reopened.
pub async fn run_startup<D: TerminalDriver>(
    guard: &TransactionGuard<D>,
    cancel: &CancellationToken,
) -> StartupReport {
    let connection = guard.orchestrator().run(cancel).await;
    if !connection.is_connected() {
        warn!(
            state = %connection.state,
            attempts = connection.attempts,
            "Terminal not connected at startup; continuing without it"
        );
        return StartupReport {
            connection,
            keys_loaded: None,
        };
    }

    initialize(guard, connection, cancel).await
}

async fn initialize<D: TerminalDriver>(
    guard: &TransactionGuard<D>,
    connection: ReconnectReport,
    cancel: &CancellationToken,
) -> StartupReport {
    if cancel.is_cancelled() {
        info!("Shutdown requested; skipping key load");
        return StartupReport {
            connection,
            keys_loaded: None,
        };
    }

    let keys_loaded = match guard.load_keys().await {
        Ok(reply) if reply.is_approved() => {
            info!("Terminal keys loaded");
            true
        }
        Ok(reply) => {
            warn!(
                response_code = %reply.response_code,
                message = %reply.response_message,
                "Terminal rejected key load"
            );
            false
        }
        Err(error) => {
            warn!(error = %error, "Terminal key load failed; keeping connection");
            false
        }
    };

    StartupReport {
        connection,
        keys_loaded: Some(keys_loaded),
    }
}
