//! HTTP control server.
//!
//! [`ControlState`] carries the shared bridge components into every handler.
//! [`router`] wires the routes, and [`ControlServer`] binds the listener and
//! serves until its cancellation token fires, draining in-flight requests.
//! With a certificate pair loaded through [`load_tls`] the same listener
//! speaks HTTPS instead of plain HTTP.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use poslink_core::BridgeConfig;
//! use poslink_network::{ControlServer, ControlState, router};
//! use poslink_recovery::{ReconnectOrchestrator, TransactionGuard};
//! use poslink_terminal::{ConnectionManager, MockTerminal};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(BridgeConfig::default());
//! let (terminal, _handle) = MockTerminal::new();
//! let manager = Arc::new(ConnectionManager::new(terminal));
//! let orchestrator = Arc::new(ReconnectOrchestrator::from_config(manager, &config)?);
//! let state = ControlState::new(config.clone(), TransactionGuard::new(orchestrator));
//!
//! let server = ControlServer::bind(config.bind_addr).await?;
//! server.serve(router(state), CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use poslink_core::{BridgeConfig, Error, TlsPaths};
use poslink_recovery::{ReconnectOrchestrator, TransactionGuard};
use poslink_terminal::{ConnectionManager, PortDiscovery, TerminalDriver};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;
use crate::response::ApiError;
use crate::shutdown::{ShutdownCoordinator, ShutdownReason};

/// Shared components reachable from every handler.
#[derive(Debug)]
pub struct ControlState<D> {
    config: Arc<BridgeConfig>,
    guard: TransactionGuard<D>,
    shutdown: Option<Arc<ShutdownCoordinator<D>>>,
}

impl<D> Clone for ControlState<D> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            guard: self.guard.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<D: TerminalDriver> ControlState<D> {
    pub fn new(config: Arc<BridgeConfig>, guard: TransactionGuard<D>) -> Self {
        Self {
            config,
            guard,
            shutdown: None,
        }
    }

    /// Escalate fatal handler errors into a process shutdown.
    pub fn with_shutdown(mut self, shutdown: Arc<ShutdownCoordinator<D>>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Turn a bridge error into a response, triggering a fatal shutdown first
    /// when the error cannot be recovered from.
    pub fn escalate(&self, error: Error) -> ApiError {
        if error.is_fatal() {
            if let Some(shutdown) = &self.shutdown {
                shutdown.trigger(ShutdownReason::Fatal(error.to_string()));
            }
        }
        ApiError::from(error)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn guard(&self) -> &TransactionGuard<D> {
        &self.guard
    }

    pub fn orchestrator(&self) -> &Arc<ReconnectOrchestrator<D>> {
        self.guard.orchestrator()
    }

    pub fn manager(&self) -> &Arc<ConnectionManager<D>> {
        self.orchestrator().manager()
    }

    pub fn discovery(&self) -> &PortDiscovery<D> {
        self.orchestrator().discovery()
    }
}

/// Build the control router with request tracing.
pub fn router<D: TerminalDriver>(state: ControlState<D>) -> Router {
    Router::new()
        .route("/terminal/ports", get(handlers::list_ports::<D>))
        .route("/terminal/connect", post(handlers::connect::<D>))
        .route("/terminal/reconnect", post(handlers::reconnect::<D>))
        .route("/terminal/status", get(handlers::status::<D>))
        .route("/payment/sale", post(handlers::sale::<D>))
        .route("/payment/refund", post(handlers::refund::<D>))
        .route("/payment/close", post(handlers::close_day::<D>))
        .route("/payment/last", get(handlers::last_transaction::<D>))
        .route("/payment/initialize", post(handlers::initialize::<D>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Errors from binding or serving the control surface.
#[derive(Debug, Error)]
pub enum ControlServerError {
    /// Failed to bind to address
    #[error("Failed to bind to {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Certificate or key could not be loaded
    #[error("Failed to load TLS certificate {cert} with key {key}: {source}")]
    Tls {
        cert: PathBuf,
        key: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The server stopped with an I/O failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read a PEM certificate chain and private key for HTTPS serving.
pub async fn load_tls(paths: &TlsPaths) -> Result<RustlsConfig, ControlServerError> {
    RustlsConfig::from_pem_file(&paths.cert_path, &paths.key_path)
        .await
        .map_err(|source| ControlServerError::Tls {
            cert: paths.cert_path.clone(),
            key: paths.key_path.clone(),
            source,
        })
}

/// A bound listener for the control surface.
pub struct ControlServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    tls: Option<RustlsConfig>,
}

impl fmt::Debug for ControlServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlServer")
            .field("local_addr", &self.local_addr)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

impl ControlServer {
    /// Bind the listener. Port `0` picks a free port; see
    /// [`ControlServer::local_addr`].
    pub async fn bind(addr: SocketAddr) -> Result<Self, ControlServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ControlServerError::BindFailed { addr, source })?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Control surface listening");
        Ok(Self {
            listener,
            local_addr,
            tls: None,
        })
    }

    /// Serve HTTPS with `tls` instead of plain HTTP.
    pub fn with_tls(mut self, tls: RustlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Serve until `shutdown` is cancelled, then stop accepting connections
    /// and wait for in-flight requests to finish.
    pub async fn serve(
        self,
        router: Router,
        shutdown: CancellationToken,
    ) -> Result<(), ControlServerError> {
        let addr = self.local_addr;
        match self.tls {
            Some(tls) => serve_tls(self.listener, tls, router, shutdown).await?,
            None => {
                axum::serve(self.listener, router)
                    .with_graceful_shutdown(shutdown.cancelled_owned())
                    .await?
            }
        }
        info!(addr = %addr, "Control surface stopped");
        Ok(())
    }
}

async fn serve_tls(
    listener: TcpListener,
    tls: RustlsConfig,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "Serving over TLS");
    let handle = Handle::new();
    let watcher = tokio::spawn({
        let handle = handle.clone();
        async move {
            shutdown.cancelled().await;
            handle.graceful_shutdown(None);
        }
    });

    let served = axum_server::from_tcp_rustls(listener.into_std()?, tls)
        .handle(handle)
        .serve(router.into_make_service())
        .await;
    watcher.abort();
    served
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use poslink_terminal::MockTerminal;
    use std::time::Duration;

    fn state() -> (ControlState<MockTerminal>, Arc<ShutdownCoordinator<MockTerminal>>) {
        let config = Arc::new(BridgeConfig::default());
        let (terminal, _handle) = MockTerminal::new();
        let manager = Arc::new(ConnectionManager::new(terminal));
        let orchestrator =
            Arc::new(ReconnectOrchestrator::from_config(Arc::clone(&manager), &config).unwrap());
        let coordinator = Arc::new(ShutdownCoordinator::new(manager, Duration::from_secs(1)));
        let state = ControlState::new(config, TransactionGuard::new(orchestrator))
            .with_shutdown(Arc::clone(&coordinator));
        (state, coordinator)
    }

    #[test]
    fn test_fatal_error_triggers_shutdown() {
        let (state, coordinator) = state();

        let response = state.escalate(Error::Fatal("unexpected terminal output".into()));

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body().error_code, "FATAL");
        assert!(coordinator.is_triggered());
        assert!(coordinator.reason().is_some_and(ShutdownReason::is_fatal));
    }

    #[test]
    fn test_recoverable_error_keeps_serving() {
        let (state, coordinator) = state();

        let response = state.escalate(Error::device_busy("still waiting for a response"));

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(!coordinator.is_triggered());
    }

    #[test]
    fn test_fatal_error_without_coordinator_is_still_reported() {
        let (state, _coordinator) = state();
        let detached = ControlState::new(Arc::new(state.config().clone()), state.guard().clone());

        let response = detached.escalate(Error::Fatal("boom".into()));

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_missing_certificate_is_tls_error() {
        let paths = TlsPaths::new("/nonexistent/cert.pem", "/nonexistent/key.pem");

        let error = load_tls(&paths).await.unwrap_err();

        assert!(matches!(error, ControlServerError::Tls { .. }));
        assert!(error.to_string().contains("/nonexistent/cert.pem"));
    }
}
