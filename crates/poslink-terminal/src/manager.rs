//! Terminal connection manager.
//!
//! The [`ConnectionManager`] owns the single terminal [`Connection`]. It
//! serializes every mutation and every terminal command through one async
//! mutex, and publishes a [`ConnectionStatus`] snapshot on a watch channel so
//! readers never wait behind a running command.
//!
//! ```text
//!  HTTP handlers ──┐                     ┌──────────────────────┐
//!  startup task ───┼── session().await ─►│ Mutex<Option<Conn>>  │──► driver
//!  reconnect ──────┘                     └──────────┬───────────┘
//!                                                   │ send_replace
//!  status() ◄──────────── watch::Sender<ConnectionStatus> ◄┘
//! ```
//!
//! # Examples
//!
//! ```
//! use poslink_terminal::manager::ConnectionManager;
//! use poslink_terminal::mock::MockTerminal;
//!
//! #[tokio::main]
//! async fn main() -> poslink_core::Result<()> {
//!     let (terminal, handle) = MockTerminal::new();
//!     handle.add_port("/dev/ttyACM0", Some("Pax"));
//!
//!     let manager = ConnectionManager::new(terminal);
//!     manager.connect("/dev/ttyACM0").await?;
//!
//!     let status = manager.status();
//!     assert!(status.connected);
//!     assert_eq!(status.path.as_deref(), Some("/dev/ttyACM0"));
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use poslink_core::{Error, Result};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, watch};
use tracing::{debug, info, warn};

use crate::traits::TerminalDriver;
use crate::types::LinkInfo;

/// The active link to the terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub path: String,
    pub established_at: DateTime<Utc>,
    pub link: LinkInfo,
}

/// Point-in-time view of the connection, safe to read without the command
/// lock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub path: Option<String>,
    pub established_at: Option<DateTime<Utc>>,
}

impl ConnectionStatus {
    fn from_connection(connection: Option<&Connection>) -> Self {
        match connection {
            Some(connection) => Self {
                connected: true,
                path: Some(connection.path.clone()),
                established_at: Some(connection.established_at),
            },
            None => Self::default(),
        }
    }
}

/// Result of a disconnect request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// A connection existed and was cleared.
    Closed { path: String },

    /// There was no connection.
    NothingToClose,
}

/// Owner of the terminal connection.
///
/// Construct one per process and share it through an `Arc`.
#[derive(Debug)]
pub struct ConnectionManager<D> {
    driver: Arc<D>,
    connection: Mutex<Option<Connection>>,
    status_tx: watch::Sender<ConnectionStatus>,
}

impl<D: TerminalDriver> ConnectionManager<D> {
    /// Create a manager that owns `driver`.
    pub fn new(driver: D) -> Self {
        Self::with_shared_driver(Arc::new(driver))
    }

    /// Create a manager over a driver that is also used elsewhere (for port
    /// discovery).
    pub fn with_shared_driver(driver: Arc<D>) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::default());
        Self {
            driver,
            connection: Mutex::new(None),
            status_tx,
        }
    }

    pub fn driver(&self) -> &Arc<D> {
        &self.driver
    }

    /// Acquire exclusive access to the connection and the terminal.
    ///
    /// A second caller waits until the returned session is dropped.
    pub async fn session(&self) -> TerminalSession<'_, D> {
        TerminalSession {
            slot: self.connection.lock().await,
            driver: &self.driver,
            status_tx: &self.status_tx,
        }
    }

    /// Replace any existing connection with a new one on `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty path and
    /// [`Error::DeviceUnavailable`] if the driver cannot open the port.
    pub async fn connect(&self, path: &str) -> Result<Connection> {
        self.session().await.connect(path).await
    }

    /// Close the connection, if any. Never fails.
    pub async fn disconnect(&self) -> DisconnectOutcome {
        self.session().await.disconnect().await
    }

    /// Latest committed connection state.
    pub fn status(&self) -> ConnectionStatus {
        self.status_tx.borrow().clone()
    }

    /// Subscribe to connection state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }
}

/// Exclusive access to the terminal, obtained from
/// [`ConnectionManager::session`].
pub struct TerminalSession<'a, D> {
    slot: MutexGuard<'a, Option<Connection>>,
    driver: &'a D,
    status_tx: &'a watch::Sender<ConnectionStatus>,
}

impl<D: TerminalDriver> TerminalSession<'_, D> {
    pub fn is_connected(&self) -> bool {
        self.slot.is_some()
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.slot.as_ref()
    }

    /// The driver, for issuing commands while the session is held.
    pub fn driver(&self) -> &D {
        self.driver
    }

    /// Open a connection on `path`, closing any existing one first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty path and
    /// [`Error::DeviceUnavailable`] if the driver cannot open the port. A
    /// failed attempt leaves the session disconnected.
    pub async fn connect(&mut self, path: &str) -> Result<Connection> {
        let path = path.trim();
        if path.is_empty() {
            return Err(Error::invalid_input("Port path must not be empty"));
        }

        if self.slot.is_some() {
            self.disconnect().await;
        }

        debug!(path, "Opening terminal connection");
        match self.driver.connect(path).await {
            Ok(link) => {
                let connection = Connection {
                    path: path.to_string(),
                    established_at: Utc::now(),
                    link,
                };
                *self.slot = Some(connection.clone());
                self.publish();
                info!(path, "Terminal connected");
                Ok(connection)
            }
            Err(error) => {
                debug!(path, error = %error, "Terminal connection failed");
                Err(Error::device_unavailable(path, error.to_string()))
            }
        }
    }

    /// Close the connection, if any.
    ///
    /// Driver errors are logged; the connection is cleared regardless.
    pub async fn disconnect(&mut self) -> DisconnectOutcome {
        let Some(connection) = self.slot.take() else {
            debug!("No terminal connection to close");
            return DisconnectOutcome::NothingToClose;
        };
        self.publish();

        match self.driver.disconnect().await {
            Ok(()) => info!(path = %connection.path, "Terminal disconnected"),
            Err(error) => warn!(
                path = %connection.path,
                error = %error,
                "Terminal disconnect reported an error"
            ),
        }
        DisconnectOutcome::Closed {
            path: connection.path,
        }
    }

    fn publish(&self) {
        self.status_tx
            .send_replace(ConnectionStatus::from_connection(self.slot.as_ref()));
    }
}
