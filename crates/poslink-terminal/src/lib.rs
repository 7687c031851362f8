//! Payment terminal access layer for the POS link bridge.
//!
//! This crate owns everything between the bridge and the terminal device:
//! the [`TerminalDriver`] contract, typed driver errors, a controllable
//! [`MockTerminal`], the serial-port driver, port discovery and the
//! [`ConnectionManager`] that guards the single terminal connection.
//!
//! # Design
//!
//! - **Async-first**: driver methods return `Send` futures so callers can run
//!   them from any Tokio task.
//! - **Enum dispatch**: [`AnyTerminalDriver`] selects a driver at runtime
//!   without trait objects.
//! - **Typed failures**: [`DriverError`] carries a [`DriverErrorKind`]; the
//!   busy class is decided by kind, not message text.
//! - **One connection**: the [`ConnectionManager`] serializes link changes and
//!   terminal commands through one async mutex and publishes status snapshots
//!   on a watch channel.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use poslink_terminal::discovery::{PortDiscovery, PortSignature};
//! use poslink_terminal::manager::ConnectionManager;
//! use poslink_terminal::mock::MockTerminal;
//! use poslink_terminal::traits::TerminalDriver;
//!
//! #[tokio::main]
//! async fn main() -> poslink_core::Result<()> {
//!     let (terminal, handle) = MockTerminal::new();
//!     handle.add_port("/dev/ttyACM0", Some("Pax"));
//!
//!     let driver = Arc::new(terminal);
//!     let discovery = PortDiscovery::new(Arc::clone(&driver), PortSignature::default());
//!     let manager = ConnectionManager::with_shared_driver(driver);
//!
//!     let port = discovery.list().await.remove(0);
//!     manager.connect(&port.path).await?;
//!
//!     let session = manager.session().await;
//!     let reply = session.driver().load_keys().await?;
//!     assert!(reply.is_approved());
//!     Ok(())
//! }
//! ```

pub mod devices;
pub mod discovery;
pub mod error;
pub mod manager;
pub mod mock;
#[cfg(feature = "hardware-serial")]
pub mod serial;
pub mod traits;
pub mod types;

pub use devices::AnyTerminalDriver;
pub use discovery::{PortCandidate, PortDiscovery, PortSignature};
pub use error::{DriverError, DriverErrorKind, Result};
pub use manager::{
    Connection, ConnectionManager, ConnectionStatus, DisconnectOutcome, TerminalSession,
};
pub use mock::{MockCall, MockTerminal, MockTerminalHandle};
#[cfg(feature = "hardware-serial")]
pub use serial::SerialTerminal;
pub use traits::TerminalDriver;
pub use types::{
    CloseOptions, LastSaleResponse, LinkInfo, PortInfo, TerminalReply, TransactionResponse,
};
