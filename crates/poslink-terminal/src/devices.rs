//! Enum wrapper for terminal driver dispatch.
//!
//! Traits returning `impl Future` are not object safe, so `Box<dyn
//! TerminalDriver>` is not available. [`AnyTerminalDriver`] gives the binary a
//! single concrete type to select a driver at runtime, with the serial variant
//! behind the `hardware-serial` feature.
//!
//! # Examples
//!
//! ```
//! use poslink_terminal::devices::AnyTerminalDriver;
//! use poslink_terminal::mock::MockTerminal;
//! use poslink_terminal::traits::TerminalDriver;
//!
//! #[tokio::main]
//! async fn main() -> poslink_terminal::Result<()> {
//!     let (terminal, handle) = MockTerminal::new();
//!     handle.add_port("/dev/ttyACM0", None);
//!
//!     let driver = AnyTerminalDriver::Mock(terminal);
//!     assert_eq!(driver.list_ports().await?.len(), 1);
//!     Ok(())
//! }
//! ```

use crate::Result;
use crate::mock::MockTerminal;
#[cfg(feature = "hardware-serial")]
use crate::serial::SerialTerminal;
use crate::traits::TerminalDriver;
use crate::types::{
    CloseOptions, LastSaleResponse, LinkInfo, PortInfo, TerminalReply, TransactionResponse,
};

/// Runtime-selected terminal driver.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyTerminalDriver {
    /// In-process simulated terminal.
    Mock(MockTerminal),

    /// Local serial port.
    #[cfg(feature = "hardware-serial")]
    Serial(SerialTerminal),
}

impl AnyTerminalDriver {
    /// Short driver name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            AnyTerminalDriver::Mock(_) => "mock",
            #[cfg(feature = "hardware-serial")]
            AnyTerminalDriver::Serial(_) => "serial",
        }
    }
}

impl TerminalDriver for AnyTerminalDriver {
    async fn connect(&self, path: &str) -> Result<LinkInfo> {
        match self {
            AnyTerminalDriver::Mock(driver) => driver.connect(path).await,
            #[cfg(feature = "hardware-serial")]
            AnyTerminalDriver::Serial(driver) => driver.connect(path).await,
        }
    }

    async fn disconnect(&self) -> Result<()> {
        match self {
            AnyTerminalDriver::Mock(driver) => driver.disconnect().await,
            #[cfg(feature = "hardware-serial")]
            AnyTerminalDriver::Serial(driver) => driver.disconnect().await,
        }
    }

    async fn list_ports(&self) -> Result<Vec<PortInfo>> {
        match self {
            AnyTerminalDriver::Mock(driver) => driver.list_ports().await,
            #[cfg(feature = "hardware-serial")]
            AnyTerminalDriver::Serial(driver) => driver.list_ports().await,
        }
    }

    async fn sale(&self, amount: u64, ticket: &str) -> Result<TransactionResponse> {
        match self {
            AnyTerminalDriver::Mock(driver) => driver.sale(amount, ticket).await,
            #[cfg(feature = "hardware-serial")]
            AnyTerminalDriver::Serial(driver) => driver.sale(amount, ticket).await,
        }
    }

    async fn refund(&self, amount: u64, operation_number: &str) -> Result<TransactionResponse> {
        match self {
            AnyTerminalDriver::Mock(driver) => driver.refund(amount, operation_number).await,
            #[cfg(feature = "hardware-serial")]
            AnyTerminalDriver::Serial(driver) => driver.refund(amount, operation_number).await,
        }
    }

    async fn close_day(&self, options: CloseOptions) -> Result<TerminalReply> {
        match self {
            AnyTerminalDriver::Mock(driver) => driver.close_day(options).await,
            #[cfg(feature = "hardware-serial")]
            AnyTerminalDriver::Serial(driver) => driver.close_day(options).await,
        }
    }

    async fn load_keys(&self) -> Result<TerminalReply> {
        match self {
            AnyTerminalDriver::Mock(driver) => driver.load_keys().await,
            #[cfg(feature = "hardware-serial")]
            AnyTerminalDriver::Serial(driver) => driver.load_keys().await,
        }
    }

    async fn get_last_sale(&self) -> Result<LastSaleResponse> {
        match self {
            AnyTerminalDriver::Mock(driver) => driver.get_last_sale().await,
            #[cfg(feature = "hardware-serial")]
            AnyTerminalDriver::Serial(driver) => driver.get_last_sale().await,
        }
    }
}

impl From<MockTerminal> for AnyTerminalDriver {
    fn from(driver: MockTerminal) -> Self {
        AnyTerminalDriver::Mock(driver)
    }
}

#[cfg(feature = "hardware-serial")]
impl From<SerialTerminal> for AnyTerminalDriver {
    fn from(driver: SerialTerminal) -> Self {
        AnyTerminalDriver::Serial(driver)
    }
}
