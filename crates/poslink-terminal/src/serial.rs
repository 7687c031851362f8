//! Serial port backed terminal driver.
//!
//! [`SerialTerminal`] owns the operating system side of the link: port
//! enumeration, opening and closing. Blocking `serialport` calls run on the
//! blocking thread pool.
//!
//! Transaction commands need a vendor protocol adapter on top of the open
//! port. Without one they report
//! [`DriverErrorKind::Unsupported`](crate::error::DriverErrorKind::Unsupported)
//! once the link is up, so the bridge can still be deployed to verify wiring.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serialport::{SerialPort, SerialPortType};
use tracing::debug;

use crate::error::{DriverError, DriverErrorKind, Result};
use crate::traits::TerminalDriver;
use crate::types::{
    CloseOptions, LastSaleResponse, LinkInfo, PortInfo, TerminalReply, TransactionResponse,
};

/// Read/write timeout applied to the opened port.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_millis(2000);

type PortSlot = Option<Box<dyn SerialPort>>;

/// Terminal attached to a local serial port.
pub struct SerialTerminal {
    baud_rate: u32,
    io_timeout: Duration,
    port: Mutex<PortSlot>,
}

impl std::fmt::Debug for SerialTerminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTerminal")
            .field("baud_rate", &self.baud_rate)
            .field("io_timeout", &self.io_timeout)
            .field("open", &self.lock().is_some())
            .finish()
    }
}

impl SerialTerminal {
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            io_timeout: DEFAULT_IO_TIMEOUT,
            port: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn lock(&self) -> MutexGuard<'_, PortSlot> {
        self.port.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Error for a transaction command issued to the bare serial link.
    fn command_error(&self, operation: &str) -> DriverError {
        if self.lock().is_none() {
            DriverError::not_connected()
        } else {
            DriverError::unsupported(operation)
        }
    }
}

async fn blocking<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|error| DriverError::new(DriverErrorKind::Io, error.to_string()))?
}

fn port_info(port: serialport::SerialPortInfo) -> PortInfo {
    let mut info = PortInfo::new(port.port_name);
    if let SerialPortType::UsbPort(usb) = port.port_type {
        info.manufacturer = usb.manufacturer;
        info.product = usb.product;
        info.serial_number = usb.serial_number;
        info.vid = Some(usb.vid);
        info.pid = Some(usb.pid);
    }
    info
}

impl TerminalDriver for SerialTerminal {
    async fn connect(&self, path: &str) -> Result<LinkInfo> {
        let owned_path = path.to_string();
        let baud_rate = self.baud_rate;
        let io_timeout = self.io_timeout;

        let port = blocking(move || {
            serialport::new(&owned_path, baud_rate)
                .timeout(io_timeout)
                .open()
                .map_err(|error| DriverError::port_unavailable(&owned_path, error))
        })
        .await?;

        let detail = port.name();
        // A previous handle, if any, is dropped (closed) here.
        *self.lock() = Some(port);
        debug!(path, baud_rate, "Serial port opened");

        let mut link = LinkInfo::new(path).with_baud_rate(baud_rate);
        link.detail = detail;
        Ok(link)
    }

    async fn disconnect(&self) -> Result<()> {
        if self.lock().take().is_some() {
            debug!("Serial port closed");
        }
        Ok(())
    }

    async fn list_ports(&self) -> Result<Vec<PortInfo>> {
        blocking(|| {
            serialport::available_ports()
                .map(|ports| ports.into_iter().map(port_info).collect())
                .map_err(|error| {
                    DriverError::new(
                        DriverErrorKind::Io,
                        format!("Failed to list ports: {error}"),
                    )
                })
        })
        .await
    }

    async fn sale(&self, _amount: u64, _ticket: &str) -> Result<TransactionResponse> {
        Err(self.command_error("sale"))
    }

    async fn refund(&self, _amount: u64, _operation_number: &str) -> Result<TransactionResponse> {
        Err(self.command_error("refund"))
    }

    async fn close_day(&self, _options: CloseOptions) -> Result<TerminalReply> {
        Err(self.command_error("close_day"))
    }

    async fn load_keys(&self) -> Result<TerminalReply> {
        Err(self.command_error("load_keys"))
    }

    async fn get_last_sale(&self) -> Result<LastSaleResponse> {
        Err(self.command_error("get_last_sale"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commands_require_open_port() {
        let terminal = SerialTerminal::new(115_200);
        let error = terminal.sale(1000, "TCK1").await.unwrap_err();
        assert_eq!(error.kind(), DriverErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn test_connect_missing_port() {
        let terminal = SerialTerminal::new(115_200).with_io_timeout(Duration::from_millis(50));
        let error = terminal
            .connect("/dev/poslink-does-not-exist")
            .await
            .unwrap_err();
        assert_eq!(error.kind(), DriverErrorKind::PortUnavailable);
        assert!(error.message().contains("/dev/poslink-does-not-exist"));
    }

    #[tokio::test]
    async fn test_disconnect_without_port() {
        let terminal = SerialTerminal::new(9600);
        assert!(terminal.disconnect().await.is_ok());
    }
}
