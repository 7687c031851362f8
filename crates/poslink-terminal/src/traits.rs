//! Terminal driver trait definition.
//!
//! [`TerminalDriver`] is the contract between the bridge and whatever speaks
//! to the payment terminal: the serial driver in production and
//! [`MockTerminal`](crate::mock::MockTerminal) in tests and development.
//!
//! Methods take `&self`. Drivers keep their link behind interior mutability,
//! and callers serialize access through
//! [`ConnectionManager`](crate::manager::ConnectionManager); a driver never has
//! to handle two overlapping commands.
//!
//! Methods are declared as returning `impl Future + Send` so that generic
//! callers can spawn them on the multi-threaded runtime. Implementations are
//! free to write plain `async fn`.

use std::future::Future;

use crate::error::Result;
use crate::types::{
    CloseOptions, LastSaleResponse, LinkInfo, PortInfo, TerminalReply, TransactionResponse,
};

/// A payment terminal reachable over a serial link.
pub trait TerminalDriver: Send + Sync + 'static {
    /// Open the link on `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`PortUnavailable`](crate::error::DriverErrorKind::PortUnavailable)
    /// error if the port cannot be opened.
    fn connect(&self, path: &str) -> impl Future<Output = Result<LinkInfo>> + Send;

    /// Close the link. Closing an already closed link is not an error.
    fn disconnect(&self) -> impl Future<Output = Result<()>> + Send;

    /// Enumerate the serial ports visible to the host.
    fn list_ports(&self) -> impl Future<Output = Result<Vec<PortInfo>>> + Send;

    /// Charge `amount` against `ticket`.
    ///
    /// `ticket` is the fixed-width field the terminal expects (see
    /// [`TicketReference::padded`](poslink_core::TicketReference::padded)).
    fn sale(
        &self,
        amount: u64,
        ticket: &str,
    ) -> impl Future<Output = Result<TransactionResponse>> + Send;

    /// Refund `amount` of the operation identified by `operation_number`.
    fn refund(
        &self,
        amount: u64,
        operation_number: &str,
    ) -> impl Future<Output = Result<TransactionResponse>> + Send;

    /// Run the close-of-day settlement.
    fn close_day(
        &self,
        options: CloseOptions,
    ) -> impl Future<Output = Result<TerminalReply>> + Send;

    /// Load the terminal's working keys.
    fn load_keys(&self) -> impl Future<Output = Result<TerminalReply>> + Send;

    /// Fetch the last operation the terminal recorded.
    fn get_last_sale(&self) -> impl Future<Output = Result<LastSaleResponse>> + Send;
}
