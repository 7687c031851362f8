//! Mock payment terminal for testing and development.
//!
//! The mock simulates a terminal attached to a set of serial ports. Tests
//! control it through a [`MockTerminalHandle`]: which ports exist and open,
//! which commands fail and how, how long commands take. Every driver call is
//! recorded so tests can assert on exactly what reached the device.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use poslink_core::TransactionKind;
use poslink_core::constants::RESPONSE_CODE_APPROVED;

use crate::error::{DriverError, Result};
use crate::traits::TerminalDriver;
use crate::types::{
    CloseOptions, LastSaleResponse, LinkInfo, PortInfo, TerminalReply, TransactionResponse,
};

/// Commerce code reported by the mock in administrative replies.
const MOCK_COMMERCE_CODE: &str = "597000000001";

/// Terminal id reported by the mock in administrative replies.
const MOCK_TERMINAL_ID: &str = "MOCK0001";

/// Message type of the frames the mock fabricates for sales and refunds.
const MOCK_MESSAGE_TYPE: &str = "0210";

/// A driver call as seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Connect(String),
    Disconnect,
    ListPorts,
    Sale { amount: u64, ticket: String },
    Refund { amount: u64, operation_number: String },
    CloseDay(CloseOptions),
    LoadKeys,
    LastSale,
}

impl MockCall {
    /// Command family of a terminal command; `None` for link management calls.
    pub fn kind(&self) -> Option<TransactionKind> {
        match self {
            MockCall::Sale { .. } => Some(TransactionKind::Sale),
            MockCall::Refund { .. } => Some(TransactionKind::Refund),
            MockCall::CloseDay(_) => Some(TransactionKind::Close),
            MockCall::LoadKeys => Some(TransactionKind::KeyLoad),
            MockCall::LastSale => Some(TransactionKind::LastQuery),
            MockCall::Connect(_) | MockCall::Disconnect | MockCall::ListPorts => None,
        }
    }
}

#[derive(Debug, Clone)]
struct MockPort {
    info: PortInfo,
    available: bool,
}

#[derive(Debug, Default)]
struct MockState {
    ports: Vec<MockPort>,
    connected: Option<String>,
    failures: HashMap<TransactionKind, VecDeque<DriverError>>,
    responses: VecDeque<TransactionResponse>,
    list_ports_failure: Option<DriverError>,
    calls: Vec<MockCall>,
    in_flight: usize,
    peak_in_flight: usize,
    link_changes_in_flight: usize,
    command_delay: Duration,
    next_operation: u64,
    last_sale: Option<LastSaleResponse>,
}

impl MockState {
    fn begin(&mut self) {
        self.in_flight += 1;
        self.peak_in_flight = self.peak_in_flight.max(self.in_flight);
    }

    fn record_link_change(&mut self, call: MockCall) {
        if self.in_flight > 0 {
            self.link_changes_in_flight += 1;
        }
        self.calls.push(call);
    }

    fn end(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    fn take_failure(&mut self, kind: TransactionKind) -> Option<DriverError> {
        self.failures.get_mut(&kind).and_then(VecDeque::pop_front)
    }

    fn next_operation_number(&mut self) -> String {
        self.next_operation += 1;
        format!("{:06}", self.next_operation)
    }

    fn transaction_reply(&mut self, amount: u64, ticket: &str) -> TransactionResponse {
        let mut response = self.responses.pop_front().unwrap_or_else(|| {
            let mut approved = TransactionResponse::new(RESPONSE_CODE_APPROVED, "Aprobado");
            approved.authorization_code = Some(format!("A{:05}", self.next_operation + 1));
            approved.card_last_digits = Some("4242".to_string());
            approved.card_type = Some("CR".to_string());
            approved
        });
        if response.operation_number.is_none() {
            response.operation_number = Some(self.next_operation_number());
        }
        response.amount.get_or_insert(amount);
        response.ticket.get_or_insert_with(|| ticket.to_string());
        response.real_date.get_or_insert_with(Utc::now);
        let message_type = response
            .message_type
            .get_or_insert_with(|| MOCK_MESSAGE_TYPE.to_string())
            .clone();
        let operation_number = response.operation_number.clone().unwrap_or_default();
        if response.raw.is_none() {
            response.raw = Some(format!(
                "{message_type}|{}|{operation_number}|{amount}",
                response.response_code
            ));
        }
        if response.raw_fields.is_empty() {
            response.raw_fields = [
                ("response_code", response.response_code.clone()),
                ("operation_number", operation_number),
                ("amount", amount.to_string()),
                ("ticket", ticket.to_string()),
            ]
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        }

        self.last_sale = Some(LastSaleResponse {
            operation_number: response.operation_number.clone(),
            raw_response: response.raw.clone(),
            parsed: Some(response.clone()),
        });
        response
    }

    fn admin_reply(&self, message: &str) -> TerminalReply {
        TerminalReply {
            response_code: RESPONSE_CODE_APPROVED.to_string(),
            response_message: message.to_string(),
            commerce_code: Some(MOCK_COMMERCE_CODE.to_string()),
            terminal_id: Some(MOCK_TERMINAL_ID.to_string()),
        }
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock payment terminal.
///
/// A fresh mock has no ports; add them through the handle.
///
/// # Examples
///
/// ```
/// use poslink_terminal::mock::MockTerminal;
/// use poslink_terminal::traits::TerminalDriver;
///
/// #[tokio::main]
/// async fn main() -> poslink_terminal::Result<()> {
///     let (terminal, handle) = MockTerminal::new();
///     handle.add_port("/dev/ttyACM0", Some("Pax"));
///
///     terminal.connect("/dev/ttyACM0").await?;
///     let response = terminal.sale(1000, "TCK10000000000000000").await?;
///
///     assert!(response.is_approved());
///     assert_eq!(handle.connected_port().as_deref(), Some("/dev/ttyACM0"));
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockTerminal {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl MockTerminal {
    /// Create a new mock terminal with the default name.
    pub fn new() -> (Self, MockTerminalHandle) {
        Self::with_name("Mock Terminal")
    }

    /// Create a new mock terminal with a custom name.
    pub fn with_name(name: impl Into<String>) -> (Self, MockTerminalHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let terminal = Self {
            name: name.into(),
            state: Arc::clone(&state),
        };
        (terminal, MockTerminalHandle { state })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs one terminal command: records it, checks the link, waits the
    /// configured delay and then either pops a scripted failure or builds the
    /// reply.
    async fn command<T>(
        &self,
        call: MockCall,
        reply: impl FnOnce(&mut MockState) -> T + Send,
    ) -> Result<T> {
        let kind = call.kind();
        let delay = {
            let mut state = lock(&self.state);
            state.calls.push(call);
            if state.connected.is_none() {
                return Err(DriverError::not_connected());
            }
            state.begin();
            state.command_delay
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = lock(&self.state);
        state.end();
        if let Some(error) = kind.and_then(|kind| state.take_failure(kind)) {
            return Err(error);
        }
        Ok(reply(&mut state))
    }
}

impl Default for MockTerminal {
    fn default() -> Self {
        Self::new().0
    }
}

impl TerminalDriver for MockTerminal {
    async fn connect(&self, path: &str) -> Result<LinkInfo> {
        let mut state = lock(&self.state);
        state.record_link_change(MockCall::Connect(path.to_string()));

        let available = state
            .ports
            .iter()
            .any(|port| port.info.path == path && port.available);
        if !available {
            return Err(DriverError::port_unavailable(path, "No such device"));
        }

        state.connected = Some(path.to_string());
        Ok(LinkInfo::new(path).with_detail(self.name.clone()))
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = lock(&self.state);
        state.record_link_change(MockCall::Disconnect);
        state.connected = None;
        Ok(())
    }

    async fn list_ports(&self) -> Result<Vec<PortInfo>> {
        let mut state = lock(&self.state);
        state.calls.push(MockCall::ListPorts);
        if let Some(error) = state.list_ports_failure.clone() {
            return Err(error);
        }
        Ok(state.ports.iter().map(|port| port.info.clone()).collect())
    }

    async fn sale(&self, amount: u64, ticket: &str) -> Result<TransactionResponse> {
        let call = MockCall::Sale {
            amount,
            ticket: ticket.to_string(),
        };
        let ticket = ticket.to_string();
        self.command(call, move |state| state.transaction_reply(amount, &ticket))
            .await
    }

    async fn refund(&self, amount: u64, operation_number: &str) -> Result<TransactionResponse> {
        let call = MockCall::Refund {
            amount,
            operation_number: operation_number.to_string(),
        };
        let reference = operation_number.to_string();
        self.command(call, move |state| {
            state.transaction_reply(amount, &reference)
        })
        .await
    }

    async fn close_day(&self, options: CloseOptions) -> Result<TerminalReply> {
        self.command(MockCall::CloseDay(options), |state| {
            state.admin_reply("Cierre exitoso")
        })
        .await
    }

    async fn load_keys(&self) -> Result<TerminalReply> {
        self.command(MockCall::LoadKeys, |state| {
            state.admin_reply("Carga de llaves exitosa")
        })
        .await
    }

    async fn get_last_sale(&self) -> Result<LastSaleResponse> {
        self.command(MockCall::LastSale, |state| {
            state.last_sale.clone().unwrap_or_default()
        })
        .await
    }
}

/// Handle for controlling a mock terminal.
///
/// Cloneable; all clones control the same terminal.
#[derive(Debug, Clone)]
pub struct MockTerminalHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockTerminalHandle {
    /// Register an openable port.
    pub fn add_port(&self, path: &str, manufacturer: Option<&str>) {
        let mut info = PortInfo::new(path);
        info.manufacturer = manufacturer.map(str::to_string);
        self.add_port_info(info);
    }

    /// Register an openable port with full identity metadata.
    pub fn add_port_info(&self, info: PortInfo) {
        let mut state = lock(&self.state);
        state.ports.retain(|port| port.info.path != info.path);
        state.ports.push(MockPort {
            info,
            available: true,
        });
    }

    /// Register a port that is listed but cannot be opened.
    pub fn add_unavailable_port(&self, path: &str, manufacturer: Option<&str>) {
        self.add_port(path, manufacturer);
        self.set_port_available(path, false);
    }

    /// Make a registered port openable or not.
    pub fn set_port_available(&self, path: &str, available: bool) {
        let mut state = lock(&self.state);
        for port in state.ports.iter_mut().filter(|port| port.info.path == path) {
            port.available = available;
        }
    }

    /// Fail the next command of `kind` with `error`. Failures queue up.
    pub fn fail_next(&self, kind: TransactionKind, error: DriverError) {
        lock(&self.state)
            .failures
            .entry(kind)
            .or_default()
            .push_back(error);
    }

    /// Reply to the next sale or refund with `response` instead of an approval.
    pub fn respond_next(&self, response: TransactionResponse) {
        lock(&self.state).responses.push_back(response);
    }

    /// Make port enumeration fail until cleared.
    pub fn fail_port_listing(&self, error: Option<DriverError>) {
        lock(&self.state).list_ports_failure = error;
    }

    /// Delay every terminal command by `delay`.
    pub fn set_command_delay(&self, delay: Duration) {
        lock(&self.state).command_delay = delay;
    }

    /// Override the reply to the last-transaction query.
    pub fn set_last_sale(&self, last_sale: LastSaleResponse) {
        lock(&self.state).last_sale = Some(last_sale);
    }

    /// Drop the link without a disconnect call, as an unplugged cable would.
    pub fn drop_link(&self) {
        lock(&self.state).connected = None;
    }

    /// Path of the open link, if any.
    pub fn connected_port(&self) -> Option<String> {
        lock(&self.state).connected.clone()
    }

    /// Every driver call received so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.state).calls.clone()
    }

    /// Paths passed to `connect`, in order.
    pub fn connect_attempts(&self) -> Vec<String> {
        lock(&self.state)
            .calls
            .iter()
            .filter_map(|call| match call {
                MockCall::Connect(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of `disconnect` calls received.
    pub fn disconnect_count(&self) -> usize {
        self.count(|call| matches!(call, MockCall::Disconnect))
    }

    /// Number of commands of `kind` received (including failed ones).
    pub fn command_count(&self, kind: TransactionKind) -> usize {
        self.count(|call| call.kind() == Some(kind))
    }

    /// Highest number of terminal commands observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        lock(&self.state).peak_in_flight
    }

    /// Number of connect or disconnect calls that arrived while a terminal
    /// command was in flight.
    pub fn link_changes_during_commands(&self) -> usize {
        lock(&self.state).link_changes_in_flight
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    fn count(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        lock(&self.state).calls.iter().filter(|call| predicate(call)).count()
    }
}
