//! Guarded execution of terminal commands.
//!
//! Every command goes through [`TransactionGuard::execute`], which holds the
//! terminal session for the whole exchange:
//!
//! 1. If there is no connection, run one reconnect cycle (with fallback scan).
//!    If that fails, report `ConnectionLost` without touching the device.
//! 2. Send the command.
//! 3. If the terminal reports an unresolved previous exchange (the busy
//!    class), force one disconnect and one reconnect cycle on the preferred
//!    port, then report the busy error. The command is not retried.
//!
//! A command that finds the link gone clears the stale connection before
//! reporting `ConnectionLost`, so the next command starts with a reconnect.
//! Other failures are returned as they are.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use poslink_core::constants::{DEFAULT_MESSAGE_TYPE, RESPONSE_CODE_APPROVED, RESPONSE_CODE_UNKNOWN};
use poslink_core::{Amount, Error, Result, TicketReference, TransactionKind, TransactionOutcome};
use poslink_terminal::{
    CloseOptions, DriverErrorKind, LastSaleResponse, TerminalDriver, TerminalReply,
    TransactionResponse,
};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::orchestrator::ReconnectOrchestrator;

/// A command for the terminal, with validated arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCommand {
    Sale {
        amount: Amount,
        ticket: TicketReference,
    },
    Refund {
        amount: Amount,
        operation_number: TicketReference,
    },
    CloseDay {
        print_report: bool,
    },
    LoadKeys,
    LastQuery,
}

impl TerminalCommand {
    pub fn kind(&self) -> TransactionKind {
        match self {
            TerminalCommand::Sale { .. } => TransactionKind::Sale,
            TerminalCommand::Refund { .. } => TransactionKind::Refund,
            TerminalCommand::CloseDay { .. } => TransactionKind::Close,
            TerminalCommand::LoadKeys => TransactionKind::KeyLoad,
            TerminalCommand::LastQuery => TransactionKind::LastQuery,
        }
    }

    pub fn amount(&self) -> Option<Amount> {
        match self {
            TerminalCommand::Sale { amount, .. } | TerminalCommand::Refund { amount, .. } => {
                Some(*amount)
            }
            _ => None,
        }
    }

    /// Caller reference: the ticket or original operation number, or the
    /// command name for administrative commands.
    pub fn reference(&self) -> String {
        match self {
            TerminalCommand::Sale { ticket, .. } => ticket.to_string(),
            TerminalCommand::Refund {
                operation_number, ..
            } => operation_number.to_string(),
            other => other.kind().to_string(),
        }
    }
}

/// What the terminal answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CommandOutput {
    Transaction(TransactionResponse),
    Reply(TerminalReply),
    LastSale(LastSaleResponse),
}

impl CommandOutput {
    /// Outcome implied by the terminal's answer.
    pub fn outcome(&self) -> TransactionOutcome {
        let approved = match self {
            CommandOutput::Transaction(response) => response.is_approved(),
            CommandOutput::Reply(reply) => reply.is_approved(),
            CommandOutput::LastSale(_) => true,
        };
        if approved {
            TransactionOutcome::Approved
        } else {
            TransactionOutcome::Declined
        }
    }
}

/// Record of one command, from submission to outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionAttempt {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub amount: Option<Amount>,
    pub reference: String,
    pub started_at: DateTime<Utc>,
    outcome: TransactionOutcome,
}

impl TransactionAttempt {
    pub fn new(command: &TerminalCommand) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: command.kind(),
            amount: command.amount(),
            reference: command.reference(),
            started_at: Utc::now(),
            outcome: TransactionOutcome::Pending,
        }
    }

    pub fn outcome(&self) -> TransactionOutcome {
        self.outcome
    }

    /// Set the final outcome. Only the first resolution counts.
    pub fn resolve(&mut self, outcome: TransactionOutcome) -> bool {
        if self.outcome.is_resolved() {
            return false;
        }
        self.outcome = outcome;
        true
    }

    fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }
}

impl fmt::Display for TransactionAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.kind, self.id, self.outcome)
    }
}

/// Shaped answer of the last-transaction query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastTransaction {
    pub raw: Option<String>,
    pub parsed: Option<TransactionResponse>,
    pub approved: bool,
    pub response_code: String,
    pub operation_number: Option<String>,
    pub message: String,
    /// Message type of the decoded frame, `"0210"` when nothing was decoded.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Decoded frame fields; empty when nothing was decoded.
    pub fields: BTreeMap<String, String>,
    pub has_raw_data: bool,
}

impl LastTransaction {
    /// Shape the driver's reply. Raw framing is never parsed here.
    pub fn from_response(response: LastSaleResponse) -> Self {
        let has_raw_data = response
            .raw_response
            .as_deref()
            .is_some_and(|raw| !raw.trim().is_empty());
        let parsed = response.parsed;

        let approved = parsed
            .as_ref()
            .is_some_and(|parsed| parsed.response_code == RESPONSE_CODE_APPROVED);
        let response_code = parsed
            .as_ref()
            .map(|parsed| parsed.response_code.clone())
            .filter(|code| !code.is_empty())
            .unwrap_or_else(|| RESPONSE_CODE_UNKNOWN.to_string());
        let operation_number = parsed
            .as_ref()
            .and_then(|parsed| parsed.operation_number.clone())
            .or(response.operation_number);
        let message = match (&parsed, has_raw_data) {
            (Some(parsed), _) => parsed.response_message.clone(),
            (None, true) => "Response received without parsed fields".to_string(),
            (None, false) => "No last transaction data".to_string(),
        };
        let message_type = parsed
            .as_ref()
            .and_then(|parsed| parsed.message_type.clone())
            .filter(|kind| !kind.is_empty())
            .unwrap_or_else(|| DEFAULT_MESSAGE_TYPE.to_string());
        let fields = parsed
            .as_ref()
            .map(|parsed| parsed.raw_fields.clone())
            .unwrap_or_default();

        Self {
            raw: response.raw_response,
            parsed,
            approved,
            response_code,
            operation_number,
            message,
            message_type,
            fields,
            has_raw_data,
        }
    }

    /// One-line description for the response envelope.
    pub fn summary(&self) -> &'static str {
        match (self.parsed.is_some(), self.has_raw_data) {
            (true, _) => "Last transaction retrieved",
            (false, true) => "Last transaction retrieved but not parsed",
            (false, false) => "No last transaction information available",
        }
    }
}

/// Serializes terminal commands and applies the busy recovery rule.
#[derive(Debug)]
pub struct TransactionGuard<D> {
    orchestrator: Arc<ReconnectOrchestrator<D>>,
}

impl<D> Clone for TransactionGuard<D> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: Arc::clone(&self.orchestrator),
        }
    }
}

impl<D: TerminalDriver> TransactionGuard<D> {
    pub fn new(orchestrator: Arc<ReconnectOrchestrator<D>>) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &Arc<ReconnectOrchestrator<D>> {
        &self.orchestrator
    }

    /// Run `command` against the terminal.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionLost`] if there is no connection and one cycle
    ///   could not establish it
    /// - [`Error::DeviceBusy`] if the terminal reported an unresolved previous
    ///   exchange (after the forced reconnect)
    /// - [`Error::Driver`] for any other driver failure, unchanged
    pub async fn execute(&self, command: TerminalCommand) -> Result<CommandOutput> {
        let mut attempt = TransactionAttempt::new(&command);
        info!(
            attempt_id = %attempt.id,
            kind = %attempt.kind,
            amount = attempt.amount.map(|amount| amount.value()),
            reference = %attempt.reference,
            "Terminal command started"
        );

        let mut session = self.orchestrator.manager().session().await;

        if !session.is_connected() {
            warn!(attempt_id = %attempt.id, "Terminal not connected, attempting reconnect");
            if self.orchestrator.run_cycle(&mut session, true).await.is_none() {
                attempt.resolve(TransactionOutcome::ConnectionLost);
                warn!(
                    attempt_id = %attempt.id,
                    outcome = %attempt.outcome(),
                    "Terminal command not sent"
                );
                return Err(Error::connection_lost(
                    "Terminal is not connected and reconnection failed",
                ));
            }
        }

        let result = dispatch(session.driver(), &command).await;

        match result {
            Ok(output) => {
                attempt.resolve(output.outcome());
                info!(
                    attempt_id = %attempt.id,
                    kind = %attempt.kind,
                    outcome = %attempt.outcome(),
                    elapsed_ms = attempt.elapsed_ms(),
                    "Terminal command finished"
                );
                Ok(output)
            }
            Err(error) if error.is_busy() => {
                warn!(
                    attempt_id = %attempt.id,
                    error = %error,
                    "Terminal busy with a previous exchange, forcing reconnect"
                );
                session.disconnect().await;
                let recovered = self.orchestrator.run_cycle(&mut session, false).await;

                let outcome = if recovered.is_some() {
                    TransactionOutcome::DeviceBusy
                } else {
                    TransactionOutcome::ConnectionLost
                };
                attempt.resolve(outcome);
                warn!(
                    attempt_id = %attempt.id,
                    outcome = %attempt.outcome(),
                    reconnected = recovered.is_some(),
                    "Terminal command aborted"
                );
                Err(error.into())
            }
            Err(error) => {
                let outcome = match error.kind() {
                    DriverErrorKind::Declined => TransactionOutcome::Declined,
                    DriverErrorKind::NotConnected => {
                        // The link is gone; clear it so the next command reconnects.
                        session.disconnect().await;
                        TransactionOutcome::ConnectionLost
                    }
                    _ => TransactionOutcome::Failed,
                };
                attempt.resolve(outcome);
                warn!(
                    attempt_id = %attempt.id,
                    kind = %attempt.kind,
                    outcome = %attempt.outcome(),
                    error = %error,
                    "Terminal command failed"
                );
                Err(error.into())
            }
        }
    }

    /// Charge `amount` against `ticket`.
    pub async fn sale(&self, amount: Amount, ticket: TicketReference) -> Result<TransactionResponse> {
        match self.execute(TerminalCommand::Sale { amount, ticket }).await? {
            CommandOutput::Transaction(response) => Ok(response),
            other => Err(unexpected_output(TransactionKind::Sale, &other)),
        }
    }

    /// Refund `amount` of a previous operation.
    pub async fn refund(
        &self,
        amount: Amount,
        operation_number: TicketReference,
    ) -> Result<TransactionResponse> {
        let command = TerminalCommand::Refund {
            amount,
            operation_number,
        };
        match self.execute(command).await? {
            CommandOutput::Transaction(response) => Ok(response),
            other => Err(unexpected_output(TransactionKind::Refund, &other)),
        }
    }

    /// Close of day.
    pub async fn close_day(&self, print_report: bool) -> Result<TerminalReply> {
        match self.execute(TerminalCommand::CloseDay { print_report }).await? {
            CommandOutput::Reply(reply) => Ok(reply),
            other => Err(unexpected_output(TransactionKind::Close, &other)),
        }
    }

    /// Load the terminal's working keys.
    pub async fn load_keys(&self) -> Result<TerminalReply> {
        match self.execute(TerminalCommand::LoadKeys).await? {
            CommandOutput::Reply(reply) => Ok(reply),
            other => Err(unexpected_output(TransactionKind::KeyLoad, &other)),
        }
    }

    /// Last operation recorded by the terminal.
    pub async fn last_transaction(&self) -> Result<LastTransaction> {
        match self.execute(TerminalCommand::LastQuery).await? {
            CommandOutput::LastSale(response) => Ok(LastTransaction::from_response(response)),
            other => Err(unexpected_output(TransactionKind::LastQuery, &other)),
        }
    }
}

async fn dispatch<D: TerminalDriver>(
    driver: &D,
    command: &TerminalCommand,
) -> poslink_terminal::Result<CommandOutput> {
    match command {
        TerminalCommand::Sale { amount, ticket } => driver
            .sale(amount.value(), &ticket.padded())
            .await
            .map(CommandOutput::Transaction),
        TerminalCommand::Refund {
            amount,
            operation_number,
        } => driver
            .refund(amount.value(), &operation_number.padded())
            .await
            .map(CommandOutput::Transaction),
        TerminalCommand::CloseDay { print_report } => driver
            .close_day(CloseOptions {
                print_on_pos: *print_report,
            })
            .await
            .map(CommandOutput::Reply),
        TerminalCommand::LoadKeys => driver.load_keys().await.map(CommandOutput::Reply),
        TerminalCommand::LastQuery => driver.get_last_sale().await.map(CommandOutput::LastSale),
    }
}

fn unexpected_output(kind: TransactionKind, output: &CommandOutput) -> Error {
    Error::Fatal(format!("Unexpected {kind} output: {output:?}"))
}
