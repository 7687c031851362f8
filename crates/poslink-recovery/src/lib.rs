//! Connection recovery and guarded command execution for the POS link bridge.
//!
//! This crate holds the logic that keeps the terminal usable: the retry
//! policy, the reconnect state machine, the transaction guard that applies
//! the busy recovery rule, and the startup sequence.

pub mod guard;
pub mod orchestrator;
pub mod retry;
pub mod startup;

pub use guard::{
    CommandOutput, LastTransaction, TerminalCommand, TransactionAttempt, TransactionGuard,
};
pub use orchestrator::{ReconnectOrchestrator, ReconnectReport, ReconnectState, StateTransition};
pub use retry::{RetryPolicy, RetryState};
pub use startup::{StartupReport, run_startup};
