use crate::{
    Result,
    constants::{TICKET_LENGTH, TICKET_PAD_CHAR},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction amount in the smallest currency unit (always positive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// Create a new amount with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidInput` if the amount is zero.
    pub fn new(value: u64) -> Result<Self> {
        if value == 0 {
            return Err(Error::invalid_input("Amount must be greater than zero"));
        }
        Ok(Amount(value))
    }

    /// Get the raw amount.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let value: u64 = s
            .trim()
            .parse()
            .map_err(|_| Error::invalid_input(format!("Invalid amount: {s}")))?;
        Amount::new(value)
    }
}

impl TryFrom<i64> for Amount {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        let value = u64::try_from(value)
            .map_err(|_| Error::invalid_input(format!("Amount must be positive, got {value}")))?;
        Amount::new(value)
    }
}

/// Caller-supplied reference for a transaction (ticket or operation number).
///
/// The reference is kept exactly as given, surrounding whitespace included.
/// The terminal receives a derived, fixed-width copy from
/// [`TicketReference::padded`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketReference(String);

impl TicketReference {
    /// Create a new reference with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidInput` if the reference is empty.
    pub fn new(reference: &str) -> Result<Self> {
        if reference.is_empty() {
            return Err(Error::invalid_input("Ticket reference must not be empty"));
        }
        Ok(TicketReference(reference.to_string()))
    }

    /// Get the reference as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Right-pad with zeros and truncate to 20 characters (terminal ticket field).
    #[must_use]
    pub fn padded(&self) -> String {
        self.0
            .chars()
            .chain(std::iter::repeat(TICKET_PAD_CHAR))
            .take(TICKET_LENGTH)
            .collect()
    }
}

impl fmt::Display for TicketReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TicketReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TicketReference::new(s)
    }
}

/// Terminal command family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Sale,
    Refund,
    Close,
    KeyLoad,
    LastQuery,
}

impl TransactionKind {
    /// Returns `true` for commands that move money.
    #[inline]
    #[must_use]
    pub fn is_monetary(self) -> bool {
        matches!(self, TransactionKind::Sale | TransactionKind::Refund)
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransactionKind::Sale => write!(f, "sale"),
            TransactionKind::Refund => write!(f, "refund"),
            TransactionKind::Close => write!(f, "close"),
            TransactionKind::KeyLoad => write!(f, "key_load"),
            TransactionKind::LastQuery => write!(f, "last_query"),
        }
    }
}

/// Lifecycle result of a single terminal command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionOutcome {
    /// Command submitted, no answer yet.
    Pending,
    Approved,
    Declined,
    /// Terminal held an unresolved exchange; a forced reconnect was performed.
    DeviceBusy,
    /// No connection and the reconnect attempt failed.
    ConnectionLost,
    /// Any other driver failure.
    Failed,
}

impl TransactionOutcome {
    /// Returns `true` once the outcome is final.
    #[inline]
    #[must_use]
    pub fn is_resolved(self) -> bool {
        !matches!(self, TransactionOutcome::Pending)
    }
}

impl fmt::Display for TransactionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            TransactionOutcome::Pending => "pending",
            TransactionOutcome::Approved => "approved",
            TransactionOutcome::Declined => "declined",
            TransactionOutcome::DeviceBusy => "device_busy",
            TransactionOutcome::ConnectionLost => "connection_lost",
            TransactionOutcome::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1000", 1000)]
    #[case(" 250 ", 250)]
    #[case("1", 1)]
    fn test_amount_valid(#[case] input: &str, #[case] expected: u64) {
        let amount: Amount = input.parse().unwrap();
        assert_eq!(amount.value(), expected);
    }

    #[rstest]
    #[case("0")]
    #[case("-5")]
    #[case("12.5")]
    #[case("abc")]
    #[case("")]
    fn test_amount_invalid(#[case] input: &str) {
        let result: Result<Amount> = input.parse();
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_amount_from_signed() {
        assert_eq!(Amount::try_from(15_i64).unwrap().value(), 15);
        assert!(Amount::try_from(-1_i64).is_err());
        assert!(Amount::try_from(0_i64).is_err());
    }

    #[rstest]
    #[case("TCK1", "TCK10000000000000000")]
    #[case("12345678901234567890", "12345678901234567890")]
    #[case("1234567890123456789012", "12345678901234567890")]
    #[case(" TCK1 ", " TCK1 00000000000000")]
    #[case("   ", "   00000000000000000")]
    fn test_ticket_padding(#[case] input: &str, #[case] expected: &str) {
        let ticket = TicketReference::new(input).unwrap();
        assert_eq!(ticket.padded(), expected);
        assert_eq!(ticket.as_str(), input);
    }

    #[test]
    fn test_ticket_invalid() {
        assert!(matches!(
            TicketReference::new(""),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_kind_serialization() {
        assert_eq!(TransactionKind::KeyLoad.to_string(), "key_load");
        assert!(TransactionKind::Sale.is_monetary());
        assert!(!TransactionKind::Close.is_monetary());
    }

    #[test]
    fn test_outcome_resolution() {
        assert!(!TransactionOutcome::Pending.is_resolved());
        assert!(TransactionOutcome::DeviceBusy.is_resolved());
        assert_eq!(TransactionOutcome::ConnectionLost.to_string(), "connection_lost");
    }
}
