//! Data exchanged with terminal drivers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use poslink_core::constants::RESPONSE_CODE_APPROVED;
use serde::{Deserialize, Serialize};

/// Details of an opened link, as reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInfo {
    /// Serial path the link is bound to.
    pub path: String,

    /// Line speed, when the driver configures one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baud_rate: Option<u32>,

    /// Free-form driver detail (firmware string, device name).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl LinkInfo {
    /// Create link info for the given path.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: None,
            detail: None,
        }
    }

    /// Set the line speed.
    #[must_use]
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = Some(baud_rate);
        self
    }

    /// Set the driver detail.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// A serial port as enumerated by the operating system.
///
/// Identity fields are only present for USB devices that report them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub path: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

impl PortInfo {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    #[must_use]
    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.vid = Some(vid);
        self.pid = Some(pid);
        self
    }
}

/// Reply to a sale or refund.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResponse {
    /// Two-digit terminal response code (`"00"` means approved).
    pub response_code: String,
    pub response_message: String,
    pub operation_number: Option<String>,
    pub authorization_code: Option<String>,
    pub amount: Option<u64>,
    pub ticket: Option<String>,
    pub card_last_digits: Option<String>,
    pub card_type: Option<String>,
    pub accounting_date: Option<String>,
    pub real_date: Option<DateTime<Utc>>,

    /// Unparsed terminal frame, when the driver keeps it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,

    /// Frame message type, such as `"0210"` for a sale reply.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,

    /// Frame fields by name, as decoded by the driver.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub raw_fields: BTreeMap<String, String>,
}

impl TransactionResponse {
    /// Create a response with the given code and message.
    pub fn new(response_code: impl Into<String>, response_message: impl Into<String>) -> Self {
        Self {
            response_code: response_code.into(),
            response_message: response_message.into(),
            ..Self::default()
        }
    }

    /// Returns `true` if the terminal approved the operation.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.response_code == RESPONSE_CODE_APPROVED
    }
}

/// Reply to an administrative command (close of day, key load).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalReply {
    pub response_code: String,
    pub response_message: String,
    pub commerce_code: Option<String>,
    pub terminal_id: Option<String>,
}

impl TerminalReply {
    pub fn new(response_code: impl Into<String>, response_message: impl Into<String>) -> Self {
        Self {
            response_code: response_code.into(),
            response_message: response_message.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.response_code == RESPONSE_CODE_APPROVED
    }
}

/// Options for the close-of-day command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseOptions {
    /// Print the day report on the terminal's own printer.
    pub print_on_pos: bool,
}

impl Default for CloseOptions {
    fn default() -> Self {
        Self { print_on_pos: true }
    }
}

/// Reply to the last-transaction query.
///
/// Terminals return the last operation as a raw frame; drivers parse it when
/// they can.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSaleResponse {
    pub operation_number: Option<String>,
    pub raw_response: Option<String>,
    pub parsed: Option<TransactionResponse>,
}
