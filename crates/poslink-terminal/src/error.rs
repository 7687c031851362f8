//! Error types for terminal driver operations.
//!
//! Every failure reported by a driver carries a [`DriverErrorKind`]. Callers
//! branch on the kind, never on message text. Adapters wrapping SDKs that only
//! report free-form messages map them once, at the boundary, through
//! [`DriverError::classify`].

use std::fmt;

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;

/// Message fragment reported when the terminal still expects the reply to an
/// earlier request.
const AWAITING_RESPONSE_SIGNATURE: &str = "still waiting for a response";

/// Message fragment reported when the terminal's reply never arrived.
const RESPONSE_TIMEOUT_SIGNATURE: &str = "not been received";

/// Classification of driver failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum DriverErrorKind {
    /// The port could not be opened (missing, busy, permission denied).
    PortUnavailable,

    /// A command was issued without an open connection.
    NotConnected,

    /// The terminal is still waiting for the reply to a previous exchange.
    AwaitingResponse,

    /// The terminal's reply was not received within the driver's bound.
    ResponseTimeout,

    /// The terminal answered with a non-approval response code.
    Declined,

    /// The driver does not implement the operation.
    Unsupported,

    /// Malformed or unexpected data on the wire.
    Protocol,

    /// Operating system I/O failure.
    Io,
}

impl DriverErrorKind {
    /// Returns `true` for the "prior exchange unresolved" class.
    ///
    /// A terminal in this state rejects new commands until the link is reset.
    #[must_use]
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            DriverErrorKind::AwaitingResponse | DriverErrorKind::ResponseTimeout
        )
    }
}

impl fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DriverErrorKind::PortUnavailable => "port_unavailable",
            DriverErrorKind::NotConnected => "not_connected",
            DriverErrorKind::AwaitingResponse => "awaiting_response",
            DriverErrorKind::ResponseTimeout => "response_timeout",
            DriverErrorKind::Declined => "declined",
            DriverErrorKind::Unsupported => "unsupported",
            DriverErrorKind::Protocol => "protocol",
            DriverErrorKind::Io => "io",
        };
        write!(f, "{s}")
    }
}

/// Error reported by a terminal driver.
///
/// Displays as the driver's own message so that callers surfacing the error
/// show exactly what the terminal reported.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct DriverError {
    kind: DriverErrorKind,
    message: String,
    response_code: Option<String>,
}

impl DriverError {
    /// Create an error of the given kind.
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            response_code: None,
        }
    }

    /// Map a free-form SDK message to a typed error.
    ///
    /// # Examples
    ///
    /// ```
    /// use poslink_terminal::error::{DriverError, DriverErrorKind};
    ///
    /// let error = DriverError::classify("Cannot send: still waiting for a response");
    /// assert_eq!(error.kind(), DriverErrorKind::AwaitingResponse);
    ///
    /// let error = DriverError::classify("ACK has not been received in 2000 ms");
    /// assert_eq!(error.kind(), DriverErrorKind::ResponseTimeout);
    ///
    /// let error = DriverError::classify("LRC mismatch");
    /// assert_eq!(error.kind(), DriverErrorKind::Protocol);
    /// ```
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = if message.contains(AWAITING_RESPONSE_SIGNATURE) {
            DriverErrorKind::AwaitingResponse
        } else if message.contains(RESPONSE_TIMEOUT_SIGNATURE) {
            DriverErrorKind::ResponseTimeout
        } else {
            DriverErrorKind::Protocol
        };
        Self::new(kind, message)
    }

    /// Create a port unavailable error.
    pub fn port_unavailable(path: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            DriverErrorKind::PortUnavailable,
            format!("Cannot open {path}: {reason}"),
        )
    }

    /// Create a not connected error.
    pub fn not_connected() -> Self {
        Self::new(DriverErrorKind::NotConnected, "Terminal is not connected")
    }

    /// Create an awaiting response error.
    pub fn awaiting_response(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::AwaitingResponse, message)
    }

    /// Create a response timeout error.
    pub fn response_timeout(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::ResponseTimeout, message)
    }

    /// Create a declined error carrying the terminal's response code.
    pub fn declined(response_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Declined, message).with_response_code(response_code)
    }

    /// Create an unsupported operation error.
    pub fn unsupported(operation: &str) -> Self {
        Self::new(
            DriverErrorKind::Unsupported,
            format!("Operation not supported by this driver: {operation}"),
        )
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Protocol, message)
    }

    /// Attach the terminal's response code.
    pub fn with_response_code(mut self, response_code: impl Into<String>) -> Self {
        self.response_code = Some(response_code.into());
        self
    }

    pub fn kind(&self) -> DriverErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn response_code(&self) -> Option<&str> {
        self.response_code.as_deref()
    }

    /// Shorthand for `self.kind().is_busy()`.
    pub fn is_busy(&self) -> bool {
        self.kind.is_busy()
    }
}

impl From<std::io::Error> for DriverError {
    fn from(error: std::io::Error) -> Self {
        Self::new(DriverErrorKind::Io, error.to_string())
    }
}

impl From<DriverError> for poslink_core::Error {
    fn from(error: DriverError) -> Self {
        match error.kind {
            kind if kind.is_busy() => poslink_core::Error::device_busy(error.message),
            DriverErrorKind::NotConnected => poslink_core::Error::connection_lost(error.message),
            _ => poslink_core::Error::driver(error.message, error.response_code),
        }
    }
}
