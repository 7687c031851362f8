use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Boundary errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Connection errors
    #[error("Device unavailable at {path}: {reason}")]
    DeviceUnavailable { path: String, reason: String },

    /// The terminal still holds an unresolved exchange. The message is the
    /// driver's own text, passed through untouched.
    #[error("{message}")]
    DeviceBusy { message: String },

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    // Lifecycle errors
    #[error("Shutdown drain exceeded {timeout_ms}ms")]
    ShutdownTimeout { timeout_ms: u64 },

    #[error("Fatal fault: {0}")]
    Fatal(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Driver passthrough
    #[error("{message}")]
    Driver {
        message: String,
        response_code: Option<String>,
    },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing configuration key: {0}")]
    MissingConfig(String),
}

impl Error {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn device_unavailable(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn device_busy(message: impl Into<String>) -> Self {
        Self::DeviceBusy {
            message: message.into(),
        }
    }

    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::ConnectionLost(message.into())
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn driver(message: impl Into<String>, response_code: Option<String>) -> Self {
        Self::Driver {
            message: message.into(),
            response_code,
        }
    }

    /// Stable machine-readable code, used in HTTP error envelopes.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::DeviceUnavailable { .. } => "DEVICE_UNAVAILABLE",
            Error::DeviceBusy { .. } => "DEVICE_BUSY",
            Error::ConnectionLost(_) => "CONNECTION_LOST",
            Error::ShutdownTimeout { .. } => "SHUTDOWN_TIMEOUT",
            Error::Fatal(_) => "FATAL",
            Error::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            Error::Driver { .. } => "DRIVER_ERROR",
            Error::Config(_) | Error::MissingConfig(_) => "CONFIG_ERROR",
        }
    }

    /// Terminal response code attached to a driver failure, if any.
    #[must_use]
    pub fn response_code(&self) -> Option<&str> {
        match self {
            Error::Driver { response_code, .. } => response_code.as_deref(),
            _ => None,
        }
    }

    /// Returns `true` for faults that must terminate the process.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
