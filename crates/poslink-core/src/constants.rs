//! Defaults and fixed values shared across the bridge.
//!
//! Defaults apply when the matching environment variable is unset (see
//! [`BridgeConfig`](crate::BridgeConfig)). The ticket and response-code values
//! are fixed by the terminal and must not change.

// ============================================================================
// Connection defaults
// ============================================================================

/// Serial path tried first on every connection cycle.
pub const DEFAULT_PORT_PATH: &str = "/dev/ttyACM0";

/// Whole-cycle connection attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Fixed delay between connection cycles, in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 5000;

/// Baud rate handed to the driver. Not interpreted by the bridge.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Substring identifying terminal ports during the fallback scan.
///
/// USB CDC-ACM devices enumerate as `/dev/ttyACM*` on Linux.
///
/// # Examples
///
/// ```
/// use poslink_core::constants::DEFAULT_PORT_PATTERN;
///
/// assert!("/dev/ttyACM1".contains(DEFAULT_PORT_PATTERN));
/// assert!(!"/dev/ttyS0".contains(DEFAULT_PORT_PATTERN));
/// ```
pub const DEFAULT_PORT_PATTERN: &str = "ACM";

/// Manufacturer substring that marks a port as recommended.
pub const DEFAULT_VENDOR_HINT: &str = "Pax";

// ============================================================================
// Process defaults
// ============================================================================

/// HTTP control surface listen address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Upper bound on the HTTP drain during shutdown, in milliseconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5000;

// ============================================================================
// Terminal conventions
// ============================================================================

/// Length of the ticket field the terminal accepts.
pub const TICKET_LENGTH: usize = 20;

/// Character used to right-pad ticket references.
pub const TICKET_PAD_CHAR: char = '0';

/// Response code reported for an approved operation.
pub const RESPONSE_CODE_APPROVED: &str = "00";

/// Response code reported when a reply carried no parsable code.
pub const RESPONSE_CODE_UNKNOWN: &str = "UNKNOWN";

/// Message type reported for a last transaction whose frame was not decoded.
pub const DEFAULT_MESSAGE_TYPE: &str = "0210";

/// Manufacturer reported for ports without identity metadata.
pub const UNKNOWN_MANUFACTURER: &str = "unknown";
