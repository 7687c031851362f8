//! Serial port discovery.
//!
//! [`PortDiscovery`] asks the driver for the ports the operating system sees
//! and annotates each with whether it looks like a payment terminal. It never
//! fails: an enumeration error is logged and reported as "no ports".

use std::sync::Arc;

use poslink_core::constants::{DEFAULT_PORT_PATTERN, DEFAULT_VENDOR_HINT, UNKNOWN_MANUFACTURER};
use serde::Serialize;
use tracing::{debug, warn};

use crate::traits::TerminalDriver;
use crate::types::PortInfo;

/// What a terminal port looks like: a path naming pattern and a manufacturer
/// substring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSignature {
    path_pattern: String,
    vendor_hint: String,
}

impl PortSignature {
    pub fn new(path_pattern: impl Into<String>, vendor_hint: impl Into<String>) -> Self {
        Self {
            path_pattern: path_pattern.into(),
            vendor_hint: vendor_hint.into(),
        }
    }

    pub fn path_pattern(&self) -> &str {
        &self.path_pattern
    }

    pub fn vendor_hint(&self) -> &str {
        &self.vendor_hint
    }

    /// Returns `true` if `path` follows the terminal naming pattern.
    ///
    /// # Examples
    ///
    /// ```
    /// use poslink_terminal::discovery::PortSignature;
    ///
    /// let signature = PortSignature::default();
    /// assert!(signature.matches_pattern("/dev/ttyACM1"));
    /// assert!(!signature.matches_pattern("/dev/ttyUSB0"));
    /// ```
    pub fn matches_pattern(&self, path: &str) -> bool {
        path.contains(&self.path_pattern)
    }

    /// Returns `true` if the port's manufacturer carries the vendor hint or
    /// its path follows the naming pattern.
    pub fn is_recommended(&self, port: &PortInfo) -> bool {
        let vendor_match = port
            .manufacturer
            .as_deref()
            .is_some_and(|manufacturer| manufacturer.contains(&self.vendor_hint));
        vendor_match || self.matches_pattern(&port.path)
    }
}

impl Default for PortSignature {
    fn default() -> Self {
        Self::new(DEFAULT_PORT_PATTERN, DEFAULT_VENDOR_HINT)
    }
}

/// A discovered port, annotated for selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortCandidate {
    pub path: String,
    /// Reported manufacturer, or `"unknown"`.
    pub manufacturer: String,
    pub recommended: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vid: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u16>,
}

impl PortCandidate {
    fn from_port(port: PortInfo, signature: &PortSignature) -> Self {
        let recommended = signature.is_recommended(&port);
        Self {
            path: port.path,
            manufacturer: port
                .manufacturer
                .unwrap_or_else(|| UNKNOWN_MANUFACTURER.to_string()),
            recommended,
            product: port.product,
            serial_number: port.serial_number,
            vid: port.vid,
            pid: port.pid,
        }
    }
}

/// Enumerates candidate terminal ports through a driver.
#[derive(Debug)]
pub struct PortDiscovery<D> {
    driver: Arc<D>,
    signature: PortSignature,
}

impl<D> Clone for PortDiscovery<D> {
    fn clone(&self) -> Self {
        Self {
            driver: Arc::clone(&self.driver),
            signature: self.signature.clone(),
        }
    }
}

impl<D: TerminalDriver> PortDiscovery<D> {
    pub fn new(driver: Arc<D>, signature: PortSignature) -> Self {
        Self { driver, signature }
    }

    pub fn signature(&self) -> &PortSignature {
        &self.signature
    }

    /// Shorthand for `self.signature().matches_pattern(path)`.
    pub fn matches_pattern(&self, path: &str) -> bool {
        self.signature.matches_pattern(path)
    }

    /// List every visible port. Order follows the operating system and is not
    /// guaranteed.
    pub async fn list(&self) -> Vec<PortCandidate> {
        match self.driver.list_ports().await {
            Ok(ports) => {
                let candidates: Vec<PortCandidate> = ports
                    .into_iter()
                    .map(|port| PortCandidate::from_port(port, &self.signature))
                    .collect();
                debug!(count = candidates.len(), "Enumerated serial ports");
                candidates
            }
            Err(error) => {
                warn!(error = %error, "Serial port enumeration failed");
                Vec::new()
            }
        }
    }

    /// Ports worth trying after `preferred` failed: those following the
    /// naming pattern, excluding `preferred` itself, in discovery order.
    pub async fn fallback_candidates(&self, preferred: &str) -> Vec<PortCandidate> {
        self.list()
            .await
            .into_iter()
            .filter(|candidate| candidate.path != preferred)
            .filter(|candidate| self.signature.matches_pattern(&candidate.path))
            .collect()
    }
}
