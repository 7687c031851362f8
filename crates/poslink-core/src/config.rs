//! Process configuration sourced from the environment.
//!
//! Values are read once at startup and treated as immutable afterwards. Every
//! key is optional; unset keys fall back to the defaults in
//! [`constants`](crate::constants). A key that is set but cannot be parsed is
//! a configuration error rather than a silent fallback.
//!
//! # Example
//!
//! ```
//! use poslink_core::BridgeConfig;
//!
//! let config = BridgeConfig::from_lookup(|key| match key {
//!     "POSLINK_PORT_PATH" => Some("/dev/ttyACM1".to_string()),
//!     "POSLINK_CONNECTION_RETRIES" => Some("3".to_string()),
//!     _ => None,
//! })
//! .unwrap();
//!
//! assert_eq!(config.preferred_port, "/dev/ttyACM1");
//! assert_eq!(config.max_attempts, 3);
//! ```

use crate::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_BIND_ADDR, DEFAULT_MAX_ATTEMPTS, DEFAULT_PORT_PATH,
    DEFAULT_PORT_PATTERN, DEFAULT_RETRY_DELAY_MS, DEFAULT_SHUTDOWN_TIMEOUT_MS,
    DEFAULT_VENDOR_HINT,
};
use crate::{Error, Result};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_PORT_PATH: &str = "POSLINK_PORT_PATH";
pub const ENV_CONNECTION_RETRIES: &str = "POSLINK_CONNECTION_RETRIES";
pub const ENV_RETRY_DELAY_MS: &str = "POSLINK_RETRY_DELAY_MS";
pub const ENV_BAUD_RATE: &str = "POSLINK_BAUD_RATE";
pub const ENV_PORT_PATTERN: &str = "POSLINK_PORT_PATTERN";
pub const ENV_VENDOR_HINT: &str = "POSLINK_VENDOR_HINT";
pub const ENV_BIND_ADDR: &str = "POSLINK_BIND_ADDR";
pub const ENV_SHUTDOWN_TIMEOUT_MS: &str = "POSLINK_SHUTDOWN_TIMEOUT_MS";
pub const ENV_DRIVER: &str = "POSLINK_DRIVER";
pub const ENV_COMMERCE_CODE: &str = "POSLINK_COMMERCE_CODE";
pub const ENV_TERMINAL_ID: &str = "POSLINK_TERMINAL_ID";
pub const ENV_TLS_CERT: &str = "POSLINK_TLS_CERT";
pub const ENV_TLS_KEY: &str = "POSLINK_TLS_KEY";

/// PEM files for serving the control surface over HTTPS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl TlsPaths {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }
}

/// Which terminal driver backs the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriverKind {
    /// Physical terminal on a serial port.
    #[default]
    Serial,
    /// In-process simulated terminal.
    Mock,
}

impl FromStr for DriverKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serial" => Ok(DriverKind::Serial),
            "mock" => Ok(DriverKind::Mock),
            other => Err(Error::Config(format!(
                "{ENV_DRIVER} must be 'serial' or 'mock', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverKind::Serial => write!(f, "serial"),
            DriverKind::Mock => write!(f, "mock"),
        }
    }
}

/// Bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Serial path tried first on every connection cycle.
    pub preferred_port: String,

    /// Whole-cycle connection attempts per orchestration run (> 0).
    pub max_attempts: u32,

    /// Fixed delay between cycles.
    pub retry_delay: Duration,

    /// Baud rate passed through to the driver.
    pub baud_rate: u32,

    /// Path substring used to pick fallback candidates.
    pub port_pattern: String,

    /// Manufacturer substring marking a recommended port.
    pub vendor_hint: String,

    /// HTTP listen address.
    pub bind_addr: SocketAddr,

    /// Upper bound on the HTTP drain during shutdown.
    pub shutdown_timeout: Duration,

    /// Terminal driver selection.
    pub driver: DriverKind,

    /// Merchant code, informational only.
    pub commerce_code: Option<String>,

    /// Terminal identifier, informational only.
    pub terminal_id: Option<String>,

    /// Certificate and key for HTTPS; plain HTTP when unset.
    pub tls: Option<TlsPaths>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            preferred_port: DEFAULT_PORT_PATH.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            baud_rate: DEFAULT_BAUD_RATE,
            port_pattern: DEFAULT_PORT_PATTERN.to_string(),
            vendor_hint: DEFAULT_VENDOR_HINT.to_string(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            shutdown_timeout: Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS),
            driver: DriverKind::default(),
            commerce_code: None,
            terminal_id: None,
            tls: None,
        }
    }
}

impl BridgeConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    /// Returns `Error::Config` if a variable is set to an unparsable value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    /// Returns `Error::Config` if a value cannot be parsed or fails validation,
    /// and `Error::MissingConfig` if only one of the TLS certificate and key
    /// is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            preferred_port: get(ENV_PORT_PATH).unwrap_or(defaults.preferred_port),
            max_attempts: parse_or(
                get(ENV_CONNECTION_RETRIES),
                ENV_CONNECTION_RETRIES,
                defaults.max_attempts,
            )?,
            retry_delay: parse_or(
                get(ENV_RETRY_DELAY_MS),
                ENV_RETRY_DELAY_MS,
                DEFAULT_RETRY_DELAY_MS,
            )
            .map(Duration::from_millis)?,
            baud_rate: parse_or(get(ENV_BAUD_RATE), ENV_BAUD_RATE, defaults.baud_rate)?,
            port_pattern: get(ENV_PORT_PATTERN).unwrap_or(defaults.port_pattern),
            vendor_hint: get(ENV_VENDOR_HINT).unwrap_or(defaults.vendor_hint),
            bind_addr: match get(ENV_BIND_ADDR) {
                Some(raw) => parse_value(&raw, ENV_BIND_ADDR)?,
                None => parse_value(DEFAULT_BIND_ADDR, ENV_BIND_ADDR)?,
            },
            shutdown_timeout: parse_or(
                get(ENV_SHUTDOWN_TIMEOUT_MS),
                ENV_SHUTDOWN_TIMEOUT_MS,
                DEFAULT_SHUTDOWN_TIMEOUT_MS,
            )
            .map(Duration::from_millis)?,
            driver: match get(ENV_DRIVER) {
                Some(raw) => raw.parse()?,
                None => defaults.driver,
            },
            commerce_code: get(ENV_COMMERCE_CODE),
            terminal_id: get(ENV_TERMINAL_ID),
            tls: match (get(ENV_TLS_CERT), get(ENV_TLS_KEY)) {
                (Some(cert), Some(key)) => Some(TlsPaths::new(cert.trim(), key.trim())),
                (Some(_), None) => return Err(Error::MissingConfig(ENV_TLS_KEY.to_string())),
                (None, Some(_)) => return Err(Error::MissingConfig(ENV_TLS_CERT.to_string())),
                (None, None) => None,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    /// Returns `Error::Config` if the preferred port is empty or the attempt
    /// count is zero.
    pub fn validate(&self) -> Result<()> {
        if self.preferred_port.trim().is_empty() {
            return Err(Error::Config(format!("{ENV_PORT_PATH} must not be empty")));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config(format!(
                "{ENV_CONNECTION_RETRIES} must be greater than zero"
            )));
        }
        Ok(())
    }

    /// Set the preferred port.
    pub fn with_preferred_port(mut self, path: impl Into<String>) -> Self {
        self.preferred_port = path.into();
        self
    }

    /// Set the attempt budget and inter-cycle delay.
    pub fn with_retry(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.retry_delay = delay;
        self
    }

    /// Set the shutdown drain bound.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Serve the control surface over HTTPS.
    pub fn with_tls(mut self, tls: TlsPaths) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Set the driver selection.
    pub fn with_driver(mut self, driver: DriverKind) -> Self {
        self.driver = driver;
        self
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    match raw {
        Some(raw) => parse_value(&raw, key),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(raw: &str, key: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key} has invalid value '{raw}'")))
}
