//! Retry policy for terminal connection cycles.
//!
//! Pure bookkeeping, no I/O: [`RetryPolicy`] says how many whole connection
//! cycles to run and how long to wait between them, [`RetryState`] counts the
//! cycles of one run.

use std::time::Duration;

use poslink_core::{BridgeConfig, Error, Result};

/// How a reconnect run retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    fallback_scan: bool,
}

impl RetryPolicy {
    /// Create a policy with the fallback scan enabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `max_attempts` is zero.
    pub fn new(max_attempts: u32, delay: Duration) -> Result<Self> {
        if max_attempts == 0 {
            return Err(Error::invalid_input("max_attempts must be greater than zero"));
        }
        Ok(Self {
            max_attempts,
            delay,
            fallback_scan: true,
        })
    }

    /// One cycle, no delay.
    ///
    /// # Examples
    ///
    /// ```
    /// use poslink_recovery::RetryPolicy;
    ///
    /// let policy = RetryPolicy::single_cycle(false);
    /// assert_eq!(policy.max_attempts(), 1);
    /// assert!(!policy.fallback_scan());
    /// ```
    pub fn single_cycle(fallback_scan: bool) -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
            fallback_scan,
        }
    }

    /// Policy described by the bridge configuration.
    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        Self::new(config.max_attempts, config.retry_delay)
    }

    #[must_use]
    pub fn with_fallback_scan(mut self, fallback_scan: bool) -> Self {
        self.fallback_scan = fallback_scan;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn fallback_scan(&self) -> bool {
        self.fallback_scan
    }

    /// Fresh counter for one run.
    pub fn start(&self) -> RetryState {
        RetryState {
            attempt: 0,
            max_attempts: self.max_attempts,
            delay: self.delay,
        }
    }
}

/// Attempt counter of one reconnect run.
///
/// Starts at zero; each [`next_attempt`](RetryState::next_attempt) moves it up
/// by exactly one until `max_attempts` is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
    max_attempts: u32,
    delay: Duration,
}

impl RetryState {
    /// Claim the next attempt number, or `None` once all are used.
    pub fn next_attempt(&mut self) -> Option<u32> {
        if self.is_exhausted() {
            return None;
        }
        self.attempt += 1;
        Some(self.attempt)
    }

    /// Attempts claimed so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn remaining(&self) -> u32 {
        self.max_attempts - self.attempt
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zero_attempts_rejected() {
        assert!(matches!(
            RetryPolicy::new(0, Duration::from_secs(1)),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_state_counts_up_to_max() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10)).unwrap();
        let mut state = policy.start();

        assert_eq!(state.attempt(), 0);
        assert_eq!(state.next_attempt(), Some(1));
        assert_eq!(state.next_attempt(), Some(2));
        assert_eq!(state.remaining(), 1);
        assert_eq!(state.next_attempt(), Some(3));
        assert!(state.is_exhausted());
        assert_eq!(state.next_attempt(), None);
        assert_eq!(state.attempt(), 3);
    }

    #[test]
    fn test_each_run_starts_fresh() {
        let policy = RetryPolicy::new(2, Duration::ZERO).unwrap();
        let mut first = policy.start();
        while first.next_attempt().is_some() {}

        assert_eq!(policy.start().attempt(), 0);
    }

    #[test]
    fn test_from_config() {
        let config = BridgeConfig::default().with_retry(4, Duration::from_millis(250));
        let policy = RetryPolicy::from_config(&config).unwrap();
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.delay(), Duration::from_millis(250));
        assert!(policy.fallback_scan());
    }

    proptest! {
        #[test]
        fn prop_attempts_never_exceed_max(max in 1u32..200, extra in 0usize..50) {
            let policy = RetryPolicy::new(max, Duration::ZERO).unwrap();
            let mut state = policy.start();
            let mut previous = 0;
            let mut granted = 0;

            for _ in 0..(max as usize + extra) {
                if let Some(attempt) = state.next_attempt() {
                    prop_assert_eq!(attempt, previous + 1);
                    previous = attempt;
                    granted += 1;
                }
                prop_assert!(state.attempt() <= max);
            }
            prop_assert_eq!(granted, max);
        }
    }
}
