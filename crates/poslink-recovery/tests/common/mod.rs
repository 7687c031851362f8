//! Shared fixture for recovery integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use poslink_recovery::{ReconnectOrchestrator, RetryPolicy, TransactionGuard};
use poslink_terminal::{
    ConnectionManager, MockTerminal, MockTerminalHandle, PortDiscovery, PortSignature,
};

pub const PREFERRED: &str = "/dev/ttyACM0";

pub struct Bridge {
    pub manager: Arc<ConnectionManager<MockTerminal>>,
    pub orchestrator: Arc<ReconnectOrchestrator<MockTerminal>>,
    pub guard: TransactionGuard<MockTerminal>,
    pub handle: MockTerminalHandle,
}

impl Bridge {
    pub fn new(preferred: &str, max_attempts: u32, delay: Duration) -> Self {
        let (terminal, handle) = MockTerminal::new();
        let driver = Arc::new(terminal);
        let manager = Arc::new(ConnectionManager::with_shared_driver(Arc::clone(&driver)));
        let discovery = PortDiscovery::new(driver, PortSignature::default());
        let policy = RetryPolicy::new(max_attempts, delay).expect("valid policy");
        let orchestrator = Arc::new(ReconnectOrchestrator::new(
            Arc::clone(&manager),
            discovery,
            preferred,
            policy,
        ));
        let guard = TransactionGuard::new(Arc::clone(&orchestrator));

        Self {
            manager,
            orchestrator,
            guard,
            handle,
        }
    }

    /// Bridge on the default port with a quick single-attempt policy.
    pub fn single() -> Self {
        Self::new(PREFERRED, 1, Duration::from_millis(10))
    }

    /// Register the preferred port and connect to it.
    pub async fn connected() -> Self {
        let bridge = Self::single();
        bridge.handle.add_port(PREFERRED, Some("Pax"));
        bridge
            .manager
            .connect(PREFERRED)
            .await
            .expect("preferred port connects");
        bridge.handle.clear_calls();
        bridge
    }
}
