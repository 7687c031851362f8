//! Shared fixture for control surface tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use poslink_core::{BridgeConfig, DriverKind};
use poslink_network::{ControlState, router};
use poslink_recovery::{ReconnectOrchestrator, TransactionGuard};
use poslink_terminal::{ConnectionManager, MockTerminal, MockTerminalHandle};
use serde_json::Value;
use tower::ServiceExt;

pub const PREFERRED: &str = "/dev/ttyACM0";

pub struct App {
    pub router: Router,
    pub state: ControlState<MockTerminal>,
    pub handle: MockTerminalHandle,
}

impl App {
    /// Bridge on the default port with a single quick attempt per run.
    pub fn new() -> Self {
        let config = Arc::new(
            BridgeConfig::default()
                .with_preferred_port(PREFERRED)
                .with_retry(1, Duration::from_millis(10))
                .with_driver(DriverKind::Mock),
        );
        let (terminal, handle) = MockTerminal::new();
        let manager = Arc::new(ConnectionManager::new(terminal));
        let orchestrator =
            Arc::new(ReconnectOrchestrator::from_config(manager, &config).expect("valid config"));
        let state = ControlState::new(config, TransactionGuard::new(orchestrator));

        Self {
            router: router(state.clone()),
            state,
            handle,
        }
    }

    /// Register the preferred port and connect to it.
    pub async fn connected() -> Self {
        let app = Self::new();
        app.handle.add_port(PREFERRED, Some("Pax"));
        app.state
            .manager()
            .connect(PREFERRED)
            .await
            .expect("preferred port connects");
        app.handle.clear_calls();
        app
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn post_raw(&self, uri: &str, body: &'static str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap();
        (status, json)
    }
}
