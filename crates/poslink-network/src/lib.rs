//! HTTP control surface and process shutdown for the POS link bridge.
//!
//! # Components
//!
//! - **[`router`]**: axum routes for terminal management (`/terminal/*`) and
//!   payment commands (`/payment/*`), traced with `tower-http`.
//! - **[`ControlServer`]**: binds the listener and serves plain HTTP, or
//!   HTTPS through `axum-server` once [`load_tls`] has read a certificate
//!   pair, with graceful shutdown either way.
//! - **[`ShutdownCoordinator`]**: runs the bounded drain, terminal disconnect
//!   and exit-code decision once per process.
//! - **[`response`]**: success and error envelopes, and the mapping from the
//!   bridge error taxonomy to HTTP status codes.

pub mod handlers;
pub mod response;
pub mod server;
pub mod shutdown;

pub use response::{ApiError, ApiResult, ErrorBody, Success, status_for};
pub use server::{ControlServer, ControlServerError, ControlState, load_tls, router};
pub use shutdown::{ShutdownCoordinator, ShutdownOutcome, ShutdownReason};
