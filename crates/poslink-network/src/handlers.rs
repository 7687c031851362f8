//! Route handlers.
//!
//! Handlers validate request bodies, call into the connection manager,
//! orchestrator or transaction guard, and shape the answer. Validation
//! failures never reach the terminal. Guard errors pass through
//! [`ControlState::escalate`], so a fatal fault also stops the process.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use chrono::{DateTime, Utc};
use poslink_core::{Amount, Error, TicketReference};
use poslink_recovery::LastTransaction;
use poslink_terminal::{PortCandidate, TerminalDriver, TerminalReply, TransactionResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::response::{ApiError, ApiResult, STATUS_SUCCESS, Success, success};
use crate::server::ControlState;

// ============================================================================
// Request bodies
// ============================================================================

/// Amount as sent by clients: a JSON integer or a numeric string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AmountField {
    Integer(i64),
    Text(String),
    Other(Value),
}

impl AmountField {
    fn into_amount(self) -> poslink_core::Result<Amount> {
        let invalid = || Error::invalid_input("amount must be a positive integer");
        match self {
            AmountField::Integer(value) => Amount::try_from(value).map_err(|_| invalid()),
            AmountField::Text(text) => text.parse().map_err(|_| invalid()),
            AmountField::Other(_) => Err(invalid()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaleRequest {
    #[serde(default)]
    pub amount: Option<AmountField>,
    #[serde(default)]
    pub ticket_number: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefundRequest {
    #[serde(default)]
    pub amount: Option<AmountField>,
    #[serde(default)]
    pub original_operation_number: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CloseRequest {
    #[serde(default = "default_print_report")]
    pub print_report: bool,
}

impl Default for CloseRequest {
    fn default() -> Self {
        Self {
            print_report: default_print_report(),
        }
    }
}

fn default_print_report() -> bool {
    true
}

fn required_amount(field: Option<AmountField>) -> poslink_core::Result<Amount> {
    field
        .ok_or_else(|| Error::invalid_input("amount is required"))?
        .into_amount()
}

fn ticket_number(value: Option<Value>) -> poslink_core::Result<TicketReference> {
    let invalid = || Error::invalid_input("ticket_number must be a non-empty string");
    match value {
        Some(Value::String(text)) => TicketReference::new(&text).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
        None => Err(Error::invalid_input("ticket_number is required")),
    }
}

fn operation_number(value: Option<Value>) -> poslink_core::Result<TicketReference> {
    let missing = || Error::invalid_input("original_operation_number is required");
    match value {
        Some(Value::String(text)) => TicketReference::new(&text).map_err(|_| missing()),
        Some(Value::Number(number)) => match number.as_u64() {
            Some(value) => TicketReference::new(&value.to_string()),
            None => Err(Error::invalid_input(
                "original_operation_number must be a non-negative integer",
            )),
        },
        _ => Err(missing()),
    }
}

// ============================================================================
// Terminal routes
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct PortEntry {
    #[serde(flatten)]
    pub candidate: PortCandidate,
    pub is_current: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortsResponse {
    pub status: &'static str,
    pub ports: Vec<PortEntry>,
    pub baud_rate: u32,
}

/// `GET /terminal/ports`
pub async fn list_ports<D: TerminalDriver>(
    State(state): State<ControlState<D>>,
) -> Json<PortsResponse> {
    let current = state.manager().status().path;
    let ports = state
        .discovery()
        .list()
        .await
        .into_iter()
        .map(|candidate| PortEntry {
            is_current: current.as_deref() == Some(candidate.path.as_str()),
            candidate,
        })
        .collect();

    Json(PortsResponse {
        status: STATUS_SUCCESS,
        ports,
        baud_rate: state.config().baud_rate,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectResponse {
    pub status: &'static str,
    pub message: String,
    pub port: String,
}

/// `POST /terminal/connect`: one attempt on the preferred port.
pub async fn connect<D: TerminalDriver>(
    State(state): State<ControlState<D>>,
) -> ApiResult<Json<ConnectResponse>> {
    let path = state.config().preferred_port.clone();
    info!(path = %path, "Connect requested");

    let connection = state
        .manager()
        .connect(&path)
        .await
        .map_err(|error| ApiError::reconnect(error.to_string()))?;

    Ok(Json(ConnectResponse {
        status: STATUS_SUCCESS,
        message: "Connected to terminal".to_string(),
        port: connection.path,
    }))
}

/// `POST /terminal/reconnect`: one orchestrator cycle including the fallback
/// scan.
pub async fn reconnect<D: TerminalDriver>(
    State(state): State<ControlState<D>>,
) -> ApiResult<Json<ConnectResponse>> {
    info!("Reconnect requested");
    let orchestrator = state.orchestrator();

    let connection = {
        let mut session = state.manager().session().await;
        orchestrator.run_cycle(&mut session, true).await
    };

    match connection {
        Some(connection) => Ok(Json(ConnectResponse {
            status: STATUS_SUCCESS,
            message: "Reconnected to terminal".to_string(),
            port: connection.path,
        })),
        None => Err(ApiError::reconnect(format!(
            "No terminal reachable on {} or fallback ports",
            orchestrator.preferred_port()
        ))),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub connected: bool,
    pub port: Option<String>,
    pub established_at: Option<DateTime<Utc>>,
    pub message: &'static str,
}

/// `GET /terminal/status`
pub async fn status<D: TerminalDriver>(State(state): State<ControlState<D>>) -> Json<StatusResponse> {
    let snapshot = state.manager().status();
    let message = if snapshot.connected {
        "Terminal operational"
    } else {
        "Terminal disconnected"
    };

    Json(StatusResponse {
        status: STATUS_SUCCESS,
        connected: snapshot.connected,
        port: snapshot.path,
        established_at: snapshot.established_at,
        message,
    })
}

// ============================================================================
// Payment routes
// ============================================================================

/// `POST /payment/sale`
pub async fn sale<D: TerminalDriver>(
    State(state): State<ControlState<D>>,
    payload: Result<Json<SaleRequest>, JsonRejection>,
) -> ApiResult<Json<Success<TransactionResponse>>> {
    let Json(request) = payload?;
    let amount = required_amount(request.amount)?;
    let ticket = ticket_number(request.ticket_number)?;
    info!(amount = %amount, reference = %ticket, "Sale requested");

    let response = state
        .guard()
        .sale(amount, ticket)
        .await
        .map_err(|error| state.escalate(error))?;
    let message = if response.is_approved() {
        "Sale approved"
    } else {
        "Sale declined"
    };
    Ok(success(message, response))
}

/// `POST /payment/refund`
pub async fn refund<D: TerminalDriver>(
    State(state): State<ControlState<D>>,
    payload: Result<Json<RefundRequest>, JsonRejection>,
) -> ApiResult<Json<Success<TransactionResponse>>> {
    let Json(request) = payload?;
    let amount = required_amount(request.amount)?;
    let operation = operation_number(request.original_operation_number)?;
    info!(amount = %amount, reference = %operation, "Refund requested");

    let response = state
        .guard()
        .refund(amount, operation)
        .await
        .map_err(|error| state.escalate(error))?;
    let message = if response.is_approved() {
        "Refund approved"
    } else {
        "Refund declined"
    };
    Ok(success(message, response))
}

/// `POST /payment/close`. An empty body closes with the report printed.
pub async fn close_day<D: TerminalDriver>(
    State(state): State<ControlState<D>>,
    body: Bytes,
) -> ApiResult<Json<Success<TerminalReply>>> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        CloseRequest::default()
    } else {
        serde_json::from_slice::<CloseRequest>(&body)
            .map_err(|error| Error::invalid_input(format!("Invalid close request: {error}")))?
    };
    info!(print_report = request.print_report, "Day close requested");

    let reply = state
        .guard()
        .close_day(request.print_report)
        .await
        .map_err(|error| state.escalate(error))?;
    let message = if reply.is_approved() {
        "Day closed"
    } else {
        "Terminal rejected day close"
    };
    Ok(success(message, reply))
}

/// `GET /payment/last`
pub async fn last_transaction<D: TerminalDriver>(
    State(state): State<ControlState<D>>,
) -> ApiResult<Json<Success<LastTransaction>>> {
    let last = state
        .guard()
        .last_transaction()
        .await
        .map_err(|error| state.escalate(error))?;
    Ok(success(last.summary(), last))
}

/// `POST /payment/initialize`: load terminal keys.
pub async fn initialize<D: TerminalDriver>(
    State(state): State<ControlState<D>>,
) -> ApiResult<Json<Success<TerminalReply>>> {
    info!("Key load requested");
    let reply = state
        .guard()
        .load_keys()
        .await
        .map_err(|error| state.escalate(error))?;
    let message = if reply.is_approved() {
        "Terminal keys loaded"
    } else {
        "Terminal rejected key load"
    };
    Ok(success(message, reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn amount_of(value: Value) -> poslink_core::Result<Amount> {
        let request: SaleRequest = serde_json::from_value(json!({ "amount": value })).unwrap();
        required_amount(request.amount)
    }

    #[rstest]
    #[case(json!(1000), 1000)]
    #[case(json!("1000"), 1000)]
    #[case(json!(" 42 "), 42)]
    fn test_amount_accepts_integers_and_numeric_strings(#[case] value: Value, #[case] expected: u64) {
        assert_eq!(amount_of(value).unwrap().value(), expected);
    }

    #[rstest]
    #[case(json!(0))]
    #[case(json!(-5))]
    #[case(json!(12.5))]
    #[case(json!("12.5"))]
    #[case(json!("abc"))]
    #[case(json!(true))]
    #[case(json!(null))]
    fn test_amount_rejects_everything_else(#[case] value: Value) {
        assert!(matches!(amount_of(value), Err(Error::InvalidInput(_))));
    }

    #[rstest]
    #[case(None)]
    #[case(Some(json!("")))]
    #[case(Some(json!(17)))]
    fn test_ticket_number_must_be_non_empty_string(#[case] value: Option<Value>) {
        assert!(matches!(ticket_number(value), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_operation_number_accepts_numbers() {
        assert_eq!(operation_number(Some(json!(42))).unwrap().as_str(), "42");
        assert_eq!(
            operation_number(Some(json!("000042"))).unwrap().as_str(),
            "000042"
        );
        assert!(operation_number(None).is_err());
        assert!(operation_number(Some(json!(null))).is_err());
    }

    #[rstest]
    #[case(json!(-1))]
    #[case(json!(4.2))]
    #[case(json!(1e3))]
    #[case(json!(true))]
    fn test_operation_number_rejects_non_integers(#[case] value: Value) {
        assert!(matches!(
            operation_number(Some(value)),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_operation_number_keeps_surrounding_spaces() {
        let reference = operation_number(Some(json!(" 42"))).unwrap();
        assert_eq!(reference.as_str(), " 42");
        assert_eq!(reference.padded(), " 420000000000000000");
    }

    #[test]
    fn test_close_request_defaults_to_printing() {
        let request: CloseRequest = serde_json::from_str("{}").unwrap();
        assert!(request.print_report);
        assert!(CloseRequest::default().print_report);
    }
}
