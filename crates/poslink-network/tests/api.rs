//! Control surface routes against the mock terminal.

mod common;

use axum::http::StatusCode;
use common::{App, PREFERRED};
use poslink_core::TransactionKind;
use poslink_terminal::{CloseOptions, DriverError, MockCall, TransactionResponse};
use serde_json::json;

// ============================================================================
// Terminal routes
// ============================================================================

#[tokio::test]
async fn test_status_when_disconnected() {
    let app = App::new();

    let (status, body) = app.get("/terminal/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["connected"], false);
    assert!(body["port"].is_null());
    assert_eq!(body["message"], "Terminal disconnected");
}

#[tokio::test]
async fn test_connect_then_status_reports_port() {
    let app = App::new();
    app.handle.add_port(PREFERRED, Some("Pax"));

    let (status, body) = app.post_raw("/terminal/connect", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["port"], PREFERRED);

    let (_, body) = app.get("/terminal/status").await;
    assert_eq!(body["connected"], true);
    assert_eq!(body["port"], PREFERRED);
    assert_eq!(body["message"], "Terminal operational");
    assert!(body["established_at"].is_string());
}

#[tokio::test]
async fn test_connect_failure_is_reconnect_error() {
    let app = App::new();

    let (status, body) = app.post_raw("/terminal/connect", "").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "error");
    assert_eq!(body["error_code"], "RECONNECT_ERROR");
    // A single attempt, no fallback scan.
    assert_eq!(app.handle.connect_attempts(), vec![PREFERRED]);
}

#[tokio::test]
async fn test_ports_marks_current_and_recommended() {
    let app = App::connected().await;
    app.handle.add_port("/dev/ttyS0", None);

    let (status, body) = app.get("/terminal/ports").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["baud_rate"], 115_200);
    let ports = body["ports"].as_array().unwrap();
    assert_eq!(ports.len(), 2);
    assert_eq!(ports[0]["path"], PREFERRED);
    assert_eq!(ports[0]["recommended"], true);
    assert_eq!(ports[0]["is_current"], true);
    assert_eq!(ports[1]["path"], "/dev/ttyS0");
    assert_eq!(ports[1]["manufacturer"], "unknown");
    assert_eq!(ports[1]["recommended"], false);
    assert_eq!(ports[1]["is_current"], false);
}

#[tokio::test]
async fn test_ports_enumeration_failure_is_empty_list() {
    let app = App::new();
    app.handle.add_port(PREFERRED, Some("Pax"));
    app.handle
        .fail_port_listing(Some(DriverError::protocol("enumeration failed")));

    let (status, body) = app.get("/terminal/ports").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ports"], json!([]));
}

#[tokio::test]
async fn test_reconnect_uses_fallback_scan() {
    let app = App::new();
    app.handle.add_unavailable_port(PREFERRED, Some("Pax"));
    app.handle.add_port("/dev/ttyACM1", None);

    let (status, body) = app.post_raw("/terminal/reconnect", "").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["port"], "/dev/ttyACM1");
    assert_eq!(
        app.state.manager().status().path.as_deref(),
        Some("/dev/ttyACM1")
    );
}

#[tokio::test]
async fn test_reconnect_failure() {
    let app = App::new();

    let (status, body) = app.post_raw("/terminal/reconnect", "").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error_code"], "RECONNECT_ERROR");
}

// ============================================================================
// Payment routes
// ============================================================================

#[tokio::test]
async fn test_sale_approved() {
    let app = App::connected().await;

    let (status, body) = app
        .post_json("/payment/sale", json!({"amount": 1000, "ticket_number": "TCK1"}))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Sale approved");
    assert_eq!(body["data"]["response_code"], "00");
    assert_eq!(
        app.handle.calls(),
        vec![MockCall::Sale {
            amount: 1000,
            ticket: "TCK10000000000000000".into(),
        }]
    );
}

#[tokio::test]
async fn test_sale_accepts_numeric_string_amount() {
    let app = App::connected().await;

    let (status, _) = app
        .post_json("/payment/sale", json!({"amount": "2500", "ticket_number": "A1"}))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.handle.command_count(TransactionKind::Sale), 1);
}

#[tokio::test]
async fn test_invalid_sale_never_reaches_terminal() {
    let app = App::connected().await;

    for body in [
        json!({"amount": 0, "ticket_number": "TCK1"}),
        json!({"amount": "ten", "ticket_number": "TCK1"}),
        json!({"amount": 10.5, "ticket_number": "TCK1"}),
        json!({"amount": 1000, "ticket_number": ""}),
        json!({"amount": 1000}),
        json!({"ticket_number": "TCK1"}),
    ] {
        let (status, response) = app.post_json("/payment/sale", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["status"], "error");
        assert_eq!(response["error_code"], "INVALID_INPUT");
    }

    assert!(app.handle.calls().is_empty());
}

#[tokio::test]
async fn test_ticket_is_padded_without_trimming() {
    let app = App::connected().await;

    let (status, _) = app
        .post_json("/payment/sale", json!({"amount": 1000, "ticket_number": " TCK1 "}))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        app.handle.calls(),
        vec![MockCall::Sale {
            amount: 1000,
            ticket: " TCK1 00000000000000".into(),
        }]
    );
}

#[tokio::test]
async fn test_malformed_body_is_invalid_input() {
    let app = App::connected().await;

    let (status, body) = app.post_raw("/payment/sale", "{not json").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_busy_sale_is_conflict_with_driver_message() {
    let app = App::connected().await;
    app.handle.fail_next(
        TransactionKind::Sale,
        DriverError::awaiting_response("still waiting for a response"),
    );

    let (status, body) = app
        .post_json("/payment/sale", json!({"amount": 1000, "ticket_number": "TCK1"}))
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "DEVICE_BUSY");
    assert_eq!(body["message"], "still waiting for a response");
    assert_eq!(app.handle.disconnect_count(), 1);
}

#[tokio::test]
async fn test_sale_without_terminal_is_unavailable() {
    let app = App::new();

    let (status, body) = app
        .post_json("/payment/sale", json!({"amount": 1000, "ticket_number": "TCK1"}))
        .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error_code"], "CONNECTION_LOST");
}

#[tokio::test]
async fn test_driver_failure_is_bad_gateway() {
    let app = App::connected().await;
    app.handle.fail_next(
        TransactionKind::Refund,
        DriverError::declined("05", "Transaction declined"),
    );

    let (status, body) = app
        .post_json(
            "/payment/refund",
            json!({"amount": 500, "original_operation_number": "000042"}),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error_code"], "DRIVER_ERROR");
    assert_eq!(body["response_code"], "05");
    assert_eq!(body["message"], "Transaction declined");
}

#[tokio::test]
async fn test_refund_requires_operation_number() {
    let app = App::connected().await;

    let (status, body) = app.post_json("/payment/refund", json!({"amount": 500})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_INPUT");
    assert_eq!(app.handle.command_count(TransactionKind::Refund), 0);
}

#[tokio::test]
async fn test_refund_accepts_numeric_operation_number() {
    let app = App::connected().await;

    let (status, body) = app
        .post_json(
            "/payment/refund",
            json!({"amount": 500, "original_operation_number": 42}),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Refund approved");
    assert_eq!(
        app.handle.calls(),
        vec![MockCall::Refund {
            amount: 500,
            operation_number: "42000000000000000000".into(),
        }]
    );
}

#[tokio::test]
async fn test_refund_rejects_non_integer_operation_number() {
    let app = App::connected().await;

    for number in [json!(-1), json!(4.2)] {
        let (status, body) = app
            .post_json(
                "/payment/refund",
                json!({"amount": 500, "original_operation_number": number}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_code"], "INVALID_INPUT");
    }

    assert_eq!(app.handle.command_count(TransactionKind::Refund), 0);
}

#[tokio::test]
async fn test_close_prints_report_by_default() {
    let app = App::connected().await;

    let (status, _) = app.post_raw("/payment/close", "").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .post_json("/payment/close", json!({"print_report": false}))
        .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(
        app.handle.calls(),
        vec![
            MockCall::CloseDay(CloseOptions { print_on_pos: true }),
            MockCall::CloseDay(CloseOptions {
                print_on_pos: false
            }),
        ]
    );
}

#[tokio::test]
async fn test_last_transaction_after_sale() {
    let app = App::connected().await;
    app.post_json("/payment/sale", json!({"amount": 1000, "ticket_number": "TCK1"}))
        .await;

    let (status, body) = app.get("/payment/last").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Last transaction retrieved");
    assert_eq!(body["data"]["approved"], true);
    assert_eq!(body["data"]["operation_number"], "000001");
    assert_eq!(body["data"]["has_raw_data"], true);
    assert_eq!(body["data"]["type"], "0210");
    assert_eq!(body["data"]["fields"]["operation_number"], "000001");
    assert_eq!(body["data"]["fields"]["amount"], "1000");
}

#[tokio::test]
async fn test_last_transaction_reports_terminal_message_type() {
    let app = App::connected().await;
    let mut declined = TransactionResponse::new("05", "Rechazado");
    declined.message_type = Some("0260".into());
    app.handle.respond_next(declined);
    app.post_json("/payment/sale", json!({"amount": 700, "ticket_number": "T9"}))
        .await;

    let (_, body) = app.get("/payment/last").await;

    assert_eq!(body["data"]["type"], "0260");
    assert_eq!(body["data"]["approved"], false);
    assert_eq!(body["data"]["fields"]["response_code"], "05");
}

#[tokio::test]
async fn test_last_transaction_without_data() {
    let app = App::connected().await;

    let (status, body) = app.get("/payment/last").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "No last transaction information available");
    assert_eq!(body["data"]["response_code"], "UNKNOWN");
    assert_eq!(body["data"]["type"], "0210");
    assert_eq!(body["data"]["fields"], json!({}));
}

#[tokio::test]
async fn test_initialize_loads_keys() {
    let app = App::connected().await;

    let (status, body) = app.post_raw("/payment/initialize", "").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Terminal keys loaded");
    assert_eq!(app.handle.command_count(TransactionKind::KeyLoad), 1);
}
