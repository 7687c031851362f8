//! Transaction guard behaviour against the mock terminal.

mod common;

use std::time::Duration;

use common::{Bridge, PREFERRED};
use futures::future::join_all;
use poslink_core::{Amount, Error, TicketReference, TransactionKind};
use poslink_recovery::run_startup;
use poslink_terminal::{CloseOptions, DriverError, MockCall};
use tokio_util::sync::CancellationToken;

fn amount(value: u64) -> Amount {
    Amount::new(value).unwrap()
}

fn ticket(value: &str) -> TicketReference {
    TicketReference::new(value).unwrap()
}

#[tokio::test]
async fn test_sale_sends_padded_ticket() {
    let bridge = Bridge::connected().await;

    let response = bridge.guard.sale(amount(1000), ticket("TCK1")).await.unwrap();

    assert!(response.is_approved());
    assert_eq!(
        bridge.handle.calls(),
        vec![MockCall::Sale {
            amount: 1000,
            ticket: "TCK10000000000000000".into(),
        }]
    );
}

#[tokio::test]
async fn test_busy_forces_single_reconnect_and_reports() {
    let bridge = Bridge::connected().await;
    bridge.handle.fail_next(
        TransactionKind::Sale,
        DriverError::awaiting_response("still waiting for a response"),
    );

    let error = bridge
        .guard
        .sale(amount(1000), ticket("TCK1"))
        .await
        .unwrap_err();

    assert!(matches!(error, Error::DeviceBusy { .. }));
    assert_eq!(error.to_string(), "still waiting for a response");
    assert_eq!(bridge.handle.command_count(TransactionKind::Sale), 1);
    assert_eq!(bridge.handle.disconnect_count(), 1);
    assert_eq!(bridge.handle.connect_attempts(), vec![PREFERRED]);
    assert!(bridge.manager.status().connected);
    // Forced recovery never scans for other ports.
    assert!(!bridge.handle.calls().contains(&MockCall::ListPorts));
}

#[tokio::test]
async fn test_busy_leaves_next_success_unconsumed() {
    let bridge = Bridge::connected().await;
    bridge.handle.fail_next(
        TransactionKind::Sale,
        DriverError::response_timeout("ACK has not been received"),
    );

    assert!(bridge.guard.sale(amount(1000), ticket("TCK1")).await.is_err());
    assert_eq!(bridge.handle.command_count(TransactionKind::Sale), 1);

    let response = bridge.guard.sale(amount(1000), ticket("TCK1")).await.unwrap();
    assert_eq!(response.operation_number.as_deref(), Some("000001"));
    assert_eq!(bridge.handle.command_count(TransactionKind::Sale), 2);
}

#[tokio::test]
async fn test_busy_with_failed_recovery_still_reports_busy() {
    let bridge = Bridge::connected().await;
    bridge.handle.fail_next(
        TransactionKind::Refund,
        DriverError::awaiting_response("still waiting for a response"),
    );
    bridge.handle.set_port_available(PREFERRED, false);

    let error = bridge
        .guard
        .refund(amount(500), ticket("000042"))
        .await
        .unwrap_err();

    assert!(matches!(error, Error::DeviceBusy { .. }));
    assert!(!bridge.manager.status().connected);
}

#[tokio::test]
async fn test_reconnects_before_command_when_disconnected() {
    let bridge = Bridge::single();
    bridge.handle.add_port("/dev/ttyACM1", None);

    let reply = bridge.guard.load_keys().await.unwrap();

    assert!(reply.is_approved());
    assert_eq!(
        bridge.handle.connect_attempts(),
        vec![PREFERRED, "/dev/ttyACM1"]
    );
    assert_eq!(
        bridge.manager.status().path.as_deref(),
        Some("/dev/ttyACM1")
    );
}

#[tokio::test]
async fn test_fails_fast_when_reconnect_fails() {
    let bridge = Bridge::single();

    let error = bridge
        .guard
        .sale(amount(1000), ticket("TCK1"))
        .await
        .unwrap_err();

    assert!(matches!(error, Error::ConnectionLost(_)));
    assert_eq!(bridge.handle.command_count(TransactionKind::Sale), 0);
}

#[tokio::test]
async fn test_other_errors_pass_through_without_recovery() {
    let bridge = Bridge::connected().await;
    bridge.handle.fail_next(
        TransactionKind::Sale,
        DriverError::declined("05", "Transaction declined"),
    );

    let error = bridge
        .guard
        .sale(amount(1000), ticket("TCK1"))
        .await
        .unwrap_err();

    assert_eq!(error.response_code(), Some("05"));
    assert_eq!(error.to_string(), "Transaction declined");
    assert_eq!(bridge.handle.disconnect_count(), 0);
    assert!(bridge.handle.connect_attempts().is_empty());
}

#[tokio::test]
async fn test_lost_link_surfaces_connection_lost() {
    let bridge = Bridge::connected().await;
    bridge.handle.drop_link();

    let error = bridge.guard.close_day(true).await.unwrap_err();

    assert!(matches!(error, Error::ConnectionLost(_)));
    assert!(!bridge.manager.status().connected);
    assert_eq!(bridge.handle.disconnect_count(), 1);
    assert!(bridge.handle.connect_attempts().is_empty());
}

#[tokio::test]
async fn test_command_after_lost_link_reconnects_first() {
    let bridge = Bridge::connected().await;
    bridge.handle.drop_link();
    assert!(bridge.guard.load_keys().await.is_err());

    let reply = bridge.guard.load_keys().await.unwrap();

    assert!(reply.is_approved());
    assert_eq!(bridge.handle.connect_attempts(), vec![PREFERRED]);
    assert_eq!(bridge.handle.command_count(TransactionKind::KeyLoad), 2);
    assert_eq!(
        bridge.manager.status().path.as_deref(),
        Some(PREFERRED)
    );
}

#[tokio::test]
async fn test_close_day_passes_print_option() {
    let bridge = Bridge::connected().await;

    bridge.guard.close_day(false).await.unwrap();

    assert_eq!(
        bridge.handle.calls(),
        vec![MockCall::CloseDay(CloseOptions {
            print_on_pos: false
        })]
    );
}

#[tokio::test]
async fn test_last_transaction_summary() {
    let bridge = Bridge::connected().await;
    bridge.guard.sale(amount(2500), ticket("B-17")).await.unwrap();

    let last = bridge.guard.last_transaction().await.unwrap();

    assert!(last.approved);
    assert_eq!(last.response_code, "00");
    assert_eq!(last.operation_number.as_deref(), Some("000001"));
    assert!(last.has_raw_data);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_commands_never_interleave() {
    let bridge = Bridge::connected().await;
    bridge.handle.set_command_delay(Duration::from_millis(20));
    bridge.handle.fail_next(
        TransactionKind::Sale,
        DriverError::awaiting_response("still waiting for a response"),
    );

    let sales = (1..=6).map(|n| {
        let guard = bridge.guard.clone();
        tokio::spawn(async move { guard.sale(amount(100 * n), ticket(&format!("T{n}"))).await })
    });
    let results = join_all(sales).await;

    let busy = results
        .into_iter()
        .map(|joined| joined.unwrap())
        .filter(|result| matches!(result, Err(Error::DeviceBusy { .. })))
        .count();
    assert_eq!(busy, 1);
    assert_eq!(bridge.handle.peak_in_flight(), 1);
    assert_eq!(bridge.handle.link_changes_during_commands(), 0);
    assert_eq!(bridge.handle.command_count(TransactionKind::Sale), 6);
}

#[tokio::test]
async fn test_startup_connects_then_loads_keys() {
    let bridge = Bridge::single();
    bridge.handle.add_port(PREFERRED, Some("Pax"));

    let report = run_startup(&bridge.guard, &CancellationToken::new()).await;

    assert!(report.connection.is_connected());
    assert_eq!(report.keys_loaded, Some(true));
    assert_eq!(bridge.handle.command_count(TransactionKind::KeyLoad), 1);
}

#[tokio::test]
async fn test_startup_keeps_connection_when_key_load_fails() {
    let bridge = Bridge::single();
    bridge.handle.add_port(PREFERRED, Some("Pax"));
    bridge.handle.fail_next(
        TransactionKind::KeyLoad,
        DriverError::protocol("Key load rejected"),
    );

    let report = run_startup(&bridge.guard, &CancellationToken::new()).await;

    assert_eq!(report.keys_loaded, Some(false));
    assert!(bridge.manager.status().connected);
}

#[tokio::test]
async fn test_startup_skips_keys_without_terminal() {
    let bridge = Bridge::single();

    let report = run_startup(&bridge.guard, &CancellationToken::new()).await;

    assert!(!report.connection.is_connected());
    assert_eq!(report.keys_loaded, None);
    assert_eq!(bridge.handle.command_count(TransactionKind::KeyLoad), 0);
}
