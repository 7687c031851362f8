//! POS link bridge: serial payment terminal behind an HTTP control surface.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use poslink_core::{BridgeConfig, DriverKind};
use poslink_network::{
    ControlServer, ControlState, ShutdownCoordinator, ShutdownReason, load_tls, router,
};
use poslink_recovery::{ReconnectOrchestrator, TransactionGuard, run_startup};
use poslink_terminal::{
    AnyTerminalDriver, ConnectionManager, MockTerminal, SerialTerminal, TerminalDriver,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "info,poslink=debug";

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_logging();

    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(error) => {
            error!(error = ?error, "Bridge failed to start");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();
}

async fn run() -> Result<u8> {
    let config = Arc::new(BridgeConfig::from_env().context("Invalid configuration")?);
    info!(
        version = poslink_core::VERSION,
        driver = %config.driver,
        port = %config.preferred_port,
        max_attempts = config.max_attempts,
        retry_delay = ?config.retry_delay,
        commerce_code = config.commerce_code.as_deref().unwrap_or("unset"),
        terminal_id = config.terminal_id.as_deref().unwrap_or("unset"),
        "Starting POS link bridge"
    );

    let manager = Arc::new(ConnectionManager::new(build_driver(&config)));
    let orchestrator = Arc::new(
        ReconnectOrchestrator::from_config(Arc::clone(&manager), &config)
            .context("Invalid retry policy")?,
    );
    let guard = TransactionGuard::new(orchestrator);
    let coordinator = Arc::new(ShutdownCoordinator::new(
        Arc::clone(&manager),
        config.shutdown_timeout,
    ));
    install_panic_hook(Arc::clone(&coordinator));

    let mut server = ControlServer::bind(config.bind_addr)
        .await
        .context("Failed to start control surface")?;
    if let Some(paths) = &config.tls {
        let tls = load_tls(paths).await.context("Invalid TLS configuration")?;
        info!(cert = %paths.cert_path.display(), "HTTPS enabled");
        server = server.with_tls(tls);
    }
    let state = ControlState::new(Arc::clone(&config), guard.clone())
        .with_shutdown(Arc::clone(&coordinator));
    let routes = router(state);
    let token = coordinator.token();
    let server_coordinator = Arc::clone(&coordinator);
    coordinator.attach_server(tokio::spawn(async move {
        let result = server.serve(routes, token).await;
        if let Err(error) = &result {
            server_coordinator.trigger(ShutdownReason::Fatal(format!("control server: {error}")));
        }
        result
    }));

    let startup_token = coordinator.token();
    coordinator.attach_task(tokio::spawn(async move {
        let report = run_startup(&guard, &startup_token).await;
        info!(
            state = %report.connection.state,
            attempts = report.connection.attempts,
            keys_loaded = ?report.keys_loaded,
            "Startup sequence finished"
        );
    }));

    tokio::select! {
        signal = wait_for_signal() => {
            coordinator.trigger(ShutdownReason::Signal(signal.to_string()));
        }
        () = coordinator.triggered() => {}
    }

    let outcome = coordinator.complete().await;
    Ok(outcome.exit_code)
}

fn build_driver(config: &BridgeConfig) -> AnyTerminalDriver {
    match config.driver {
        DriverKind::Serial => SerialTerminal::new(config.baud_rate).into(),
        DriverKind::Mock => {
            let (terminal, handle) = MockTerminal::new();
            handle.add_port(&config.preferred_port, Some(&config.vendor_hint));
            warn!(port = %config.preferred_port, "Using simulated terminal");
            terminal.into()
        }
    }
}

/// Route panics from any task into a fatal shutdown.
fn install_panic_hook<D: TerminalDriver>(coordinator: Arc<ShutdownCoordinator<D>>) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_hook(info);
        coordinator.trigger(ShutdownReason::Fatal(info.to_string()));
    }));
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => tokio::select! {
            () = ctrl_c() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        },
        Err(error) => {
            warn!(error = %error, "SIGTERM handler unavailable");
            ctrl_c().await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    ctrl_c().await;
    "SIGINT"
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "Ctrl-C handler unavailable");
        std::future::pending::<()>().await;
    }
}
