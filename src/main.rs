//! Ticker Collector Binary
//!
//! Starts the live ticker collection daemon.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin ticker-collector
//! ```
//!
//! # Environment Variables
//!
//! - `TICKER_SYMBOLS`: seed subscription list, `exchange:id:symbol` entries
//!   separated by commas (e.g. `kraken:1:BTC/USD,bitmex:2:XBT/USD`)
//! - `TICKER_WS_ENDPOINT_<NAME>`: WebSocket endpoint per exchange
//! - `TICKER_RATE_GATE_SECS`: registry-update window per symbol (default 30)
//! - `TICKER_SHUTDOWN_TIMEOUT_SECS`: bound on graceful stop (default none)
//! - `TICKER_HEALTH_PORT`: health endpoint port (default 8082)
//! - `TICKER_ADMIN_IDENTITY`: credential lookup namespace (default `admin`)
//! - `RUST_LOG`: log filter (default `info`)

use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;

use ticker_collector::infrastructure::telemetry;
use ticker_collector::{
    DaemonConfig, DaemonDeps, EnvCredentialResolver, HealthServer, HealthServerState,
    InMemoryProcessRegistry, InMemoryTickerStore, StaticSymbolCatalog, TickerDaemon,
    WsExchangeGateway, WsGatewayConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    load_dotenv();
    telemetry::init();

    tracing::info!("Starting ticker collector");

    let config = DaemonConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let gateway = Arc::new(WsExchangeGateway::new(
        WsGatewayConfig::new(config.reconnect.clone()),
        shutdown_token.child_token(),
    ));
    let ticker_store = Arc::new(InMemoryTickerStore::new());
    let registry = Arc::new(InMemoryProcessRegistry::new());
    let catalog = Arc::new(StaticSymbolCatalog::new(config.symbol_refs()));
    let credentials = Arc::new(EnvCredentialResolver::new(&config.admin_identity));

    let daemon = Arc::new(TickerDaemon::new(
        DaemonDeps {
            gateway,
            ticker_store,
            registry,
            credentials,
            catalog,
        },
        config.throttle.rate_gate_window,
    ));

    // Health server runs for the whole process lifetime, reporting daemon
    // state even while startup is in flight.
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&daemon),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    if let Err(e) = daemon.start().await {
        tracing::error!(error = %e, "Daemon start failed");
        shutdown_token.cancel();
        return Err(e.into());
    }

    tracing::info!("Ticker collector ready");

    await_shutdown().await;
    shutdown_token.cancel();

    let stop = daemon.stop();
    match config.shutdown_timeout {
        Some(timeout) => {
            if tokio::time::timeout(timeout, stop).await.is_err() {
                tracing::warn!(
                    timeout_secs = timeout.as_secs(),
                    "Graceful stop timed out; exiting anyway"
                );
            }
        }
        None => stop.await,
    }

    tracing::info!("Ticker collector stopped");
    Ok(())
}

/// Load a `.env` file from the current directory or any ancestor.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &DaemonConfig) {
    tracing::info!(
        symbol_count = config.symbols.len(),
        rate_gate_secs = config.throttle.rate_gate_window.as_secs(),
        health_port = config.server.health_port,
        shutdown_timeout_secs = config.shutdown_timeout.map(|d| d.as_secs()),
        admin_identity = %config.admin_identity,
        "Configuration loaded"
    );
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
