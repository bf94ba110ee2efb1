//! # Meter Relay
//!
//! Field telemetry agent for an RS-485 energy meter.
//!
//! Polls the meter over Modbus RTU on a fixed interval and delivers every
//! reading to a remote HTTP endpoint. While the endpoint is unreachable,
//! readings are kept in a durable on-disk ledger and flushed in capture order
//! once connectivity returns.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};

use meter_relay::config::Config;
use meter_relay::ledger::retention::Retention;
use meter_relay::ledger::{LedgerOptions, LocalLedger};
use meter_relay::logging;
use meter_relay::meter::SerialMeter;
use meter_relay::orchestrator::{Orchestrator, OrchestratorSettings};
use meter_relay::probe::TcpProbe;
use meter_relay::uploader::HttpUploader;

/// Environment variable naming the configuration file
const CONFIG_ENV_VAR: &str = "METER_RELAY_CONFIG";

/// Configuration file used when neither argument nor environment names one
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Main entry point for Meter Relay
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument, `METER_RELAY_CONFIG`, or the default path)
///    - Set up console and rolling file logging
///    - Open and recover the ledger
///
/// 2. **Main Loop**
///    - Poll the meter every `poll_interval_s`
///    - Send directly when online, buffer otherwise, drain the backlog in order
///
/// 3. **Graceful Shutdown**
///    - Ctrl+C or SIGTERM stops the loop after the current cycle
///    - Log totals and release the ledger lock
///
/// # Errors
///
/// Returns error if:
/// - Configuration is missing or invalid
/// - The ledger cannot be opened, or fails while running
///
/// # Examples
///
/// ```bash
/// meter-relay /etc/meter-relay/config.toml
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = resolve_config_path(env::args().nth(1), env::var(CONFIG_ENV_VAR).ok());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    let _log_guard = logging::init(&config.logging).context("Failed to initialize logging")?;

    info!("Meter Relay v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", config_path.display());

    let ledger_options = LedgerOptions {
        retention: Retention::from_limit(config.ledger.max_entries),
        compact_threshold_bytes: config.ledger.compact_threshold_bytes,
    };
    let ledger = LocalLedger::open(&config.ledger.path, ledger_options)
        .with_context(|| format!("Failed to open ledger at {}", config.ledger.path))?;

    let meter = SerialMeter::new(config.meter.clone());
    let probe = TcpProbe::new(
        &config.endpoint.base_url,
        Duration::from_millis(config.endpoint.probe_timeout_ms),
    );
    let uploader = HttpUploader::new(&config.endpoint).context("Failed to build HTTP client")?;
    info!(
        "Meter {} on {}, delivering to {}",
        config.meter.device_id,
        config.meter.port,
        uploader.readings_url()
    );

    let settings = OrchestratorSettings::from_config(&config);
    let mut agent = Orchestrator::new(meter, probe, uploader, ledger, settings);

    match agent.run(shutdown_signal()).await {
        Ok(stats) => {
            info!(
                "Stopped after {} readings ({} direct, {} drained)",
                stats.polled, stats.sent_direct, stats.drained
            );
            Ok(())
        }
        Err(e) => {
            error!("Agent stopped on ledger failure, operator intervention required: {}", e);
            Err(e).context("Ledger failure")
        }
    }
}

/// Pick the configuration file: argument first, then environment, then default
fn resolve_config_path(arg: Option<String>, env_value: Option<String>) -> PathBuf {
    arg.or(env_value)
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Resolves on Ctrl+C, or SIGTERM on Unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
