//! chargekeeperd — the charge-limiting daemon.
//!
//! Single binary that assembles the subsystems:
//! - Settings store (redb)
//! - Charge switch + battery telemetry (sysfs)
//! - Hysteresis controller (single-worker control loop)
//! - Settings watcher
//! - REST API
//!
//! # Usage
//!
//! ```text
//! chargekeeperd --port 8787 --data-dir /var/lib/chargekeeper
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use chargekeeper_controller::{
    ControllerConfig, spawn_controller, spawn_settings_watcher,
};
use chargekeeper_hw::{BatteryReader, POWER_SUPPLY_ROOT, SysfsChargeSwitch, spawn_battery_poller};
use chargekeeper_store::SettingsStore;

#[derive(Parser)]
#[command(name = "chargekeeperd", about = "Battery charge-limiting daemon", version)]
struct Cli {
    /// Port for the local REST API.
    #[arg(long, default_value = "8787")]
    port: u16,

    /// Data directory for persisted settings.
    #[arg(long, default_value = "/var/lib/chargekeeper")]
    data_dir: PathBuf,

    /// Battery telemetry poll interval in seconds.
    #[arg(long, default_value = "5")]
    poll_interval: u64,

    /// Settle delay in milliseconds applied to USB plug-in signals.
    #[arg(long, default_value = "1000")]
    usb_settle_ms: u64,

    /// Power-supply sysfs root (overridable for testing).
    #[arg(long, default_value = POWER_SUPPLY_ROOT)]
    sysfs_root: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,chargekeeperd=debug,chargekeeper=debug".parse().unwrap()
            }),
        )
        .init();

    let cli = Cli::parse();
    info!("chargekeeper daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    std::fs::create_dir_all(&cli.data_dir)?;
    let db_path = cli.data_dir.join("settings.redb");
    let store = SettingsStore::open(&db_path)?;
    info!(path = ?db_path, "settings store opened");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Capability probe: no switch means the API still runs, answering
    // Unsupported for charge operations.
    let controller = match SysfsChargeSwitch::detect(&cli.sysfs_root) {
        Some(switch) => {
            let (handle, _worker) = spawn_controller(
                store.clone(),
                Arc::new(switch),
                ControllerConfig {
                    usb_settle: Duration::from_millis(cli.usb_settle_ms),
                },
                shutdown_rx.clone(),
            );

            spawn_settings_watcher(store.subscribe(), handle.clone(), shutdown_rx.clone());

            // Battery telemetry → control queue.
            let (battery_tx, mut battery_rx) = mpsc::channel(16);
            spawn_battery_poller(
                BatteryReader::new(&cli.sysfs_root),
                Duration::from_secs(cli.poll_interval),
                battery_tx,
                shutdown_rx.clone(),
            );
            let forward = handle.clone();
            tokio::spawn(async move {
                while let Some(snapshot) = battery_rx.recv().await {
                    if forward.push_battery(snapshot).await.is_err() {
                        break;
                    }
                }
            });

            info!("charge controller started");
            Some(handle)
        }
        None => {
            warn!(root = ?cli.sysfs_root, "no charge-control hardware found, running unsupported");
            None
        }
    };

    // ── Start API server ───────────────────────────────────────

    let router = chargekeeper_api::build_router(controller);
    let addr = SocketAddr::from(([127, 0, 0, 1], cli.port));
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;
    info!("chargekeeper daemon stopped");
    Ok(())
}
