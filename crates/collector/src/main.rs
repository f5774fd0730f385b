//! meteo-collector: Wireless sensor telemetry daemon
//!
//! Discovers the radio bridge, ingests sensor notifications into the
//! shared table, appends a periodic rollup log, and serves table
//! snapshots over a local socket.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meteo_collector::{
    CollectorConfig, Discovery, Rollup, SensorTable, ServerState, SnapshotServer, TcpSensorSource,
};
use meteo_metadata::SensorNames;

/// Staleness threshold for the readiness probe - if no notifications
/// for this long, /ready fails.
const STALE_THRESHOLD_SECS: u64 = 300;

#[derive(Parser, Debug)]
#[command(name = "meteo-collector")]
#[command(about = "Telemetry collector for wireless temperature/humidity sensors")]
struct Args {
    /// Radio bridge address streaming sensor notifications
    #[arg(long, default_value = "127.0.0.1:7878")]
    source_addr: String,

    /// Device name the bridge must announce
    #[arg(long, default_value = "Meteodata")]
    device: String,

    /// Rollup log file, opened for append (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Sensor name configuration file
    #[arg(short, long)]
    names: Option<PathBuf>,

    /// Snapshot server bind address
    #[arg(long, default_value = "127.0.0.1:12345")]
    listen: String,

    /// Health server bind address
    #[arg(long, default_value = "127.0.0.1:8080")]
    health_addr: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = CollectorConfig {
        device_name: args.device.clone(),
        ..CollectorConfig::default()
    };

    // Sensor names are advisory: a broken file is reported and the
    // process continues with an empty mapping.
    let names = Arc::new(match &args.names {
        Some(path) => match SensorNames::load(path) {
            Ok(names) => {
                info!(count = names.len(), path = %path.display(), "Loaded sensor names");
                names
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Failed to load sensor names");
                SensorNames::default()
            }
        },
        None => SensorNames::default(),
    });

    let table = Arc::new(SensorTable::new());

    // Startup resource acquisition; failures here are fatal.
    let mut rollup = Rollup::open(Arc::clone(&table), args.output.as_deref(), &config)
        .map_err(|e| {
            error!(error = %e, "Cannot open rollup log for append");
            e
        })?;
    let snapshot = SnapshotServer::bind(&args.listen, Arc::clone(&table))
        .await
        .map_err(|e| {
            error!(error = %e, addr = %args.listen, "Cannot bind snapshot server");
            e
        })?;
    info!(addr = %args.listen, "Snapshot server listening");

    // Setup shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_tx_clone.send(true).ok();
    });

    let source = TcpSensorSource::new(&args.source_addr, &config.device_name);
    let mut discovery = Discovery::new(
        source,
        Arc::clone(&table),
        Arc::clone(&names),
        config.clone(),
    );

    // Health endpoint: diagnostic surface only, bind failure is not fatal.
    let health_addr: SocketAddr = args.health_addr.parse()?;
    let server_state = ServerState::new(
        &config.device_name,
        discovery.state_handle(),
        discovery.last_notification_handle(),
        STALE_THRESHOLD_SECS,
        Arc::clone(&table),
    );
    tokio::spawn(async move {
        if let Err(e) = meteo_collector::run_server(health_addr, server_state).await {
            warn!(error = %e, "Health server error");
        }
    });
    info!(addr = %health_addr, "Health server started");

    let rollup_shutdown = shutdown_rx.clone();
    let rollup_task = tokio::spawn(async move { rollup.run(rollup_shutdown).await });
    let snapshot_shutdown = shutdown_rx.clone();
    let snapshot_task = tokio::spawn(async move { snapshot.run(snapshot_shutdown).await });

    discovery.run(shutdown_rx).await;

    rollup_task.await.ok();
    snapshot_task.await.ok();
    info!("Collector stopped");
    Ok(())
}
