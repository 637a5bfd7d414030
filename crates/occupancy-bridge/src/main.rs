// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Occupancy Bridge CLI
//!
//! Forward occupancy counter telemetry from a serial port to Firestore.
//!
//! # Usage
//!
//! ```bash
//! # Bluetooth SPP device, token minted elsewhere
//! export FIRESTORE_ACCESS_TOKEN="$(gcloud auth print-access-token)"
//! occupancy-bridge --port /dev/rfcomm0 --project my-project
//!
//! # Settings from a file, against the local emulator
//! occupancy-bridge --config bridge.yaml --emulator localhost:8080
//!
//! # Parse and log only, nothing leaves the machine
//! occupancy-bridge --port COM8 --dry-run --verbose
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use occupancy_bridge::config::{BridgeConfig, EMULATOR_HOST_ENV};
use occupancy_bridge::{
    Bridge, ConnectionManager, DocumentStore, FirestoreStore, MemoryStore, SerialSource,
    SinkWriter, StopHandle, StreamSource,
};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "occupancy-bridge")]
#[command(author = "naskel.com")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Forward serial occupancy counter telemetry to Firestore")]
#[command(long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port name (e.g. /dev/rfcomm0, COM8)
    #[arg(short, long)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Seconds to wait before reconnecting after a failure
    #[arg(long)]
    reconnect_delay: Option<u64>,

    /// Google Cloud project id
    #[arg(long)]
    project: Option<String>,

    /// Application id used in document paths
    #[arg(long)]
    app_id: Option<String>,

    /// Firestore database id
    #[arg(long)]
    database: Option<String>,

    /// Firestore emulator host:port (also read from FIRESTORE_EMULATOR_HOST)
    #[arg(long)]
    emulator: Option<String>,

    /// Parse and log readings without writing to Firestore
    #[arg(long)]
    dry_run: bool,

    /// Verbose mode (show device chatter and internal logs)
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("occupancy_bridge=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("occupancy_bridge=info"))
    };
    fmt().with_env_filter(filter).with_target(false).init();

    // Startup failures are reported once; the loop never starts.
    if let Err(e) = run(cli) {
        tracing::error!("Cannot start bridge: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;
    config.validate().context("Invalid configuration")?;

    let stop = StopHandle::new();
    ctrlc_handler(stop.clone());

    if cli.dry_run {
        tracing::info!("Dry run: readings are kept in memory only");
        return run_bridge(&config, MemoryStore::new(), stop);
    }

    let token = std::env::var(&config.firestore.token_env).ok();
    let store_config = config
        .store_config(token)
        .context("Firestore initialization failed")?;
    tracing::info!(
        project = %store_config.project_id,
        database = %store_config.database,
        emulator = config.uses_emulator(),
        "Firestore client configured"
    );
    let store = FirestoreStore::new(store_config).context("Failed to create HTTP client")?;

    run_bridge(&config, store, stop)
}

fn run_bridge<D: DocumentStore>(config: &BridgeConfig, store: D, stop: StopHandle) -> Result<()> {
    let port = config
        .serial
        .port
        .clone()
        .context("No serial port configured")?;
    let source = SerialSource::new(port, config.serial.baud_rate)
        .with_poll_interval(config.poll_interval());

    tracing::info!(
        port = %source.endpoint(),
        baud = source.baud_rate(),
        "Starting occupancy serial bridge"
    );

    let connection = ConnectionManager::new(source, config.reconnect_delay());
    let writer = SinkWriter::new(store, config.paths());
    let mut bridge = Bridge::new(connection, writer).with_stop_handle(stop);

    bridge.run();

    let stats = bridge.stats();
    tracing::info!(
        readings = stats.readings_parsed,
        parse_errors = stats.parse_errors,
        live_write_failures = stats.live_write_failures,
        history_write_failures = stats.history_write_failures,
        "Exiting serial bridge"
    );
    Ok(())
}

/// Merge file settings, environment and command-line overrides.
fn build_config(cli: &Cli) -> Result<BridgeConfig> {
    let mut config = match &cli.config {
        Some(path) => BridgeConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => BridgeConfig::default(),
    };

    if let Some(port) = &cli.port {
        config.serial.port = Some(port.clone());
    }
    if let Some(baud) = cli.baud {
        config.serial.baud_rate = baud;
    }
    if let Some(delay) = cli.reconnect_delay {
        config.serial.reconnect_delay_secs = delay;
    }
    if let Some(project) = &cli.project {
        config.firestore.project_id = Some(project.clone());
    }
    if let Some(app_id) = &cli.app_id {
        config.firestore.app_id = app_id.clone();
    }
    if let Some(database) = &cli.database {
        config.firestore.database = database.clone();
    }

    let emulator = cli
        .emulator
        .clone()
        .or_else(|| std::env::var(EMULATOR_HOST_ENV).ok());
    if emulator.is_some() {
        config.firestore.emulator_host = emulator;
    }

    Ok(config)
}

/// Setup Ctrl+C handler.
fn ctrlc_handler(stop: StopHandle) {
    let _ = ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, shutting down...");
        stop.stop();
    });
}
