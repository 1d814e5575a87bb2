//! usbshare guest agent - keeps remote USB devices attached
//!
//! Runs the reconnect supervisor until SIGTERM/SIGINT, then detaches the
//! devices it was keeping attached.
//!
//! # Usage
//!
//! ```bash
//! # Devices from guest.json
//! usbshare-guest
//!
//! # Extra devices, optionally persisted
//! usbshare-guest --busid 2-2 --busid 3-1 --save
//!
//! # Override the host from guest.json
//! usbshare-guest --host 192.168.0.10
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use usbshare_core::{paths, validate_device_id};
use usbshare_guest::{GuestConfigStore, ReconnectSupervisor, SupervisorConfig};
use usbshare_usbipd::{DeviceBackend, UsbipdBackend, DEFAULT_TOOL};

/// usbshare guest agent
#[derive(Parser, Debug)]
#[command(name = "usbshare-guest", version, about)]
struct Args {
    /// Device to keep attached, in addition to those in guest.json
    #[arg(short = 'b', long = "busid")]
    busids: Vec<String>,

    /// Add the --busid devices to guest.json
    #[arg(long)]
    save: bool,

    /// Sharing host, overriding guest.json
    #[arg(long)]
    host: Option<String>,

    /// Guest config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// usbipd executable
    #[arg(long, env = paths::TOOL_ENV, default_value = DEFAULT_TOOL)]
    tool: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("usbshare_guest=info".parse()?)
                .add_directive("usbshare_usbipd=info".parse()?),
        )
        .init();

    for busid in &args.busids {
        validate_device_id(busid)?;
    }

    let store = GuestConfigStore::new(args.config.unwrap_or_else(paths::guest_config_path));
    let mut config = if args.save && !args.busids.is_empty() {
        store.remember(args.busids.iter().cloned())
    } else {
        store.load()
    }
    .with_context(|| format!("Failed to load {}", store.path().display()))?;

    if let Some(host) = args.host {
        config.host_address = host;
    }

    let backend: Arc<dyn DeviceBackend> = Arc::new(UsbipdBackend::new(args.tool));
    let supervisor = ReconnectSupervisor::new(backend, SupervisorConfig::from(&config))
        .with_devices(config.devices.iter().cloned())
        .with_devices(args.busids);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.host_address,
        "usbshare guest agent starting"
    );

    let handle = supervisor.spawn();
    if handle.desired().is_empty() {
        warn!("No devices to keep attached; add --busid or list them in guest.json");
    }

    if let Err(e) = wait_for_shutdown_signal().await {
        error!(error = %e, "Error waiting for shutdown signal");
    }
    info!("Shutdown signal received");

    handle.shutdown().await;
    info!("usbshare guest agent stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
