//! usbshare host daemon - attachment registry and control server
//!
//! This binary runs the host side: it shares local USB devices through
//! `usbipd`, keeps the attachment registry and the operator log, and
//! answers control requests on a Unix socket.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! usbshared start
//!
//! # Start the daemon (background/daemonized)
//! usbshared start -d
//!
//! # Stop the daemon / check status
//! usbshared stop
//! usbshared status
//!
//! # Talk to a running daemon
//! usbshared devices
//! usbshared share 2-2 --client 192.168.0.4
//! usbshared unshare 2-2
//! usbshared attachments
//! usbshared logs --max 50
//! usbshared diagnostics
//! usbshared config --auto-reconnect false
//! ```

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use usbshare_core::{paths, ConfigPatch};
use usbshare_usbipd::{DeviceBackend, UsbipdBackend, DEFAULT_TOOL};
use usbshared::client::HostClient;
use usbshared::config_store::ConfigStore;
use usbshared::monitor::{spawn_driver_monitor, POLL_INTERVAL};
use usbshared::registry::spawn_registry;
use usbshared::server::{Dispatcher, HostServer};

/// usbshare host daemon
#[derive(Parser, Debug)]
#[command(name = "usbshared", version, about)]
struct Args {
    /// Control socket path
    #[arg(long, global = true, env = paths::SOCKET_ENV)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        /// usbipd executable
        #[arg(long, env = paths::TOOL_ENV, default_value = DEFAULT_TOOL)]
        tool: String,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
    /// List local USB devices
    Devices,
    /// List shared devices
    Attachments,
    /// Show the operator log, newest first
    Logs {
        #[arg(long, default_value_t = 50)]
        max: i64,
    },
    /// Share a device
    Share {
        device_id: String,

        /// Address of the guest the device is meant for
        #[arg(long)]
        client: Option<String>,
    },
    /// Stop sharing a device
    Unshare { device_id: String },
    /// Show driver and service diagnostics
    Diagnostics,
    /// Update the host configuration
    Config {
        #[arg(long)]
        start_with_windows: Option<bool>,
        #[arg(long)]
        start_minimized_to_tray: Option<bool>,
        #[arg(long)]
        auto_reconnect: Option<bool>,
        #[arg(long)]
        notifications: Option<bool>,
        #[arg(long)]
        psk: Option<String>,
        #[arg(long)]
        cert_thumbprint: Option<String>,
    },
}

fn pid_file_path() -> PathBuf {
    paths::state_dir().join("usbshared.pid")
}

fn log_file_path() -> PathBuf {
    paths::state_dir().join("usbshared.log")
}

fn read_pid() -> Option<u32> {
    let path = pid_file_path();
    let mut file = File::open(&path).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file() {
    let path = pid_file_path();
    let _ = fs::remove_file(path);
}

fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

fn is_daemon_running() -> Option<u32> {
    if let Some(pid) = read_pid() {
        if is_process_running(pid) {
            return Some(pid);
        }
        remove_pid_file();
    }
    None
}

fn stop_daemon(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let Ok(raw_pid) = libc::pid_t::try_from(pid) else {
            bail!("Invalid PID {pid}");
        };
        // SAFETY: kill(2) has no memory-safety preconditions
        let result = unsafe { libc::kill(raw_pid, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {pid}");
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let socket_path = args.socket.unwrap_or_else(paths::socket_path);

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        tool: paths::tool_override().unwrap_or_else(|| DEFAULT_TOOL.to_string()),
    });

    match command {
        Command::Start { daemon, tool } => {
            if let Some(pid) = is_daemon_running() {
                eprintln!("Daemon is already running (PID {pid})");
                eprintln!("Use 'usbshared stop' to stop it first.");
                process::exit(1);
            }

            if daemon {
                daemonize()?;
            }

            write_pid()?;

            let result = run_daemon(socket_path, tool);

            remove_pid_file();

            result
        }
        Command::Stop => {
            if let Some(pid) = is_daemon_running() {
                println!("Stopping daemon (PID {pid})...");
                stop_daemon(pid)?;

                for _ in 0..50 {
                    if !is_process_running(pid) {
                        println!("Daemon stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Daemon did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Daemon is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some(pid) = is_daemon_running() {
                println!("Daemon is running (PID {pid})");
                if socket_path.exists() {
                    println!("Socket: {}", socket_path.display());
                }
                run_control(socket_path, Command::Status)
            } else {
                println!("Daemon is not running.");
                process::exit(1);
            }
        }
        other => run_control(socket_path, other),
    }
}

fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to create log file for stderr")?;

    let daemonize = Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr);

    daemonize.start().context("Failed to daemonize")?;

    Ok(())
}

#[tokio::main]
async fn run_daemon(socket_path: PathBuf, tool: String) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("usbshared=info".parse()?)
                .add_directive("usbshare_usbipd=info".parse()?)
                .add_directive("usbshare_core=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        tool = %tool,
        "usbshare host daemon starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let registry = spawn_registry();
    registry.info("Host daemon started").await;
    info!("Attachment registry started");

    let config = Arc::new(ConfigStore::new(paths::host_config_path()));
    match config.load() {
        Ok(_) => info!(path = %config.path().display(), "Host config loaded"),
        Err(e) => error!(error = %e, "Host config unreadable, patches will fail"),
    }

    let backend: Arc<dyn DeviceBackend> = Arc::new(UsbipdBackend::new(tool));

    let monitor_handle = spawn_driver_monitor(
        backend.clone(),
        registry.clone(),
        POLL_INTERVAL,
        cancel_token.clone(),
    );
    info!("Driver monitor started");

    let dispatcher = Dispatcher::new(backend, registry, config);
    let server = HostServer::new(&socket_path, dispatcher, cancel_token.clone());

    info!(socket = %socket_path.display(), "Starting server");

    let result = server.run().await;

    cancel_token.cancel();
    if let Err(e) = monitor_handle.await {
        error!(error = %e, "Driver monitor task failed");
    }

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("usbshare host daemon stopped");
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

// ============================================================================
// Control Commands
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn run_control(socket_path: PathBuf, command: Command) -> Result<()> {
    let client = HostClient::new(socket_path);

    match command {
        Command::Status => {
            let status = client.service_status().await?;
            println!(
                "Service: {} ({})",
                status.message,
                status.utc_now.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        Command::Devices => {
            for device in client.list_devices().await? {
                println!("{device}");
            }
        }
        Command::Attachments => {
            let attachments = client.attachments().await?;
            if attachments.is_empty() {
                println!("No shared devices.");
            }
            for a in attachments {
                println!(
                    "{} {} [{}] since {}",
                    a.device_id,
                    a.client_address.as_deref().unwrap_or("-"),
                    a.status,
                    a.since.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
        }
        Command::Logs { max } => {
            for entry in client.recent_logs(max).await? {
                println!(
                    "{} {:<7} {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.level,
                    entry.message
                );
            }
        }
        Command::Share { device_id, client: address } => {
            client.share(&device_id, address).await?;
            println!("Shared {device_id}");
        }
        Command::Unshare { device_id } => {
            client.unshare(&device_id).await?;
            println!("Unshared {device_id}");
        }
        Command::Diagnostics => {
            let d = client.diagnostics().await?;
            println!("Service:      {}", d.service);
            println!("Driver:       {}", d.driver);
            println!("Tool present: {}", d.tool_present);
            println!("Error code:   {}", d.driver_error_code);
            println!("Client:       {}", d.client_reachable);
            println!("Version:      {}", d.version);
            println!("Attachments:  {}", d.attachments);
        }
        Command::Config {
            start_with_windows,
            start_minimized_to_tray,
            auto_reconnect,
            notifications,
            psk,
            cert_thumbprint,
        } => {
            let patch = ConfigPatch {
                start_with_windows,
                start_minimized_to_tray,
                auto_reconnect,
                notifications,
                psk,
                cert_thumbprint,
            };
            let config = client.patch_config(&patch).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&config).context("Failed to render config")?
            );
        }
        Command::Start { .. } | Command::Stop => {
            bail!("Lifecycle commands are not sent to the daemon");
        }
    }

    Ok(())
}
